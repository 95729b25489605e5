//! # shelfcam
//!
//! shelfcam is a set of tools for inspecting and labeling recordings of a
//! multi-camera + load-cell shelf rig, written in Rust. Every experiment is
//! recorded by four independently clocked cameras and a set of weight sensors.
//! shelfcam time-aligns the cameras onto a common virtual timeline, stitches them
//! into a single 2x2 video, and plays any camera (or the stitched video) with a
//! sliding weight-vs-time plot overlaid, so that weight changes can be matched to
//! what happened on the shelf.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### HDF5 and OpenCV
//!
//! Before building shelfcam, HDF5 and OpenCV (with its video I/O and highgui
//! modules) must be installed. Typically these are installed using a package
//! manager (homebrew, apt, etc) and the Rust libraries will auto detect them. If
//! HDF5 was installed to a custom location, write the following snippet into
//! `.cargo/config.toml` in the shelfcam repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the video generator use `cargo install --path ./shelfcam_cli`
//! from the top level repository. The HSV calibration tool is installed with
//! `cargo install --path ./shelfcam_hsv`.
//!
//! ## Configuration
//!
//! Both the command line and the library read a YAML configuration. A template is
//! written by `shelfcam_cli new -p config.yml`:
//!
//! ```yml
//! default_timezone: -08:00
//! video_fps: 25
//! weight_offset_s: null
//! weight_group_prefix: plate_
//! plot_window_s: 4.0
//! plot_scale: 0.3
//! out_scale: 1.0
//! multicam_scale: 0.5
//! frame_increment: 8
//! coarse_multiplier: 10
//! time_increment_s: 0.1
//! fourcc: avc1
//! n_threads: null
//! overwrite: false
//! ```
//!
//! `default_timezone` is a fixed UTC offset for timestamps stored without a zone. It
//! does not follow daylight saving time, so experiments recorded in Pacific summer
//! time need `-07:00`. The written template carries a comment saying so.
//!
//! `weight_offset_s` is the skew between the weight sensor clock and the camera
//! clock. It depends on the rig, so it must be given (here or with `--offset`)
//! before anything can be played. Timestamps stored without a zone are assumed to
//! be in `default_timezone`.
//!
//! ## Input layout
//!
//! Every experiment is a folder named after its start time (`2019-05-01_12-00-00`)
//! holding:
//!
//! ```text
//! cam{1..4}_<experiment>.mp4 - camera videos
//! cam{1..4}_<experiment>.h5  - t_str(dset), one timestamp string per frame
//! weights_<experiment>.h5    - t_str(dset), w(dset) [shelf, plate, sample]
//! |---- plate_<id>           - t_str(dset), w(dset) [sample]
//! ```
//!
//! Folders ending in `_ignore` are skipped when processing a batch.
//!
//! ## Output
//!
//! ### Alignment Format
//!
//! Synchronizing an experiment writes `multicam_<experiment>.mp4` and its alignment:
//!
//! ```text
//! multicam_<experiment>.h5 - t_start, t_end, fps, version
//! |---- frame_nums(dset) [camera, virtual frame]
//! ```
//!
//! `frame_nums[c][n]` is the frame of camera `c + 1` shown at virtual frame `n`,
//! taken at `t_start + n / fps`. An existing alignment is reused unless `overwrite`
//! is set or it was made at a different frame rate.
//!
//! Saving a playback session writes `composite_<experiment>.mp4`.
pub mod alignment;
pub mod camera_stream;
pub mod config;
pub mod constants;
pub mod error;
pub mod experiment;
pub mod hdf_strings;
pub mod hsv;
pub mod player;
pub mod plot;
pub mod process;
pub mod synchronizer;
pub mod timestamp;
pub mod video;
pub mod weights;
pub mod worker_status;
