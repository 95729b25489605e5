//! # shelfcam_hsv
//!
//! Part of the shelfcam crate family.
//!
//! An interactive tool to find HSV thresholds for color segmentation.
//!
//! ## Use
//!
//! ```bash
//! shelfcam_hsv path/to/image.png
//! shelfcam_hsv 0
//! shelfcam_hsv rtsp://camera.local/stream
//! ```
//!
//! The input is tried as an image, then as a camera index, then as a video file or
//! stream URL. Videos are played in a loop.
//!
//! - Six trackbars set the H/S/V minimum and maximum. A hue minimum above the hue
//!   maximum selects the range wrapping through 0 (reds).
//! - Left click or drag shows the HSV value of a pixel; right click hides it.
//! - Space pauses/resumes a video; any other key exits and prints the limits.
//!
//! Details are logged to `shelfcam_hsv.log`.

mod app;
use app::HsvApp;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;

/// The program entry point
fn main() {
    let matches = Command::new("shelfcam_hsv")
        .about("HSV thresholding aux tool")
        .arg(
            Arg::new("input")
                .required(true)
                .help("Input: path to an image, a video, a webcam number or an IP camera"),
        )
        .get_matches();

    // Setup logging to a file
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./shelfcam_hsv.log"))
            .formatter(*Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()
            .unwrap(),
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()
            .unwrap(),
    );
    spdlog::set_default_logger(logger);
    // Library messages go through the log crate
    if spdlog::init_log_crate_proxy().is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
    spdlog::info!("Starting shelfcam HSV tool");

    let input = matches.get_one::<String>("input").expect("We require args");
    let mut app = HsvApp::new(input);
    match app.run() {
        Ok(()) => spdlog::info!("Done."),
        Err(e) => {
            spdlog::error!("HSV tool error: {}", e);
            eprintln!("There was an error! Check the log file shelfcam_hsv.log for more information.");
        }
    }
}
