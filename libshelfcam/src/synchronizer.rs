//! Multi-camera synchronization.
//!
//! Every camera records at its own (jittery) rate, so frames with the same index
//! were not captured at the same time. The synchronizer builds a virtual timeline,
//! sampled at a fixed frame rate over the interval every camera covers, and picks
//! for each camera the real frame nearest to each virtual timestamp. The resulting
//! frame table is persisted next to an optional 2x2 stitched video.
use ndarray::Array2;
use opencv::core::{Mat, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use std::path::Path;
use time::UtcOffset;

use super::alignment::PersistedAlignment;
use super::camera_stream::CameraStream;
use super::config::Config;
use super::constants::{KEY_NONE, NUMBER_OF_CAMERAS};
use super::error::{ConfigError, SyncError, VideoError};
use super::experiment::Experiment;
use super::timestamp::{format_timestamp, time_range, to_seconds, Timestamp};
use super::video::{Display, FrameSink, FrameSource, VideoEncoder};

/// Where each camera lands in the stitched canvas, as (column, row) quadrants.
/// Camera 1 is top-left, 2 bottom-left, 3 top-right, 4 bottom-right.
const QUADRANTS: [(i32, i32); NUMBER_OF_CAMERAS] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// The interval `[latest start, earliest end]` covered by every camera.
///
/// Fails if the cameras do not overlap.
pub fn common_coverage(cameras: &[&[Timestamp]]) -> Result<(Timestamp, Timestamp), SyncError> {
    let mut latest_start: Option<Timestamp> = None;
    let mut earliest_end: Option<Timestamp> = None;
    for (idx, timestamps) in cameras.iter().enumerate() {
        let (first, last) = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(SyncError::EmptyStream(idx + 1)),
        };
        latest_start = Some(latest_start.map_or(first, |t| t.max(first)));
        earliest_end = Some(earliest_end.map_or(last, |t| t.min(last)));
    }
    match (latest_start, earliest_end) {
        (Some(start), Some(end)) if start < end => Ok((start, end)),
        (Some(start), Some(end)) => Err(SyncError::NoOverlap {
            latest_start: format_timestamp(&start)?,
            earliest_end: format_timestamp(&end)?,
        }),
        _ => Err(SyncError::NoStreams),
    }
}

/// Index of the entry of `sorted` nearest to `target`.
///
/// `sorted` must be non-decreasing and non-empty. Ties go to the earlier index,
/// including ties between repeated values.
pub fn nearest_index(sorted: &[f64], target: f64) -> usize {
    let upper = sorted.partition_point(|&x| x < target);
    if upper == 0 {
        return 0;
    }
    let lower_value = sorted[upper - 1];
    let first_of_lower = sorted.partition_point(|&x| x < lower_value);
    if upper == sorted.len() {
        return first_of_lower;
    }
    if target - lower_value <= sorted[upper] - target {
        first_of_lower
    } else {
        upper
    }
}

/// Resample a real timeline onto target times by nearest neighbour
pub fn nearest_indices(sorted: &[f64], targets: &[f64]) -> Vec<u32> {
    targets
        .iter()
        .map(|&t| nearest_index(sorted, t) as u32)
        .collect()
}

/// Compute the virtual timeline and frame table for a set of cameras.
///
/// Rows of the table follow the order of `cameras`.
pub fn compute_alignment(cameras: &[&[Timestamp]], fps: u32) -> Result<PersistedAlignment, SyncError> {
    if cameras.is_empty() {
        return Err(SyncError::NoStreams);
    }
    let (latest_start, earliest_end) = common_coverage(cameras)?;
    let timeline = time_range(latest_start, earliest_end, fps)?;
    let timeline_s = to_seconds(&timeline, &latest_start);

    let mut frame_nums = Array2::<u32>::zeros((cameras.len(), timeline.len()));
    for (row, timestamps) in cameras.iter().enumerate() {
        let camera_s = to_seconds(timestamps, &latest_start);
        for (col, index) in nearest_indices(&camera_s, &timeline_s).into_iter().enumerate() {
            frame_nums[[row, col]] = index;
        }
    }

    // time_range is non-empty because latest_start < earliest_end
    Ok(PersistedAlignment {
        t_start: timeline[0],
        t_end: timeline[timeline.len() - 1],
        fps,
        frame_nums,
    })
}

/// Align already opened camera streams
pub fn synchronize<S: FrameSource>(streams: &[CameraStream<S>], fps: u32) -> Result<PersistedAlignment, SyncError> {
    let timestamps: Vec<&[Timestamp]> = streams.iter().map(|s| s.timestamps.as_slice()).collect();
    compute_alignment(&timestamps, fps)
}

/// Destination rectangle of a camera (numbered from 1) in the stitched canvas
pub fn quadrant_rect(camera: usize, frame_size: Size) -> Option<Rect> {
    let (col, row) = QUADRANTS.get(camera.checked_sub(1)?)?;
    Some(Rect::new(
        col * frame_size.width,
        row * frame_size.height,
        frame_size.width,
        frame_size.height,
    ))
}

/// Size of `size` scaled by `scale`, never smaller than one pixel
pub fn scaled_size(size: Size, scale: f64) -> Size {
    Size::new(
        ((size.width as f64 * scale).round() as i32).max(1),
        ((size.height as f64 * scale).round() as i32).max(1),
    )
}

/// Copy `frame` into `rect` of `canvas`, resizing it first if needed
pub fn blit(frame: &Mat, canvas: &mut Mat, rect: Rect) -> Result<(), VideoError> {
    let mut roi = Mat::roi_mut(canvas, rect)?;
    if frame.size()? == rect.size() {
        frame.copy_to(&mut roi)?;
    } else {
        let mut resized = Mat::default();
        imgproc::resize(frame, &mut resized, rect.size(), 0.0, 0.0, imgproc::INTER_LINEAR)?;
        resized.copy_to(&mut roi)?;
    }
    Ok(())
}

/// Render the stitched 2x2 video of an alignment.
///
/// Every frame named by the table must decode; a failed read aborts the whole
/// run, since a misaligned video is worse than no video. Returns false if the
/// user stopped the run from the display.
pub fn render_multicam<S: FrameSource>(
    streams: &mut [CameraStream<S>],
    alignment: &PersistedAlignment,
    sink: &mut dyn FrameSink,
    scale: f64,
    mut display: Option<&mut dyn Display>,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<bool, SyncError> {
    if streams.is_empty() {
        return Err(SyncError::NoStreams);
    }
    if streams.len() > NUMBER_OF_CAMERAS || streams.iter().any(|s| s.camera > NUMBER_OF_CAMERAS) {
        return Err(SyncError::TooManyStreams(streams.len()));
    }
    let frame_size = streams[0].source.frame_size();
    let out_size = scaled_size(
        Size::new(2 * frame_size.width, 2 * frame_size.height),
        scale,
    );
    let mut canvas = Mat::new_rows_cols_with_default(
        2 * frame_size.height,
        2 * frame_size.width,
        CV_8UC3,
        Scalar::all(0.0),
    )
    .map_err(VideoError::from)?;
    let mut frame = Mat::default();
    let mut out = Mat::default();
    let n_frames = alignment.n_frames();

    for n in 0..n_frames {
        for (row, stream) in streams.iter_mut().enumerate() {
            let index = alignment.frame_nums[[row, n]] as usize;
            stream.source.read_at(index, &mut frame)?;
            if let Some(rect) = quadrant_rect(stream.camera, frame_size) {
                blit(&frame, &mut canvas, rect)?;
            }
        }
        imgproc::resize(&canvas, &mut out, out_size, 0.0, 0.0, imgproc::INTER_LINEAR)
            .map_err(VideoError::from)?;
        sink.write(&out)?;
        progress(n + 1, n_frames);
        log::debug!(
            "{} out of {} frames ({:6.2}%) written!",
            n + 1,
            n_frames,
            100.0 * (n + 1) as f64 / n_frames as f64
        );

        if let Some(display) = display.as_deref_mut() {
            display.show(&out)?;
            if display.wait_key(1)? != KEY_NONE {
                log::info!("Key pressed, stopping multicam generation");
                return Ok(false);
            }
        }
    }
    sink.finish()?;
    Ok(true)
}

/// Options for synchronizing one experiment
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fps: u32,
    /// Downscale factor of the 2x2 canvas
    pub scale: f64,
    pub fourcc: [char; 4],
    pub overwrite: bool,
    pub timezone: UtcOffset,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            fps: config.fps()?,
            scale: config.multicam_scale,
            fourcc: config.fourcc_chars(),
            overwrite: config.overwrite,
            timezone: config.timezone()?,
        })
    }
}

/// Synchronize all cameras of an experiment, writing the stitched video and the alignment.
///
/// Idempotent: if an alignment for the same frame rate and its video already exist and
/// `overwrite` is off, the stored alignment is returned untouched.
pub fn synchronize_experiment(
    experiment: &Experiment,
    options: &SyncOptions,
    display: Option<&mut dyn Display>,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<PersistedAlignment, SyncError> {
    let video_path = experiment.multicam_video_path();
    synchronize_into(
        &experiment.alignment_path(),
        &video_path,
        options,
        || {
            (1..=NUMBER_OF_CAMERAS)
                .map(|camera| CameraStream::open(experiment, camera, options.timezone))
                .collect::<Result<Vec<_>, _>>()
                .map_err(SyncError::from)
        },
        |out_size| Ok(VideoEncoder::new(&video_path, options.fourcc, options.fps as f64, out_size)?),
        display,
        progress,
    )
}

/// Reuse the alignment at `alignment_path` or compute a new one from the streams
/// given by `open_streams`, rendering the stitched video into the sink given by `open_sink`.
///
/// Streams and sink are only opened when a new alignment is needed. The alignment is
/// saved only once the whole video was written.
pub fn synchronize_into<S, K>(
    alignment_path: &Path,
    video_path: &Path,
    options: &SyncOptions,
    open_streams: impl FnOnce() -> Result<Vec<CameraStream<S>>, SyncError>,
    open_sink: impl FnOnce(Size) -> Result<K, SyncError>,
    display: Option<&mut dyn Display>,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<PersistedAlignment, SyncError>
where
    S: FrameSource,
    K: FrameSink,
{
    let existing = PersistedAlignment::reuse_existing(
        alignment_path,
        options.fps,
        options.overwrite,
        options.timezone,
    )?;
    if let Some(alignment) = existing {
        if video_path.exists() {
            return Ok(alignment);
        }
        log::warn!(
            "Alignment exists but video {} is missing, regenerating...",
            video_path.display()
        );
    }
    log::info!("Generating multi-cam video '{}'", video_path.display());

    let mut streams = open_streams()?;
    let alignment = synchronize(&streams, options.fps)?;
    log::info!(
        "Virtual timeline of {} frames from {} to {}",
        alignment.n_frames(),
        format_timestamp(&alignment.t_start)?,
        format_timestamp(&alignment.t_end)?
    );

    let frame_size = streams[0].source.frame_size();
    let out_size = scaled_size(
        Size::new(2 * frame_size.width, 2 * frame_size.height),
        options.scale,
    );
    let completed = {
        let mut sink = open_sink(out_size)?;
        render_multicam(
            &mut streams,
            &alignment,
            &mut sink,
            options.scale,
            display,
            progress,
        )?
    };

    if completed {
        alignment.write(alignment_path)?;
    } else {
        log::warn!(
            "Multi-cam video {} is incomplete; its alignment was not saved",
            video_path.display()
        );
    }
    Ok(alignment)
}
