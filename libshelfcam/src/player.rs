use opencv::core::{Mat, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use time::Duration;

use super::config::Config;
use super::constants::{KEYS_DOWN, KEYS_LEFT, KEYS_RIGHT, KEYS_UP, KEY_ESCAPE, KEY_NONE, KEY_SPACE};
use super::error::{PlayerError, VideoError};
use super::plot::WeightPlot;
use super::synchronizer::{blit, scaled_size};
use super::timestamp::{seconds_since, Timestamp};
use super::video::{clamp_position, Display, FrameSink, FrameSource};
use super::weights::WeightSeries;

/// Receives the segment marks placed while labeling
pub trait EventHandler {
    fn on_event(&mut self, is_start: bool, timestamp: &Timestamp);
}

impl<F: FnMut(bool, &Timestamp)> EventHandler for F {
    fn on_event(&mut self, is_start: bool, timestamp: &Timestamp) {
        self(is_start, timestamp)
    }
}

/// How key presses are interpreted.
///
/// While labeling, unknown keys are ignored so a stray key press doesn't end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Viewing,
    Labeling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Move the cursor by a number of frames
    SkipFrames(i64),
    /// Move the weight-to-camera time offset
    ShiftOffset(Duration),
    TogglePause,
    MarkEvent { is_start: bool },
    Exit,
    Nothing,
}

impl Command {
    pub fn from_key(key: i32, mode: KeyMode, options: &PlayerOptions) -> Self {
        let fine_frames = options.frame_increment;
        let coarse_frames = options.coarse_multiplier * options.frame_increment;
        let fine_time = Duration::seconds_f64(options.time_increment_s);
        let coarse_time = fine_time * options.coarse_multiplier as i32;
        let labeling = mode == KeyMode::Labeling;

        match key {
            KEY_NONE => Self::Nothing,
            k if KEYS_LEFT.contains(&k) => Self::SkipFrames(-coarse_frames),
            k if KEYS_RIGHT.contains(&k) => Self::SkipFrames(coarse_frames),
            k if KEYS_UP.contains(&k) => Self::SkipFrames(fine_frames),
            k if KEYS_DOWN.contains(&k) => Self::SkipFrames(-fine_frames),
            k if k == 'a' as i32 => Self::ShiftOffset(-coarse_time),
            k if k == 'd' as i32 => Self::ShiftOffset(coarse_time),
            k if k == 'w' as i32 => Self::ShiftOffset(-fine_time),
            k if k == 's' as i32 => Self::ShiftOffset(fine_time),
            k if k == 'b' as i32 && labeling => Self::MarkEvent { is_start: true },
            k if k == 'n' as i32 && labeling => Self::MarkEvent { is_start: false },
            KEY_SPACE => Self::TogglePause,
            KEY_ESCAPE => Self::Exit,
            _ if labeling => Self::Nothing,
            _ => Self::Exit,
        }
    }
}

/// Where the weight plot goes on the composite frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlotLayout {
    /// Over the bottom-right corner, `scale` times the video height
    Corner { scale: f64 },
    /// In a full-height strip right of the video
    SideStrip,
}

impl PlotLayout {
    /// A plot scale of 1 (or more) means the plot gets its own strip
    pub fn from_scale(scale: f64) -> Self {
        if scale >= 1.0 {
            Self::SideStrip
        } else {
            Self::Corner { scale }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Half width of the plot window, in seconds
    pub window_s: f64,
    /// Only frames whose weight time lies in this window are shown
    pub clip_start_s: Option<f64>,
    pub clip_end_s: Option<f64>,
    /// Camera time minus weight time at the start of the session, in seconds
    pub weight_offset_s: f64,
    pub frame_increment: i64,
    pub coarse_multiplier: i64,
    pub time_increment_s: f64,
}

impl PlayerOptions {
    /// Options from a config; fails if no weight offset was configured
    pub fn from_config(config: &Config) -> Result<Self, PlayerError> {
        Ok(Self {
            window_s: config.plot_window_s,
            clip_start_s: None,
            clip_end_s: None,
            weight_offset_s: config.weight_offset()?,
            frame_increment: config.frame_increment,
            coarse_multiplier: config.coarse_multiplier,
            time_increment_s: config.time_increment_s,
        })
    }

    fn in_clip_window(&self, weight_time_s: f64) -> bool {
        self.clip_start_s.map_or(true, |start| weight_time_s >= start)
            && self.clip_end_s.map_or(true, |end| weight_time_s <= end)
    }
}

/// Session state of one playback run
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub paused: bool,
    /// Index of the frame currently on the canvas
    pub cursor: usize,
    /// Index of the frame the next read returns
    pub next_frame: usize,
    /// Camera time at which the weight recording started
    pub time_offset: Timestamp,
    pub refresh_plot: bool,
    /// Read a frame on the next step even when paused
    pub step_pending: bool,
}

impl PlaybackState {
    pub fn new(time_offset: Timestamp) -> Self {
        Self {
            paused: false,
            cursor: 0,
            next_frame: 0,
            time_offset,
            refresh_plot: true,
            step_pending: false,
        }
    }

    fn wants_frame(&self) -> bool {
        !self.paused || self.step_pending
    }
}

/// Returned when playback ends
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOutcome {
    /// Final weight-to-camera time offset, as the camera time of the first weight sample
    pub time_offset: Timestamp,
    /// Seconds from that camera time to the first weight sample (minus the offset)
    pub start_offset_s: f64,
}

/// Builds composite frames: a camera frame with the weight plot on top or beside it
pub struct Compositor {
    plot: WeightPlot,
    frame_rect: Rect,
    plot_rect: Rect,
    canvas: Mat,
    out_scale: f64,
}

impl Compositor {
    pub fn new(plot: WeightPlot, frame_size: Size, layout: PlotLayout, out_scale: f64) -> Result<Self, PlayerError> {
        let plot_size = plot.size()?;
        let (canvas_size, plot_rect) = match layout {
            PlotLayout::Corner { scale } => {
                let footprint = scaled_size(plot_size, scale * frame_size.height as f64 / plot_size.height as f64);
                let width = footprint.width.min(frame_size.width);
                let height = footprint.height.min(frame_size.height);
                (
                    frame_size,
                    Rect::new(frame_size.width - width, frame_size.height - height, width, height),
                )
            }
            PlotLayout::SideStrip => {
                let footprint = scaled_size(plot_size, frame_size.height as f64 / plot_size.height as f64);
                (
                    Size::new(frame_size.width + footprint.width, frame_size.height),
                    Rect::new(frame_size.width, 0, footprint.width, frame_size.height),
                )
            }
        };
        let canvas = Mat::new_rows_cols_with_default(
            canvas_size.height,
            canvas_size.width,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        Ok(Self {
            plot,
            frame_rect: Rect::new(0, 0, frame_size.width, frame_size.height),
            plot_rect,
            canvas,
            out_scale,
        })
    }

    pub fn canvas_size(&self) -> Size {
        Size::new(self.canvas.cols(), self.canvas.rows())
    }

    /// Size of the frames handed to the encoder and the display
    pub fn output_size(&self) -> Size {
        if self.out_scale == 1.0 {
            self.canvas_size()
        } else {
            scaled_size(self.canvas_size(), self.out_scale)
        }
    }

    pub fn place_frame(&mut self, frame: &Mat) -> Result<(), PlayerError> {
        Ok(blit(frame, &mut self.canvas, self.frame_rect)?)
    }

    /// Redraw the plot around `center_s` (seconds since the first weight sample)
    pub fn place_plot(&mut self, center_s: f64, half_width_s: f64) -> Result<(), PlayerError> {
        let plot_img = self.plot.render(center_s, half_width_s)?;
        Ok(blit(&plot_img, &mut self.canvas, self.plot_rect)?)
    }

    pub fn output(&self) -> Result<Mat, PlayerError> {
        if self.out_scale == 1.0 {
            return Ok(self.canvas.try_clone()?);
        }
        let mut out = Mat::default();
        imgproc::resize(&self.canvas, &mut out, self.output_size(), 0.0, 0.0, imgproc::INTER_AREA)?;
        Ok(out)
    }
}

/// Optional outputs of a playback run
#[derive(Default)]
pub struct PlayerOutputs<'a> {
    pub sink: Option<&'a mut dyn FrameSink>,
    pub display: Option<&'a mut dyn Display>,
    /// Installing a handler switches the keys to labeling mode
    pub events: Option<&'a mut dyn EventHandler>,
}

/// Play `source` with the weight plot overlaid until the video ends or the user exits.
///
/// `timestamps[i]` is the camera time of frame `i`. Every frame read must decode; a
/// failed read aborts playback. Without a display the video simply plays through.
pub fn play<S: FrameSource>(
    source: &mut S,
    timestamps: &[Timestamp],
    weights: &WeightSeries,
    compositor: &mut Compositor,
    options: &PlayerOptions,
    mut outputs: PlayerOutputs,
) -> Result<PlaybackOutcome, PlayerError> {
    let n_frames = timestamps.len();
    let source_frames = source.frame_count();
    if source_frames != 0 && source_frames < n_frames {
        return Err(PlayerError::LengthMismatch {
            timestamps: n_frames,
            frames: source_frames,
        });
    }
    let mode = if outputs.events.is_some() {
        KeyMode::Labeling
    } else {
        KeyMode::Viewing
    };
    let mut state = PlaybackState::new(*weights.start() + Duration::seconds_f64(options.weight_offset_s));
    let mut frame = Mat::default();

    loop {
        let mut changed = false;
        if state.wants_frame() {
            if state.next_frame >= n_frames {
                break;
            }
            let index = state.next_frame;
            if !source.read(&mut frame)? {
                return Err(VideoError::ReadFailed {
                    index,
                    source_name: source.name().to_string(),
                }
                .into());
            }
            state.cursor = index;
            state.next_frame = index + 1;
            state.step_pending = false;
            log::debug!(
                "Read frame {} out of {} frames ({:6.2}%)",
                index + 1,
                n_frames,
                100.0 * (index + 1) as f64 / n_frames as f64
            );
            compositor.place_frame(&frame)?;
            changed = true;
        }

        // Seconds since the first weight sample, in the weight sensor's clock
        let weight_time_s = seconds_since(&timestamps[state.cursor], &state.time_offset);
        if !options.in_clip_window(weight_time_s) {
            // Keep moving until the frames are back inside the window
            state.step_pending = true;
            state.refresh_plot = true;
            continue;
        }

        if state.refresh_plot {
            compositor.place_plot(weight_time_s, options.window_s)?;
            state.refresh_plot = false;
            changed = true;
        }

        if changed {
            let out = compositor.output()?;
            if let Some(sink) = outputs.sink.as_deref_mut() {
                sink.write(&out)?;
            }
            if let Some(display) = outputs.display.as_deref_mut() {
                display.show(&out)?;
            }
        }

        if let Some(display) = outputs.display.as_deref_mut() {
            let key = display.wait_key(if state.paused { 0 } else { 1 })?;
            match Command::from_key(key, mode, options) {
                Command::SkipFrames(delta) => {
                    let target = clamp_position(state.cursor as i64 + delta, n_frames);
                    state.next_frame = source.seek(target as i64)?;
                    state.step_pending = true;
                    state.refresh_plot = true;
                }
                Command::ShiftOffset(delta) => {
                    state.time_offset += delta;
                    state.refresh_plot = true;
                    log::info!(
                        "Weight-to-camera offset is now {:.3}s",
                        seconds_since(&state.time_offset, weights.start())
                    );
                }
                Command::TogglePause => state.paused = !state.paused,
                Command::MarkEvent { is_start } => {
                    if let Some(events) = outputs.events.as_deref_mut() {
                        events.on_event(is_start, &timestamps[state.cursor]);
                    }
                }
                Command::Exit => {
                    log::info!("Key pressed, exiting!");
                    break;
                }
                Command::Nothing => (),
            }
        }
        state.refresh_plot |= !state.paused;
    }

    if let Some(sink) = outputs.sink.as_deref_mut() {
        sink.finish()?;
    }
    Ok(PlaybackOutcome {
        time_offset: state.time_offset,
        start_offset_s: seconds_since(weights.start(), &state.time_offset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::COMPACT_PLOT_SIZE;
    use crate::video::memory::{frame_level, MemorySink, MemorySource, ScriptedDisplay};
    use crate::weights::WeightTrace;
    use time::macros::datetime;

    const FRAME_SIZE: Size = Size {
        width: 320,
        height: 240,
    };

    fn options() -> PlayerOptions {
        PlayerOptions {
            window_s: 4.0,
            clip_start_s: None,
            clip_end_s: None,
            weight_offset_s: 0.0,
            frame_increment: 8,
            coarse_multiplier: 10,
            time_increment_s: 0.1,
        }
    }

    fn weights() -> WeightSeries {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        let timestamps: Vec<_> = (0..20).map(|i| t0 + Duration::milliseconds(250 * i)).collect();
        WeightSeries::new(
            timestamps,
            vec![WeightTrace {
                title: String::from("Load cell #1"),
                values: (0..20).map(|i| i as f64).collect(),
            }],
        )
        .unwrap()
    }

    /// One camera timestamp per 100ms starting with the weights
    fn camera_timestamps(n: usize) -> Vec<Timestamp> {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        (0..n).map(|i| t0 + Duration::milliseconds(100 * i as i64)).collect()
    }

    fn compositor(weights: &WeightSeries, layout: PlotLayout) -> Compositor {
        let plot = WeightPlot::new(weights, COMPACT_PLOT_SIZE).unwrap();
        Compositor::new(plot, FRAME_SIZE, layout, 1.0).unwrap()
    }

    #[test]
    fn test_key_table() {
        let opts = options();
        assert_eq!(
            Command::from_key(KEYS_LEFT[1], KeyMode::Viewing, &opts),
            Command::SkipFrames(-80)
        );
        assert_eq!(
            Command::from_key(KEYS_UP[0], KeyMode::Viewing, &opts),
            Command::SkipFrames(8)
        );
        assert_eq!(
            Command::from_key('w' as i32, KeyMode::Viewing, &opts),
            Command::ShiftOffset(Duration::milliseconds(-100))
        );
        assert_eq!(
            Command::from_key('d' as i32, KeyMode::Viewing, &opts),
            Command::ShiftOffset(Duration::seconds(1))
        );
        assert_eq!(Command::from_key(KEY_NONE, KeyMode::Viewing, &opts), Command::Nothing);
        // Event keys only mean something while labeling, where unknown keys don't exit
        assert_eq!(Command::from_key('b' as i32, KeyMode::Viewing, &opts), Command::Exit);
        assert_eq!(
            Command::from_key('b' as i32, KeyMode::Labeling, &opts),
            Command::MarkEvent { is_start: true }
        );
        assert_eq!(Command::from_key('x' as i32, KeyMode::Labeling, &opts), Command::Nothing);
        assert_eq!(Command::from_key(KEY_ESCAPE, KeyMode::Labeling, &opts), Command::Exit);
    }

    #[test]
    fn test_plays_through_without_display() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::Corner { scale: 0.3 });
        let mut source = MemorySource::new("cam3", FRAME_SIZE, 10, 0);
        let mut sink = MemorySink::default();
        let outcome = play(
            &mut source,
            &camera_timestamps(10),
            &weights,
            &mut comp,
            &options(),
            PlayerOutputs {
                sink: Some(&mut sink),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(sink.frames.len(), 10);
        assert!(sink.finished);
        let levels: Vec<u8> = sink.frames.iter().map(frame_level).collect();
        assert_eq!(levels, (0..10).collect::<Vec<u8>>());
        assert_eq!(sink.frames[0].size().unwrap(), FRAME_SIZE);
        assert_eq!(outcome.time_offset, *weights.start());
        assert_eq!(outcome.start_offset_s, 0.0);
    }

    #[test]
    fn test_step_back_past_start_clamps() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::Corner { scale: 0.3 });
        let mut source = MemorySource::new("cam3", FRAME_SIZE, 20, 0);
        // pause on frame 0, step back 8 frames, then exit
        let mut display = ScriptedDisplay::new(&[KEY_SPACE, KEYS_DOWN[0], KEY_ESCAPE]);
        play(
            &mut source,
            &camera_timestamps(20),
            &weights,
            &mut comp,
            &options(),
            PlayerOutputs {
                display: Some(&mut display),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(display.shown, vec![0, 0]);
        assert_eq!(display.waits, vec![1, 0, 0]);
    }

    #[test]
    fn test_step_forward_with_unknown_length() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::Corner { scale: 0.3 });
        let mut source = MemorySource::new("stream", FRAME_SIZE, 20, 0);
        source.unknown_length = true;
        // pause on frame 0, step forward 8 frames, then coarse forward past the end
        let mut display = ScriptedDisplay::new(&[KEY_SPACE, KEYS_UP[0], KEYS_RIGHT[0], KEY_ESCAPE]);
        play(
            &mut source,
            &camera_timestamps(20),
            &weights,
            &mut comp,
            &options(),
            PlayerOutputs {
                display: Some(&mut display),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(display.shown, vec![0, 8, 19]);
    }

    #[test]
    fn test_offset_and_events() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::SideStrip);
        let mut source = MemorySource::new("multicam", FRAME_SIZE, 20, 0);
        let mut marks = Vec::new();
        let mut on_event = |is_start: bool, t: &Timestamp| marks.push((is_start, *t));
        let mut display = ScriptedDisplay::new(&[
            KEY_SPACE,
            'b' as i32,
            'a' as i32,
            'x' as i32,
            'n' as i32,
            KEY_ESCAPE,
        ]);
        let mut opts = options();
        opts.weight_offset_s = 2.0;
        let outcome = play(
            &mut source,
            &camera_timestamps(20),
            &weights,
            &mut comp,
            &opts,
            PlayerOutputs {
                display: Some(&mut display),
                events: Some(&mut on_event),
                ..Default::default()
            },
        )
        .unwrap();
        let t0 = camera_timestamps(1)[0];
        assert_eq!(marks, vec![(true, t0), (false, t0)]);
        // 'a' moves the offset back by a coarse step of 1s
        assert_eq!(outcome.time_offset, *weights.start() + Duration::seconds(1));
        assert_eq!(outcome.start_offset_s, -1.0);
        // The plot strip widens the canvas
        assert!(comp.canvas_size().width > FRAME_SIZE.width);
        assert_eq!(comp.canvas_size().height, FRAME_SIZE.height);
    }

    #[test]
    fn test_clip_window_skips_frames() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::Corner { scale: 0.3 });
        let mut source = MemorySource::new("cam1", FRAME_SIZE, 10, 0);
        let mut sink = MemorySink::default();
        let mut opts = options();
        opts.clip_start_s = Some(0.25);
        opts.clip_end_s = Some(0.55);
        play(
            &mut source,
            &camera_timestamps(10),
            &weights,
            &mut comp,
            &opts,
            PlayerOutputs {
                sink: Some(&mut sink),
                ..Default::default()
            },
        )
        .unwrap();
        let levels: Vec<u8> = sink.frames.iter().map(frame_level).collect();
        assert_eq!(levels, vec![3, 4, 5]);
    }

    #[test]
    fn test_decode_failure_aborts() {
        let weights = weights();
        let mut comp = compositor(&weights, PlotLayout::Corner { scale: 0.3 });
        let mut source = MemorySource::new("cam1", FRAME_SIZE, 10, 0);
        source.broken_frame = Some(4);
        let mut sink = MemorySink::default();
        let result = play(
            &mut source,
            &camera_timestamps(10),
            &weights,
            &mut comp,
            &options(),
            PlayerOutputs {
                sink: Some(&mut sink),
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(PlayerError::VideoError(VideoError::ReadFailed { index: 4, .. }))
        ));
        assert_eq!(sink.frames.len(), 4);
        assert!(!sink.finished);
    }
}
