use opencv::core::{Mat, Point};
use opencv::prelude::*;
use opencv::{highgui, imgcodecs};
use std::path::Path;
use std::sync::{Arc, Mutex};

use libshelfcam::constants::{KEY_NONE, KEY_SPACE};
use libshelfcam::error::{HsvError, VideoError};
use libshelfcam::hsv::{draw_probe, pixel_hsv, threshold, to_hsv, HsvRange, HUE_MAX, SAT_VAL_MAX};
use libshelfcam::video::{Display, FrameSource, VideoFile, Window};

const WIN_NAME: &str = "HSV thresholding aux tool";

/// The pixel whose HSV value is printed on the output
#[derive(Debug, Clone, Copy)]
struct Probe {
    pixel: Point,
    visible: bool,
}

impl Default for Probe {
    fn default() -> Self {
        Self {
            pixel: Point::new(0, 0),
            visible: true,
        }
    }
}

/// An image, or a video/camera/stream that is played in a loop
enum Input {
    Image(Mat),
    Video(VideoFile),
}

impl Input {
    /// Try the input as an image first, then as a camera index, then as a video path or URL
    fn open(input: &str) -> Result<Self, HsvError> {
        let img = imgcodecs::imread(input, imgcodecs::IMREAD_COLOR)?;
        if !img.empty() {
            spdlog::info!("Opened {input} as an image");
            return Ok(Self::Image(img));
        }
        let video = match input.parse::<i32>() {
            Ok(index) => VideoFile::open_camera(index)?,
            Err(_) => VideoFile::open(Path::new(input))?,
        };
        spdlog::info!("Opened {} as a video", video.name());
        Ok(Self::Video(video))
    }
}

/// The HSV threshold calibration tool.
///
/// Six trackbars set the HSV limits; the pixels outside them are blacked out.
/// Left click (or drag) probes a pixel, right click hides the probe.
pub struct HsvApp {
    input: String,
    range: HsvRange,
    playing: bool,
    probe: Arc<Mutex<Probe>>,
}

impl HsvApp {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            range: HsvRange::default(),
            playing: true,
            probe: Arc::new(Mutex::new(Probe::default())),
        }
    }

    fn trackbars(&self) -> [(&'static str, i32, i32); 6] {
        [
            ("H_min", HUE_MAX - 1, self.range.h_min),
            ("H_max", HUE_MAX, self.range.h_max),
            ("S_min", SAT_VAL_MAX - 1, self.range.s_min),
            ("S_max", SAT_VAL_MAX, self.range.s_max),
            ("V_min", SAT_VAL_MAX - 1, self.range.v_min),
            ("V_max", SAT_VAL_MAX, self.range.v_max),
        ]
    }

    fn create_controls(&self) -> Result<(), HsvError> {
        for (name, max, initial) in self.trackbars() {
            highgui::create_trackbar(name, WIN_NAME, None, max, None)?;
            highgui::set_trackbar_pos(name, WIN_NAME, initial)?;
        }

        let probe = Arc::clone(&self.probe);
        highgui::set_mouse_callback(
            WIN_NAME,
            Some(Box::new(move |event, x, y, flags| {
                let Ok(mut probe) = probe.lock() else {
                    return;
                };
                let dragging = event == highgui::EVENT_MOUSEMOVE
                    && (flags & highgui::EVENT_FLAG_LBUTTON) != 0;
                if event == highgui::EVENT_LBUTTONDOWN || dragging {
                    probe.pixel = Point::new(x, y);
                    probe.visible = true;
                } else if event == highgui::EVENT_RBUTTONDOWN {
                    probe.visible = false;
                }
            })),
        )?;
        Ok(())
    }

    fn read_controls(&mut self) -> Result<(), HsvError> {
        let range = HsvRange {
            h_min: highgui::get_trackbar_pos("H_min", WIN_NAME)?,
            h_max: highgui::get_trackbar_pos("H_max", WIN_NAME)?,
            s_min: highgui::get_trackbar_pos("S_min", WIN_NAME)?,
            s_max: highgui::get_trackbar_pos("S_max", WIN_NAME)?,
            v_min: highgui::get_trackbar_pos("V_min", WIN_NAME)?,
            v_max: highgui::get_trackbar_pos("V_max", WIN_NAME)?,
        };
        if range != self.range {
            spdlog::debug!("Limits changed to {range}");
            self.range = range;
        }
        Ok(())
    }

    /// Next frame of a video, starting over at the end
    fn next_frame(video: &mut VideoFile, frame: &mut Mat) -> Result<(), HsvError> {
        if video.read(frame)? {
            return Ok(());
        }
        spdlog::info!("Reached the end of {}, looping", video.name());
        video.seek(0)?;
        if video.read(frame)? {
            Ok(())
        } else {
            Err(VideoError::ReadFailed {
                index: 0,
                source_name: video.name().to_string(),
            }
            .into())
        }
    }

    /// Run until a key other than space is pressed
    pub fn run(&mut self) -> Result<(), HsvError> {
        let mut input = Input::open(&self.input)?;
        let mut window = Window::new(WIN_NAME)?;
        self.create_controls()?;

        let mut frame = Mat::default();
        let mut hsv = Mat::default();
        if let Input::Image(img) = &input {
            frame = img.try_clone()?;
            hsv = to_hsv(&frame)?;
        }

        loop {
            if let Input::Video(video) = &mut input {
                if self.playing {
                    Self::next_frame(video, &mut frame)?;
                    hsv = to_hsv(&frame)?;
                }
            }
            self.read_controls()?;

            let mut out = threshold(&frame, &hsv, &self.range)?;
            let probe = self.probe.lock().map(|p| *p).unwrap_or_default();
            if probe.visible {
                let value = pixel_hsv(&hsv, probe.pixel)?;
                draw_probe(&mut out, probe.pixel, value, &self.range)?;
            }
            window.show(&out)?;

            match window.wait_key(1)? {
                KEY_NONE => (),
                KEY_SPACE => {
                    self.playing = !self.playing;
                    spdlog::info!("{}", if self.playing { "Playing" } else { "Paused" });
                }
                _ => break,
            }
        }
        spdlog::info!("Final limits: {}", self.range);
        println!("{}", self.range);
        Ok(())
    }
}
