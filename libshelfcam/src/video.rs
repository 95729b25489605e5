use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::{highgui, videoio};
use std::path::{Path, PathBuf};

use super::constants::KEY_NONE;
use super::error::VideoError;

/// Anything that can hand out decoded frames by index.
///
/// Frames are read lazily; only the frame being read is held in memory.
pub trait FrameSource {
    /// Human readable name used in error messages
    fn name(&self) -> &str;
    fn frame_count(&self) -> usize;
    fn frame_size(&self) -> Size;
    /// Position the source so that the next `read` returns frame `index`.
    ///
    /// Out of range positions are clamped to the first/last frame (only to the
    /// first when the length is unknown); the position actually used is returned.
    fn seek(&mut self, index: i64) -> Result<usize, VideoError>;
    /// Decode the next frame into `frame`. Returns false when no frame could be read.
    fn read(&mut self, frame: &mut Mat) -> Result<bool, VideoError>;

    /// Read frame `index`, failing loudly if it can't be decoded
    fn read_at(&mut self, index: usize, frame: &mut Mat) -> Result<(), VideoError> {
        self.seek(index as i64)?;
        if self.read(frame)? {
            Ok(())
        } else {
            Err(VideoError::ReadFailed {
                index,
                source_name: self.name().to_string(),
            })
        }
    }
}

/// Destination for finished frames
pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<(), VideoError>;
    /// Flush everything to disk. Called once when a run completes normally
    fn finish(&mut self) -> Result<(), VideoError> {
        Ok(())
    }
}

/// Interactive output: shows frames and reports key presses
pub trait Display {
    fn show(&mut self, frame: &Mat) -> Result<(), VideoError>;
    /// Wait up to `delay_ms` for a key (0 = forever). Returns -1 if none was pressed
    fn wait_key(&mut self, delay_ms: i32) -> Result<i32, VideoError>;
}

/// Clamp a requested frame position to `[0, frame_count - 1]`.
///
/// A frame count of 0 means the length is unknown, so only negative positions are clamped.
pub fn clamp_position(index: i64, frame_count: usize) -> usize {
    if frame_count == 0 {
        return index.max(0) as usize;
    }
    index.clamp(0, frame_count as i64 - 1) as usize
}

/// A video file (or camera/stream) decoded through OpenCV
pub struct VideoFile {
    capture: videoio::VideoCapture,
    name: String,
    frame_count: usize,
    frame_size: Size,
    position: usize,
}

impl VideoFile {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let name = path.to_string_lossy().to_string();
        let capture = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)?;
        Self::from_capture(capture, name)
    }

    /// Open a live camera by index. Live sources report no frame count
    pub fn open_camera(index: i32) -> Result<Self, VideoError> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        Self::from_capture(capture, format!("camera {index}"))
    }

    fn from_capture(capture: videoio::VideoCapture, name: String) -> Result<Self, VideoError> {
        if !capture.is_opened()? {
            return Err(VideoError::OpenFailed(name));
        }
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        Ok(Self {
            capture,
            name,
            frame_count,
            frame_size: Size::new(width, height),
            position: 0,
        })
    }
}

impl FrameSource for VideoFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }

    fn seek(&mut self, index: i64) -> Result<usize, VideoError> {
        let target = clamp_position(index, self.frame_count);
        // Seeking is expensive for compressed video; skip it for sequential reads
        if target != self.position {
            self.capture
                .set(videoio::CAP_PROP_POS_FRAMES, target as f64)?;
            self.position = self.capture.get(videoio::CAP_PROP_POS_FRAMES)? as usize;
        }
        Ok(self.position)
    }

    fn read(&mut self, frame: &mut Mat) -> Result<bool, VideoError> {
        let ok = self.capture.read(frame)?;
        if ok {
            self.position += 1;
        }
        Ok(ok)
    }
}

/// Encodes frames into a video file through OpenCV
pub struct VideoEncoder {
    writer: videoio::VideoWriter,
    path: PathBuf,
    frames_written: usize,
}

impl VideoEncoder {
    pub fn new(path: &Path, fourcc: [char; 4], fps: f64, frame_size: Size) -> Result<Self, VideoError> {
        let code = videoio::VideoWriter::fourcc(fourcc[0], fourcc[1], fourcc[2], fourcc[3])?;
        let writer = videoio::VideoWriter::new(
            &path.to_string_lossy(),
            code,
            fps,
            frame_size,
            true,
        )?;
        if !writer.is_opened()? {
            return Err(VideoError::EncoderFailed(path.to_path_buf()));
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            frames_written: 0,
        })
    }
}

impl FrameSink for VideoEncoder {
    fn write(&mut self, frame: &Mat) -> Result<(), VideoError> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        // Release so the container is actually written to disk
        self.writer.release()?;
        log::info!(
            "Video successfully saved as '{}' ({} frames)",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

/// A highgui window. The window is destroyed when dropped
pub struct Window {
    name: String,
}

impl Window {
    pub fn new(name: &str) -> Result<Self, VideoError> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl Display for Window {
    fn show(&mut self, frame: &Mat) -> Result<(), VideoError> {
        highgui::imshow(&self.name, frame)?;
        Ok(())
    }

    fn wait_key(&mut self, delay_ms: i32) -> Result<i32, VideoError> {
        let key = highgui::wait_key_ex(delay_ms)?;
        Ok(if key < 0 { KEY_NONE } else { key })
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            log::warn!("Could not close window {}: {e}", self.name);
        }
        // highgui only processes the destroy event on the next poll
        let _ = highgui::wait_key(1);
    }
}

/// In-memory sources and sinks used by the tests of the synchronizer and player
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};
    use std::collections::VecDeque;

    use crate::constants::KEY_ESCAPE;

    /// A frame filled with a single gray level, so tests can tell frames apart
    pub fn solid_frame(size: Size, level: u8) -> Mat {
        Mat::new_rows_cols_with_default(
            size.height,
            size.width,
            CV_8UC3,
            Scalar::all(level as f64),
        )
        .unwrap()
    }

    /// The gray level of the first pixel of a solid frame
    pub fn frame_level(frame: &Mat) -> u8 {
        frame.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[0]
    }

    pub struct MemorySource {
        pub name: String,
        pub frames: Vec<Mat>,
        pub position: usize,
        /// Reads of this frame index fail, to exercise decode errors
        pub broken_frame: Option<usize>,
        /// Report a frame count of 0, like containers that don't store their length
        pub unknown_length: bool,
    }

    impl MemorySource {
        /// Frame `i` is filled with gray level `first_level + i`
        pub fn new(name: &str, size: Size, n_frames: usize, first_level: u8) -> Self {
            Self {
                name: name.to_string(),
                frames: (0..n_frames)
                    .map(|i| solid_frame(size, first_level.wrapping_add(i as u8)))
                    .collect(),
                position: 0,
                broken_frame: None,
                unknown_length: false,
            }
        }
    }

    impl FrameSource for MemorySource {
        fn name(&self) -> &str {
            &self.name
        }

        fn frame_count(&self) -> usize {
            if self.unknown_length {
                0
            } else {
                self.frames.len()
            }
        }

        fn frame_size(&self) -> Size {
            self.frames[0].size().unwrap()
        }

        fn seek(&mut self, index: i64) -> Result<usize, VideoError> {
            self.position = clamp_position(index, self.frame_count());
            Ok(self.position)
        }

        fn read(&mut self, frame: &mut Mat) -> Result<bool, VideoError> {
            if self.position >= self.frames.len() || Some(self.position) == self.broken_frame {
                return Ok(false);
            }
            self.frames[self.position].copy_to(frame)?;
            self.position += 1;
            Ok(true)
        }
    }

    #[derive(Default)]
    pub struct MemorySink {
        pub frames: Vec<Mat>,
        pub finished: bool,
    }

    impl FrameSink for MemorySink {
        fn write(&mut self, frame: &Mat) -> Result<(), VideoError> {
            self.frames.push(frame.try_clone()?);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), VideoError> {
            self.finished = true;
            Ok(())
        }
    }

    /// Replays a fixed list of key presses, then presses escape forever
    #[derive(Default)]
    pub struct ScriptedDisplay {
        pub keys: VecDeque<i32>,
        pub shown: Vec<u8>,
        pub waits: Vec<i32>,
    }

    impl ScriptedDisplay {
        pub fn new(keys: &[i32]) -> Self {
            Self {
                keys: keys.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Display for ScriptedDisplay {
        fn show(&mut self, frame: &Mat) -> Result<(), VideoError> {
            self.shown.push(frame_level(frame));
            Ok(())
        }

        fn wait_key(&mut self, delay_ms: i32) -> Result<i32, VideoError> {
            self.waits.push(delay_ms);
            Ok(self.keys.pop_front().unwrap_or(KEY_ESCAPE))
        }
    }
}
