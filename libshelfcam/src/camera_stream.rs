use std::path::Path;
use time::UtcOffset;

use super::constants::TIMESTAMP_STR_NAME;
use super::error::CameraStreamError;
use super::experiment::Experiment;
use super::hdf_strings::read_string_dataset;
use super::timestamp::{parse_timestamp, Timestamp};
use super::video::{FrameSource, VideoFile};

/// Read the per-frame timestamps (`t_str`) of a camera timestamp file
pub fn read_frame_timestamps(path: &Path, timezone: UtcOffset) -> Result<Vec<Timestamp>, CameraStreamError> {
    let file = hdf5::File::open(path)?;
    let strings = read_string_dataset(&file.dataset(TIMESTAMP_STR_NAME)?)?;
    let timestamps = strings
        .iter()
        .map(|s| parse_timestamp(s, timezone))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(timestamps)
}

/// Check that a camera's timestamps are usable: non-empty and non-decreasing
pub fn check_timestamps(camera: usize, timestamps: &[Timestamp]) -> Result<(), CameraStreamError> {
    if timestamps.is_empty() {
        return Err(CameraStreamError::Empty(camera));
    }
    if let Some(index) = timestamps.windows(2).position(|pair| pair[1] < pair[0]) {
        return Err(CameraStreamError::NotSorted {
            camera,
            index: index + 1,
        });
    }
    Ok(())
}

/// One camera of an experiment: its decoder and the wall-clock time of every frame.
pub struct CameraStream<S: FrameSource = VideoFile> {
    /// Camera number, starting from 1
    pub camera: usize,
    pub source: S,
    pub timestamps: Vec<Timestamp>,
}

impl CameraStream<VideoFile> {
    /// Open camera `camera` of an experiment
    pub fn open(experiment: &Experiment, camera: usize, timezone: UtcOffset) -> Result<Self, CameraStreamError> {
        let video_path = experiment.camera_video_path(camera);
        let timestamps_path = experiment.camera_timestamps_path(camera);
        Experiment::require(&video_path)?;
        Experiment::require(&timestamps_path)?;

        let timestamps = read_frame_timestamps(&timestamps_path, timezone)?;
        let source = VideoFile::open(&video_path)?;
        log::debug!(
            "Camera {camera}: {} timestamps, {} frames in {}",
            timestamps.len(),
            source.frame_count(),
            video_path.display()
        );
        Self::new(camera, source, timestamps)
    }
}

impl<S: FrameSource> CameraStream<S> {
    pub fn new(camera: usize, source: S, timestamps: Vec<Timestamp>) -> Result<Self, CameraStreamError> {
        check_timestamps(camera, &timestamps)?;
        // Containers sometimes under-report their length (0 = unknown), so only
        // reject streams that are known to be short
        let frames = source.frame_count();
        if frames != 0 && frames < timestamps.len() {
            return Err(CameraStreamError::LengthMismatch {
                camera,
                timestamps: timestamps.len(),
                frames,
            });
        }
        Ok(Self {
            camera,
            source,
            timestamps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdf_strings::to_unicode;
    use crate::video::memory::MemorySource;
    use hdf5::types::VarLenUnicode;
    use ndarray::Array1;
    use opencv::core::Size;
    use time::macros::{datetime, offset};

    #[test]
    fn test_read_frame_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam1.h5");
        let file = hdf5::File::create(&path).unwrap();
        let strings: Array1<VarLenUnicode> = Array1::from(vec![
            to_unicode("2019-05-01 12:00:00.000000").unwrap(),
            to_unicode("2019-05-01 12:00:00.040000").unwrap(),
        ]);
        file.new_dataset_builder()
            .with_data(&strings)
            .create(TIMESTAMP_STR_NAME)
            .unwrap();
        drop(file);

        let timestamps = read_frame_timestamps(&path, offset!(-7)).unwrap();
        assert_eq!(
            timestamps,
            vec![
                datetime!(2019-05-01 12:00:00 -7),
                datetime!(2019-05-01 12:00:00.04 -7)
            ]
        );
    }

    #[test]
    fn test_unsorted_timestamps_rejected() {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        let timestamps = vec![t0, t0, t0 + time::Duration::seconds(1), t0];
        assert!(matches!(
            check_timestamps(2, &timestamps),
            Err(CameraStreamError::NotSorted { camera: 2, index: 3 })
        ));
        assert!(matches!(
            check_timestamps(1, &[]),
            Err(CameraStreamError::Empty(1))
        ));
    }

    #[test]
    fn test_short_video_rejected() {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        let timestamps: Vec<_> = (0..4).map(|i| t0 + time::Duration::seconds(i)).collect();
        let source = MemorySource::new("cam1", Size::new(4, 4), 3, 0);
        let result = CameraStream::new(1, source, timestamps);
        assert!(matches!(
            result,
            Err(CameraStreamError::LengthMismatch { frames: 3, .. })
        ));
    }
}
