use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use time::UtcOffset;

use super::constants::{
    ALIGNMENT_FPS_NAME, ALIGNMENT_FRAME_NUMS_NAME, ALIGNMENT_T_END_NAME, ALIGNMENT_T_START_NAME,
    ALIGNMENT_VERSION_NAME,
};
use super::error::AlignmentError;
use super::hdf_strings::{read_string_attr, to_unicode};
use super::timestamp::{format_timestamp, parse_timestamp, timeline_from_start, Timestamp};

/// This is the version of the alignment file format
const FORMAT_VERSION: &str = "1.0";

// Structure
// multicam_<experiment>.h5 - t_start, t_end, fps, version
// |---- frame_nums(dset) [camera, virtual frame]

/// The result of a multicam synchronization run, as stored next to the stitched video.
///
/// `frame_nums[[camera, n]]` is the real frame of `camera` (0-based row) shown at
/// virtual frame `n`. `t_start` and `t_end` are the first and last entries of
/// the virtual timeline, which can be rebuilt from `t_start`, `fps` and the number
/// of columns without touching the per-camera timestamp files again.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedAlignment {
    pub t_start: Timestamp,
    pub t_end: Timestamp,
    pub fps: u32,
    pub frame_nums: Array2<u32>,
}

impl PersistedAlignment {
    pub fn n_cameras(&self) -> usize {
        self.frame_nums.nrows()
    }

    pub fn n_frames(&self) -> usize {
        self.frame_nums.ncols()
    }

    /// Rebuild the virtual timeline
    pub fn timeline(&self) -> Result<Vec<Timestamp>, AlignmentError> {
        Ok(timeline_from_start(self.t_start, self.fps, self.n_frames())?)
    }

    /// Write the alignment to `path`.
    ///
    /// The file is written under a temporary name and moved into place, so an
    /// interrupted run never leaves a half-written alignment that would later be reused.
    pub fn write(&self, path: &Path) -> Result<(), AlignmentError> {
        if self.n_frames() == 0 {
            return Err(AlignmentError::EmptyTable);
        }
        let tmp_path = temporary_path(path);
        {
            let file = File::create(&tmp_path)?;
            write_string_attr(&file, ALIGNMENT_T_START_NAME, &format_timestamp(&self.t_start)?)?;
            write_string_attr(&file, ALIGNMENT_T_END_NAME, &format_timestamp(&self.t_end)?)?;
            let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
            write_string_attr(&file, ALIGNMENT_VERSION_NAME, &version)?;
            file.new_attr::<u32>()
                .create(ALIGNMENT_FPS_NAME)?
                .write_scalar(&self.fps)?;
            file.new_dataset_builder()
                .with_data(&self.frame_nums)
                .create(ALIGNMENT_FRAME_NUMS_NAME)?;
            file.close()?;
        }
        std::fs::rename(&tmp_path, path)?;
        log::info!(
            "Saved alignment of {} cameras x {} frames to {}",
            self.n_cameras(),
            self.n_frames(),
            path.display()
        );
        Ok(())
    }

    /// Read an alignment written by `write` (or by the original acquisition tools)
    pub fn read(path: &Path, timezone: UtcOffset) -> Result<Self, AlignmentError> {
        let file = File::open(path)?;
        let t_start = read_timestamp_attr(&file, ALIGNMENT_T_START_NAME, timezone)?;
        let t_end = read_timestamp_attr(&file, ALIGNMENT_T_END_NAME, timezone)?;
        let fps = file.attr(ALIGNMENT_FPS_NAME)?.read_scalar::<u32>()?;
        let frame_nums = file
            .dataset(ALIGNMENT_FRAME_NUMS_NAME)?
            .read_2d::<u32>()?;
        if frame_nums.ncols() == 0 {
            return Err(AlignmentError::EmptyTable);
        }
        Ok(Self {
            t_start,
            t_end,
            fps,
            frame_nums,
        })
    }

    /// Return the alignment already stored at `path` if it may be reused.
    ///
    /// Reuse requires that the file exists, that `overwrite` is off, and that it was
    /// computed for the same frame rate. Returns None when it must be recomputed.
    pub fn reuse_existing(
        path: &Path,
        fps: u32,
        overwrite: bool,
        timezone: UtcOffset,
    ) -> Result<Option<Self>, AlignmentError> {
        if !path.exists() {
            return Ok(None);
        }
        if overwrite {
            log::info!("Alignment {} already exists, overwriting...", path.display());
            return Ok(None);
        }
        let existing = Self::read(path, timezone)?;
        if existing.fps != fps {
            log::warn!(
                "Alignment {} was made at {} fps but {} fps was requested, recomputing...",
                path.display(),
                existing.fps,
                fps
            );
            return Ok(None);
        }
        log::info!("Alignment {} already exists, nothing to do!", path.display());
        Ok(Some(existing))
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_string_attr(file: &File, name: &str, value: &str) -> Result<(), AlignmentError> {
    let value: VarLenUnicode =
        to_unicode(value).ok_or_else(|| AlignmentError::BadString(value.to_string()))?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_timestamp_attr(file: &File, name: &str, timezone: UtcOffset) -> Result<Timestamp, AlignmentError> {
    let text = read_string_attr(&file.attr(name)?)
        .map_err(|_| AlignmentError::MissingString(name.to_string()))?;
    Ok(parse_timestamp(&text, timezone)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use time::macros::{datetime, offset};

    fn sample_alignment() -> PersistedAlignment {
        PersistedAlignment {
            t_start: datetime!(2019-05-01 12:00:00.1 -8),
            t_end: datetime!(2019-05-01 12:00:01.1 -8),
            fps: 1,
            frame_nums: array![[0, 1], [0, 1], [2, 3]],
        }
    }

    #[test]
    fn test_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multicam.h5");
        let alignment = sample_alignment();
        alignment.write(&path).unwrap();
        assert!(!temporary_path(&path).exists());

        let loaded = PersistedAlignment::read(&path, offset!(UTC)).unwrap();
        assert_eq!(loaded, alignment);
        assert_eq!(
            loaded.timeline().unwrap(),
            vec![alignment.t_start, alignment.t_end]
        );
    }

    #[test]
    fn test_reuse_existing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multicam.h5");
        assert!(PersistedAlignment::reuse_existing(&path, 1, false, offset!(-8))
            .unwrap()
            .is_none());

        let alignment = sample_alignment();
        alignment.write(&path).unwrap();
        let first = PersistedAlignment::reuse_existing(&path, 1, false, offset!(-8))
            .unwrap()
            .unwrap();
        let second = PersistedAlignment::reuse_existing(&path, 1, false, offset!(-8))
            .unwrap()
            .unwrap();
        assert_eq!(first.frame_nums, alignment.frame_nums);
        assert_eq!(first.frame_nums, second.frame_nums);

        // overwrite or a different frame rate force a recompute
        assert!(PersistedAlignment::reuse_existing(&path, 1, true, offset!(-8))
            .unwrap()
            .is_none());
        assert!(PersistedAlignment::reuse_existing(&path, 25, false, offset!(-8))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut alignment = sample_alignment();
        alignment.frame_nums = Array2::zeros((3, 0));
        assert!(matches!(
            alignment.write(&dir.path().join("empty.h5")),
            Err(AlignmentError::EmptyTable)
        ));
    }
}
