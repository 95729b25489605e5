use std::path::{Path, PathBuf};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{PrimitiveDateTime, UtcOffset};

use super::constants::{
    CAMERA_FILE_PREFIX, COMPOSITE_FILE_PREFIX, HDF5_EXTENSION, IGNORED_FOLDER_SUFFIX,
    MULTICAM_FILE_PREFIX, VIDEO_EXTENSION, WEIGHTS_FILE_PREFIX,
};
use super::error::ExperimentError;
use super::timestamp::Timestamp;

const EXPERIMENT_FOLDER_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");

/// One experiment recording: a folder named after the time the experiment started,
/// holding the per-camera videos and timestamp files plus the weight sensor file.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    folder: PathBuf,
    name: String,
    start: Timestamp,
}

impl Experiment {
    /// Open the experiment in `folder`. The last path component must be the
    /// experiment start time.
    pub fn new(folder: &Path, timezone: UtcOffset) -> Result<Self, ExperimentError> {
        if !folder.is_dir() {
            return Err(ExperimentError::BadFolderPath(folder.to_path_buf()));
        }
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ExperimentError::BadFolderName(folder.to_string_lossy().to_string()))?;
        let start = parse_experiment_name(&name, timezone)?;
        Ok(Self {
            folder: folder.to_path_buf(),
            name,
            start,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &Timestamp {
        &self.start
    }

    fn file(&self, prefix: &str, extension: &str) -> PathBuf {
        self.folder
            .join(format!("{}_{}.{}", prefix, self.name, extension))
    }

    /// Video of camera `camera` (numbered from 1)
    pub fn camera_video_path(&self, camera: usize) -> PathBuf {
        self.file(&format!("{CAMERA_FILE_PREFIX}{camera}"), VIDEO_EXTENSION)
    }

    /// Frame timestamps of camera `camera` (numbered from 1)
    pub fn camera_timestamps_path(&self, camera: usize) -> PathBuf {
        self.file(&format!("{CAMERA_FILE_PREFIX}{camera}"), HDF5_EXTENSION)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.file(WEIGHTS_FILE_PREFIX, HDF5_EXTENSION)
    }

    pub fn multicam_video_path(&self) -> PathBuf {
        self.file(MULTICAM_FILE_PREFIX, VIDEO_EXTENSION)
    }

    pub fn alignment_path(&self) -> PathBuf {
        self.file(MULTICAM_FILE_PREFIX, HDF5_EXTENSION)
    }

    pub fn composite_video_path(&self) -> PathBuf {
        self.file(COMPOSITE_FILE_PREFIX, VIDEO_EXTENSION)
    }

    /// Fail early with the missing path instead of deep inside a reader
    pub fn require(path: &Path) -> Result<(), ExperimentError> {
        if path.exists() {
            Ok(())
        } else {
            Err(ExperimentError::MissingFile(path.to_path_buf()))
        }
    }
}

/// Interpret an experiment folder name as its start time
pub fn parse_experiment_name(name: &str, timezone: UtcOffset) -> Result<Timestamp, ExperimentError> {
    PrimitiveDateTime::parse(name, EXPERIMENT_FOLDER_FORMAT)
        .map(|t| t.assume_offset(timezone))
        .map_err(|_| ExperimentError::BadFolderName(name.to_string()))
}

/// Find all experiments under `parent`, in name (and so chronological) order.
///
/// Folders ending in `_ignore` are skipped silently, folders whose names are not
/// experiment timestamps are logged and skipped. If `window` is given, only
/// experiments that started within it (inclusive) are returned.
pub fn list_experiments(
    parent: &Path,
    timezone: UtcOffset,
    window: Option<(Timestamp, Timestamp)>,
) -> Result<Vec<Experiment>, ExperimentError> {
    if !parent.is_dir() {
        return Err(ExperimentError::BadFolderPath(parent.to_path_buf()));
    }
    let mut folders: Vec<PathBuf> = Vec::new();
    for item in parent.read_dir()? {
        let item_path = item?.path();
        if item_path.is_dir() {
            folders.push(item_path);
        }
    }
    folders.sort();

    let mut experiments = Vec::new();
    for folder in folders {
        let name = match folder.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if name.ends_with(IGNORED_FOLDER_SUFFIX) {
            continue;
        }
        let experiment = match Experiment::new(&folder, timezone) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Can't parse the name of this folder: '{name}' ({e}). Skipping...");
                continue;
            }
        };
        if let Some((from, to)) = window {
            if experiment.start < from || experiment.start > to {
                continue;
            }
        }
        experiments.push(experiment);
    }
    Ok(experiments)
}
