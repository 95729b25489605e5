use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("Could not parse timestamp {0:?}")]
    BadFormat(String),
    #[error("Time step can't be zero; a frame rate of {0} fps gives an infinite range")]
    ZeroStep(u32),
    #[error("Timestamp component out of range: {0}")]
    ComponentRange(#[from] time::error::ComponentRange),
    #[error("Timestamp failed to parse: {0}")]
    ParseError(#[from] time::error::Parse),
    #[error("Timestamp failed to format: {0}")]
    FormatError(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid default timezone {0:?}; expected an offset like -08:00")]
    BadTimezone(String),
    #[error("Config has an invalid frame rate of {0} fps")]
    BadFps(u32),
    #[error("No weight-to-camera time offset was given; set weight_offset_s or pass --offset")]
    MissingWeightOffset,
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Experiment folder {0:?} does not exist")]
    BadFolderPath(PathBuf),
    #[error("Experiment folder name {0:?} does not match the experiment timestamp format")]
    BadFolderName(String),
    #[error("Experiment is missing the expected file {0:?}")]
    MissingFile(PathBuf),
    #[error("Experiment traversal failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Experiment failed due to timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Could not open video source {0}")]
    OpenFailed(String),
    #[error("Could not open video encoder for {0:?}")]
    EncoderFailed(PathBuf),
    #[error("Couldn't read frame {index} from {source_name}!")]
    ReadFailed { index: usize, source_name: String },
    #[error("Video failed due to OpenCV error: {0}")]
    OpenCVError(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum CameraStreamError {
    #[error("Camera {0} has no frame timestamps")]
    Empty(usize),
    #[error("Camera {camera} timestamps go backwards at frame {index}")]
    NotSorted { camera: usize, index: usize },
    #[error("CameraStream failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("CameraStream failed due to timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("CameraStream failed due to experiment error: {0}")]
    ExperimentError(#[from] ExperimentError),
    #[error("CameraStream failed due to video error: {0}")]
    VideoError(#[from] VideoError),
    #[error("Camera {camera} has {timestamps} timestamps but its video has only {frames} frames")]
    LengthMismatch {
        camera: usize,
        timestamps: usize,
        frames: usize,
    },
}

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Alignment failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Alignment could not store string {0:?} in HDF5")]
    BadString(String),
    #[error("Alignment attribute {0} has no readable string value")]
    MissingString(String),
    #[error("Alignment failed due to timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("Alignment frame table is empty")]
    EmptyTable,
    #[error("Alignment failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Synchronizer was given no camera streams")]
    NoStreams,
    #[error("Stitched video supports at most {max} cameras, got {0}", max = super::constants::NUMBER_OF_CAMERAS)]
    TooManyStreams(usize),
    #[error("Camera streams do not overlap: latest start {latest_start} is not before earliest end {earliest_end}")]
    NoOverlap {
        latest_start: String,
        earliest_end: String,
    },
    #[error("Camera {0} has an empty timestamp sequence")]
    EmptyStream(usize),
    #[error("Synchronizer failed due to timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("Synchronizer failed due to video error: {0}")]
    VideoError(#[from] VideoError),
    #[error("Synchronizer failed due to alignment error: {0}")]
    AlignmentError(#[from] AlignmentError),
    #[error("Synchronizer failed due to camera stream error: {0}")]
    CameraStreamError(#[from] CameraStreamError),
    #[error("Synchronizer failed due to experiment error: {0}")]
    ExperimentError(#[from] ExperimentError),
}

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("WeightSeries failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("WeightSeries failed due to timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("Weight dataset has unsupported shape {0:?}; expected 1, 2 or 3 dimensions")]
    BadShape(Vec<usize>),
    #[error("Weight dataset has {weights} samples but {timestamps} timestamps")]
    LengthMismatch { weights: usize, timestamps: usize },
    #[error("Weight file has no samples")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Weight plot failed due to OpenCV error: {0}")]
    OpenCVError(#[from] opencv::Error),
    #[error("Weight plot needs at least one series")]
    NoSeries,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player failed due to video error: {0}")]
    VideoError(#[from] VideoError),
    #[error("Player failed due to plot error: {0}")]
    PlotError(#[from] PlotError),
    #[error("Player failed due to OpenCV error: {0}")]
    OpenCVError(#[from] opencv::Error),
    #[error("Player failed due to config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Player was given {timestamps} timestamps for a video of {frames} frames")]
    LengthMismatch { timestamps: usize, frames: usize },
}

#[derive(Debug, Error)]
pub enum HsvError {
    #[error("HSV threshold failed due to OpenCV error: {0}")]
    OpenCVError(#[from] opencv::Error),
    #[error("HSV threshold failed due to video error: {0}")]
    VideoError(#[from] VideoError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Experiment error: {0}")]
    ExperimentError(#[from] ExperimentError),
    #[error("Processor failed due to Synchronizer error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Processor failed due to Alignment error: {0}")]
    AlignmentError(#[from] AlignmentError),
    #[error("Processor failed due to CameraStream error: {0}")]
    CameraStreamError(#[from] CameraStreamError),
    #[error("Processor failed due to WeightSeries error: {0}")]
    WeightError(#[from] WeightError),
    #[error("Processor failed due to Player error: {0}")]
    PlayerError(#[from] PlayerError),
    #[error("Processor failed due to Plot error: {0}")]
    PlotError(#[from] PlotError),
    #[error("Processor failed due to Video error: {0}")]
    VideoError(#[from] VideoError),
    #[error("Processor failed due to Timestamp error: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor panicked: {0}")]
    WorkerPanic(String),
}
