// Experiment folder contents
pub const CAMERA_FILE_PREFIX: &str = "cam";
pub const WEIGHTS_FILE_PREFIX: &str = "weights";
pub const MULTICAM_FILE_PREFIX: &str = "multicam";
pub const COMPOSITE_FILE_PREFIX: &str = "composite";
pub const VIDEO_EXTENSION: &str = "mp4";
pub const HDF5_EXTENSION: &str = "h5";
/// Folders with this suffix are never treated as experiments
pub const IGNORED_FOLDER_SUFFIX: &str = "_ignore";

// HDF5 names shared by the camera, weight and alignment files
pub const TIMESTAMP_STR_NAME: &str = "t_str";
pub const WEIGHT_NAME: &str = "w";
pub const ALIGNMENT_T_START_NAME: &str = "t_start";
pub const ALIGNMENT_T_END_NAME: &str = "t_end";
pub const ALIGNMENT_FPS_NAME: &str = "fps";
pub const ALIGNMENT_FRAME_NUMS_NAME: &str = "frame_nums";
pub const ALIGNMENT_VERSION_NAME: &str = "version";

/// Cameras on the rig are numbered 1..=NUMBER_OF_CAMERAS
pub const NUMBER_OF_CAMERAS: usize = 4;

// Key codes returned by highgui::wait_key_ex. Arrow keys differ per platform.
pub const KEY_NONE: i32 = -1;
pub const KEY_ESCAPE: i32 = 27;
pub const KEY_SPACE: i32 = ' ' as i32;
pub const KEYS_LEFT: [i32; 3] = [63234, 65361, 2424832];
pub const KEYS_UP: [i32; 3] = [63232, 65362, 2490368];
pub const KEYS_RIGHT: [i32; 3] = [63235, 65363, 2555904];
pub const KEYS_DOWN: [i32; 3] = [63233, 65364, 2621440];

pub const WINDOW_NAME: &str = "Frame";
