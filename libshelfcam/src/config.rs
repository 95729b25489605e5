use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use time::UtcOffset;

use super::error::ConfigError;
use super::timestamp::parse_offset;

/// Written above the YAML of every config file
const CONFIG_HEADER: &str = "\
# default_timezone is a fixed UTC offset applied to timestamps stored without a zone.
# It does not follow daylight saving time: use -07:00 for experiments recorded in
# Pacific summer time and -08:00 for winter ones.
";

/// Structure representing the rig and playback configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml.
/// Command line flags override the values loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Offset applied to timestamps stored without zone information.
    /// A fixed offset, so it must be changed by hand across daylight saving time
    pub default_timezone: String,
    pub video_fps: u32,
    /// Skew between the weight sensor clock and the camera clock, in seconds.
    /// Rig specific, so it has no default
    pub weight_offset_s: Option<f64>,
    pub weight_group_prefix: String,
    /// Half width of the weight plot sliding window, in seconds
    pub plot_window_s: f64,
    /// Fraction of the video height occupied by the weight plot (1.0 = side strip)
    pub plot_scale: f64,
    pub out_scale: f64,
    pub multicam_scale: f64,
    pub frame_increment: i64,
    pub coarse_multiplier: i64,
    pub time_increment_s: f64,
    pub fourcc: String,
    pub n_threads: Option<usize>,
    pub overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timezone: String::from("-08:00"),
            video_fps: 25,
            weight_offset_s: None,
            weight_group_prefix: String::from("plate_"),
            plot_window_s: 4.0,
            plot_scale: 0.3,
            out_scale: 1.0,
            multicam_scale: 0.5,
            frame_increment: 8,
            coarse_multiplier: 10,
            time_increment_s: 0.1,
            fourcc: String::from("avc1"),
            n_threads: None,
            overwrite: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file, replacing any existing file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        let mut file = std::fs::File::create(config_path)?;
        file.write_all(CONFIG_HEADER.as_bytes())?;
        file.write_all(yaml_str.as_bytes())?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<UtcOffset, ConfigError> {
        parse_offset(&self.default_timezone)
            .map_err(|_| ConfigError::BadTimezone(self.default_timezone.clone()))
    }

    pub fn fps(&self) -> Result<u32, ConfigError> {
        if self.video_fps == 0 {
            Err(ConfigError::BadFps(self.video_fps))
        } else {
            Ok(self.video_fps)
        }
    }

    pub fn weight_offset(&self) -> Result<f64, ConfigError> {
        self.weight_offset_s.ok_or(ConfigError::MissingWeightOffset)
    }

    /// Number of batch workers; falls back to the available hardware parallelism
    pub fn worker_count(&self) -> usize {
        match self.n_threads {
            Some(n) if n >= 1 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// The fourcc code as four characters, padded with spaces if short
    pub fn fourcc_chars(&self) -> [char; 4] {
        let mut chars = [' '; 4];
        for (slot, c) in chars.iter_mut().zip(self.fourcc.chars()) {
            *slot = c;
        }
        chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.weight_offset_s = Some(13.0);
        config.video_fps = 30;
        config.write_config_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# default_timezone is a fixed UTC offset"));

        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded.weight_offset_s, Some(13.0));
        assert_eq!(loaded.video_fps, 30);
        assert_eq!(loaded.weight_group_prefix, "plate_");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("video_fps: 10\n").unwrap();
        assert_eq!(config.video_fps, 10);
        assert_eq!(config.frame_increment, 8);
        assert!(matches!(
            config.weight_offset(),
            Err(ConfigError::MissingWeightOffset)
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert_eq!(config.timezone().unwrap(), UtcOffset::from_hms(-8, 0, 0).unwrap());
        config.default_timezone = String::from("Pacific");
        assert!(matches!(config.timezone(), Err(ConfigError::BadTimezone(_))));
        config.default_timezone = String::from("a€b");
        assert!(matches!(config.timezone(), Err(ConfigError::BadTimezone(_))));
        config.video_fps = 0;
        assert!(matches!(config.fps(), Err(ConfigError::BadFps(0))));
        assert_eq!(config.fourcc_chars(), ['a', 'v', 'c', '1']);
    }

    #[test]
    fn test_missing_config_file() {
        let result = Config::read_config_file(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }
}
