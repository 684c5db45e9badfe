use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// Every field defaults, so the file is optional.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of exported analysis documents (`<track id>.json`).
    pub analysis_dir: Option<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Transcoding settings for non-WAV audio.
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// ffmpeg binary, looked up on `PATH` unless absolute.
    pub ffmpeg: String,
    /// MP3 output bitrate in kbps.
    pub mp3_bitrate: u32,
    /// Sample rate non-WAV input is decoded to.
    pub sample_rate: u32,
    /// Channel count non-WAV input is decoded to.
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            mp3_bitrate: 128,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/splicer/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn data_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", crate::APP_NAME)?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir).ok();
    Some(data_dir.to_path_buf())
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    match data_dir() {
        Some(dir) => dir.join("splicer.db"),
        // Fallback: current directory
        None => PathBuf::from("splicer.db"),
    }
}

/// Resolve the default analysis document directory.
pub fn default_analysis_dir() -> PathBuf {
    match data_dir() {
        Some(dir) => dir.join("analyses"),
        None => PathBuf::from("analyses"),
    }
}
