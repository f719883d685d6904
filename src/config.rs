// Engine configuration - Scheduler, playback and codec settings loaded from RON

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Scheduling pass settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lead time added to the transport position before the first trigger
    pub safety_margin_ms: f64,
    /// Minimum tick gap enforced between consecutive trigger groups
    pub nudge_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 10.0,
            nudge_ticks: 1,
        }
    }
}

/// Playback state machine settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frames to wait for the transport to report the requested tempo
    pub max_tempo_retries: u32,
    /// Accepted difference between requested and reported BPM
    pub tempo_tolerance_bpm: f64,
    /// Capacity of the playhead update ring buffer
    pub playhead_channel_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_tempo_retries: 3,
            tempo_tolerance_bpm: 0.01,
            playhead_channel_capacity: 64,
        }
    }
}

/// MIDI export settings. Resolution is always 480 PPQ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Value written to CC11 on every exported track
    pub expression_value: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            expression_value: 127,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub playback: PlaybackConfig,
    pub codec: CodecConfig,
}

impl EngineConfig {
    /// `<config dir>/seqdaw/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seqdaw").join("config.ron"))
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = ron::from_str(text)?;
        config.codec.expression_value = config.codec.expression_value.min(127);
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron(&text)?;
        debug!(path = %path.as_ref().display(), "Loaded engine config");
        Ok(config)
    }

    /// Load `path` (or the default location); fall back to defaults when the
    /// file is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config");
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}
