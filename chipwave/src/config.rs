//! Configuration management (config.toml)
//!
//! Handles loading, saving, and providing defaults for player settings.
//! Settings are stored in TOML format in the platform-specific config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::decoder::SAMPLE_RATE;
use crate::engine::{DEFAULT_MAX_BLOCK_FRAMES, EngineSettings};
use crate::graph::GraphSettings;
use crate::protocol::DEFAULT_EVENT_CAPACITY;

/// Player configuration.
///
/// Contains all user-configurable settings organized into sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Output and render thread settings
    #[serde(default)]
    pub audio: AudioConfig,
    /// Playback behavior
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Module download settings
    #[serde(default)]
    pub network: NetworkConfig,
    /// Analyser settings
    #[serde(default)]
    pub visualizer: VisualizerConfig,
}

/// Audio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Initial volume (default: 0.8, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Requested device sample rate (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Largest block pulled from the decoder at once (default: 4096)
    #[serde(default = "default_max_block_frames")]
    pub max_block_frames: usize,
    /// Capacity of the render -> control event ring (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Volume ramp length in milliseconds (default: 10, 0 = immediate)
    #[serde(default = "default_ramp_ms")]
    pub ramp_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaybackConfig {
    /// Stop a song after this many seconds of silence (default: 0 = off)
    #[serde(default)]
    pub silence_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest accepted module in bytes (default: 16 MiB)
    #[serde(default = "default_max_module_bytes")]
    pub max_module_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Analyser window size, rounded to a power of two (default: 512)
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

fn default_volume() -> f32 {
    0.8
}
fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}
fn default_max_block_frames() -> usize {
    DEFAULT_MAX_BLOCK_FRAMES
}
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
fn default_ramp_ms() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_module_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_fft_size() -> usize {
    512
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            sample_rate: default_sample_rate(),
            max_block_frames: default_max_block_frames(),
            event_capacity: default_event_capacity(),
            ramp_ms: default_ramp_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_module_bytes: default_max_module_bytes(),
        }
    }
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
        }
    }
}

impl AudioConfig {
    /// Volume ramp length in frames at the engine rate
    pub fn ramp_frames(&self) -> usize {
        (self.ramp_ms as u64 * SAMPLE_RATE as u64 / 1000) as usize
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_block_frames: self.audio.max_block_frames,
            silence_seconds: self.playback.silence_seconds,
        }
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            gain: self.audio.volume,
            ramp_frames: self.audio.ramp_frames(),
            max_block_frames: self.audio.max_block_frames,
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Chipwave\config`
/// On macOS: `~/Library/Application Support/io.chipwave.Chipwave`
/// On Linux: `~/.config/Chipwave`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.chipwave", "", "Chipwave")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from the platform's configuration directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    match config_dir() {
        Some(dir) => load_from(&dir.join("config.toml")),
        None => Config::default(),
    }
}

/// Loads the configuration from an explicit path.
///
/// A missing file yields defaults silently; a malformed one yields defaults
/// with a warning.
pub fn load_from(path: &Path) -> Config {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring malformed config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Saves the configuration to the platform's configuration directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save(config: &Config) -> std::io::Result<()> {
    match config_dir() {
        Some(dir) => save_to(config, &dir.join("config.toml")),
        None => Ok(()),
    }
}

/// Saves the configuration to an explicit path, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, content)
}
