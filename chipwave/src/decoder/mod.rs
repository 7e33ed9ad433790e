//! Module decoder capability
//!
//! The render engine drives a decoder through [`ChipDecoder`]. Chip emulation
//! lives behind this trait; the crate ships a PCM WAV backend
//! ([`WavDecoder`]) so the player can produce sound without an emulator.
//!
//! Decoders always produce samples at [`SAMPLE_RATE`]. A "block" is one
//! sample (mono) or one sample pair (stereo).

mod wav;

pub use wav::WavDecoder;

use thiserror::Error;

/// Output sample rate of every decoder (blocks per second)
pub const SAMPLE_RATE: u32 = 44_100;

/// U8 PCM value representing silence
pub const SILENCE_U8: u8 = 128;

/// Sample formats a decoder can generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Unsigned 8-bit
    #[default]
    U8,
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 16-bit big-endian
    S16Be,
}

impl SampleFormat {
    /// Bytes per sample of one channel
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    #[error("module is empty")]
    Empty,
    #[error("invalid module format: {0}")]
    Format(String),
    #[error("unsupported module: {0}")]
    Unsupported(String),
    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),
    #[error("song {song} out of range ({songs} songs)")]
    InvalidSong { song: usize, songs: usize },
    #[error("no module loaded")]
    NotLoaded,
}

/// Information about a loaded module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleInfo {
    /// Author name, empty when unknown
    pub author: String,
    /// Title, empty when unknown
    pub title: String,
    /// Creation date, empty when unknown
    pub date: String,
    /// 1 for mono, 2 for stereo
    pub channels: u8,
    /// Index of the song that should be played by default
    pub default_song: usize,
    /// Per-song length in milliseconds, `None` when indeterminate
    pub durations: Vec<Option<u32>>,
}

impl ModuleInfo {
    /// Number of songs in the module
    pub fn songs(&self) -> usize {
        self.durations.len()
    }

    /// Length of `song` in milliseconds, `None` when indeterminate or out of range
    pub fn duration(&self, song: usize) -> Option<u32> {
        self.durations.get(song).copied().flatten()
    }
}

/// Decoder driven by the render engine
///
/// Implementations are owned exclusively by the render thread. `generate`,
/// `seek` and the position accessors are called from the real-time callback
/// and must not block.
pub trait ChipDecoder: Send + 'static {
    /// Parse a module. `filename` is a format hint.
    ///
    /// On error the decoder state is unspecified; the engine discards it.
    fn load(&mut self, filename: &str, module: &[u8]) -> Result<(), DecoderError>;

    /// Information about the loaded module
    fn info(&self) -> &ModuleInfo;

    /// Prepare playback of `song`. `duration_ms` of `None` plays forever.
    fn play_song(&mut self, song: usize, duration_ms: Option<u32>) -> Result<(), DecoderError>;

    /// Fill `buffer` with samples, returning the number of bytes written
    ///
    /// Fewer bytes than `buffer.len()` means the song ended.
    fn generate(&mut self, buffer: &mut [u8], format: SampleFormat) -> usize;

    /// Move the playback position to `position_ms`
    fn seek(&mut self, position_ms: u32);

    /// Current playback position in milliseconds
    fn position_ms(&self) -> u32;

    /// Current playback position in blocks
    fn blocks_played(&self) -> u64;

    /// Stop playback after `seconds` of silence (0 disables)
    fn detect_silence(&mut self, _seconds: u32) {}
}

/// Convert a block count at [`SAMPLE_RATE`] to milliseconds
pub fn blocks_to_ms(blocks: u64) -> u32 {
    (blocks * 1000 / SAMPLE_RATE as u64).min(u32::MAX as u64) as u32
}

/// Convert milliseconds to a block count at [`SAMPLE_RATE`]
pub fn ms_to_blocks(ms: u32) -> u64 {
    ms as u64 * SAMPLE_RATE as u64 / 1000
}
