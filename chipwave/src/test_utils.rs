//! Shared test utilities for unit tests

use crate::decoder::{ChipDecoder, DecoderError, ModuleInfo, SampleFormat, blocks_to_ms, ms_to_blocks};

// ============================================================================
// Scripted Decoder
// ============================================================================

/// Build a module understood by [`ScriptedDecoder`]
///
/// Layout: `[channels, fill, duration_ms (u32 LE, 0 = indeterminate)]`
pub fn scripted_module(channels: u8, fill: u8, duration_ms: Option<u32>) -> Vec<u8> {
    let mut data = vec![channels, fill];
    data.extend_from_slice(&duration_ms.unwrap_or(0).to_le_bytes());
    data
}

/// Deterministic decoder for engine tests
///
/// Mono output is `fill` on every sample; stereo output alternates
/// `fill` (left) and `255 - fill` (right). Playback ends at the song duration.
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    info: ModuleInfo,
    fill: u8,
    position: u64,
    loaded: bool,
    playing: bool,
    /// Number of `generate` calls
    pub generate_calls: usize,
    /// Every `seek` argument in call order
    pub seeks: Vec<u32>,
    /// Last value passed to `detect_silence`
    pub silence_seconds: u32,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_blocks(&self) -> Option<u64> {
        self.info.duration(self.info.default_song).map(ms_to_blocks)
    }
}

impl ChipDecoder for ScriptedDecoder {
    fn load(&mut self, filename: &str, module: &[u8]) -> Result<(), DecoderError> {
        self.loaded = false;
        self.playing = false;
        if module.is_empty() {
            return Err(DecoderError::Empty);
        }
        if module.len() < 6 {
            return Err(DecoderError::Format("truncated scripted module".into()));
        }
        let duration = u32::from_le_bytes([module[2], module[3], module[4], module[5]]);
        self.info = ModuleInfo {
            author: "Scripted".into(),
            title: filename.to_string(),
            date: String::new(),
            channels: module[0],
            default_song: 0,
            durations: vec![(duration != 0).then_some(duration)],
        };
        self.fill = module[1];
        self.position = 0;
        self.loaded = true;
        Ok(())
    }

    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn play_song(&mut self, song: usize, _duration_ms: Option<u32>) -> Result<(), DecoderError> {
        if !self.loaded {
            return Err(DecoderError::NotLoaded);
        }
        if song >= self.info.songs() {
            return Err(DecoderError::InvalidSong {
                song,
                songs: self.info.songs(),
            });
        }
        self.position = 0;
        self.playing = true;
        Ok(())
    }

    fn generate(&mut self, buffer: &mut [u8], format: SampleFormat) -> usize {
        self.generate_calls += 1;
        assert_eq!(format, SampleFormat::U8);
        if !self.playing {
            return 0;
        }
        let channels = self.info.channels.max(1) as usize;
        let wanted = (buffer.len() / channels) as u64;
        let blocks = match self.end_blocks() {
            Some(end) => wanted.min(end.saturating_sub(self.position)),
            None => wanted,
        } as usize;

        for (i, b) in buffer[..blocks * channels].iter_mut().enumerate() {
            *b = if channels == 2 && i % 2 == 1 {
                255 - self.fill
            } else {
                self.fill
            };
        }
        self.position += blocks as u64;
        blocks * channels
    }

    fn seek(&mut self, position_ms: u32) {
        self.seeks.push(position_ms);
        self.position = ms_to_blocks(position_ms);
    }

    fn position_ms(&self) -> u32 {
        blocks_to_ms(self.position)
    }

    fn blocks_played(&self) -> u64 {
        self.position
    }

    fn detect_silence(&mut self, seconds: u32) {
        self.silence_seconds = seconds;
    }
}
