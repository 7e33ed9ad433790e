//! Real-time render engine
//!
//! Runs inside the audio device callback. Each invocation:
//!
//! 1. Drains queued commands (non-blocking) and applies them in send order
//! 2. Outputs silence if nothing is loaded (`channel_count == 0`)
//! 3. Pulls one U8 block per chunk from the decoder into a reused buffer
//! 4. Converts it to planar f32 (mono is duplicated into both channels)
//! 5. Posts a `Position` event
//!
//! # State machine
//!
//! ```text
//! Idle ──Load──► Loaded ──SetPosition──► Loaded
//!                  ▲                        │
//!                  └──────────Load──────────┘
//! ```
//!
//! A `Load` is the only operation allowed to take noticeable time. It decodes
//! into a standby decoder and swaps it in only on success, so a malformed
//! module never interrupts the song already playing.

mod convert;


pub use convert::{to_planar, u8_to_f32};

use std::sync::Arc;

use crate::decoder::{ChipDecoder, DecoderError, SILENCE_U8, SampleFormat};
use crate::metrics::RenderMetrics;
use crate::protocol::{Command, Event, RenderPort, SongInfo};

/// Default SampleBlock capacity in frames
pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 4096;

/// Engine tuning that must be fixed before the render thread starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Largest block pulled from the decoder at once (larger callbacks are chunked)
    pub max_block_frames: usize,
    /// Silence detection period forwarded to the decoder after each load (0 = off)
    pub silence_seconds: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
            silence_seconds: 0,
        }
    }
}

/// State exclusively owned by the render thread
#[derive(Debug)]
pub struct RenderState<D> {
    pub(crate) decoder: D,
    /// 0 = nothing loaded (silence), 1 = mono, 2 = stereo
    pub(crate) channel_count: u8,
    pub(crate) current_song: usize,
    pub(crate) loaded: bool,
}

/// Render engine driving a [`ChipDecoder`] from the audio callback
pub struct RenderEngine<D: ChipDecoder> {
    state: RenderState<D>,
    /// Second decoder instance that receives loads before being swapped in
    standby: D,
    port: RenderPort,
    /// Reusable SampleBlock (max_block_frames * 2 bytes)
    block: Vec<u8>,
    max_block_frames: usize,
    silence_seconds: u32,
    metrics: Arc<RenderMetrics>,
}

impl<D: ChipDecoder> RenderEngine<D> {
    /// Create an idle engine. Both decoders are owned for the engine's lifetime.
    pub fn new(
        active: D,
        standby: D,
        port: RenderPort,
        settings: EngineSettings,
        metrics: Arc<RenderMetrics>,
    ) -> Self {
        let max_block_frames = settings.max_block_frames.max(1);
        Self {
            state: RenderState {
                decoder: active,
                channel_count: 0,
                current_song: 0,
                loaded: false,
            },
            standby,
            port,
            block: vec![SILENCE_U8; max_block_frames * 2],
            max_block_frames,
            silence_seconds: settings.silence_seconds,
            metrics,
        }
    }

    /// 0 while idle, otherwise the loaded module's channel count
    pub fn channel_count(&self) -> u8 {
        self.state.channel_count
    }

    pub fn current_song(&self) -> usize {
        self.state.current_song
    }

    pub fn is_loaded(&self) -> bool {
        self.state.loaded
    }

    /// The decoder currently producing audio
    pub fn decoder(&self) -> &D {
        &self.state.decoder
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    /// Render one callback worth of planar output
    ///
    /// Always returns `true`: the engine never asks to be stopped, the owner
    /// of the output stream decides its lifetime.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        RenderMetrics::add(&self.metrics.callbacks, 1);
        self.drain_commands();

        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);
        RenderMetrics::add(&self.metrics.frames_rendered, frames as u64);

        if self.state.channel_count == 0 {
            left.fill(0.0);
            right.fill(0.0);
            return true;
        }

        let channels = self.state.channel_count as usize;
        let chunk = self.max_block_frames;
        for (l, r) in left.chunks_mut(chunk).zip(right.chunks_mut(chunk)) {
            let block = &mut self.block[..l.len() * channels];
            let written = self.state.decoder.generate(block, SampleFormat::U8);
            if written < block.len() {
                block[written..].fill(SILENCE_U8);
                RenderMetrics::add(&self.metrics.short_blocks, 1);
            }
            to_planar(block, channels, l, r);
        }

        let value = self.position_fraction();
        self.port.post(Event::Position { value });
        true
    }

    /// Apply every queued command, coalescing redundant seeks
    ///
    /// A successful `Load` discards seeks queued before it (they targeted the
    /// previous song); of the remaining seeks, only the newest runs.
    fn drain_commands(&mut self) {
        let mut pending_seek: Option<f64> = None;
        while let Some(command) = self.port.try_recv() {
            RenderMetrics::add(&self.metrics.commands_applied, 1);
            match command {
                Command::Load { filename, data } => {
                    // A failed load keeps the current song, and with it the seek
                    if self.apply_load(&filename, &data) && pending_seek.take().is_some() {
                        RenderMetrics::add(&self.metrics.seeks_coalesced, 1);
                    }
                }
                Command::SetPosition { value } => {
                    if pending_seek.replace(value).is_some() {
                        RenderMetrics::add(&self.metrics.seeks_coalesced, 1);
                    }
                }
            }
        }
        if let Some(value) = pending_seek {
            self.apply_seek(value);
        }
    }

    /// Load into the standby decoder and start its default song
    fn prepare_standby(&mut self, filename: &str, data: &[u8]) -> Result<(u8, usize), DecoderError> {
        self.standby.load(filename, data)?;
        let info = self.standby.info();
        let channels = info.channels;
        if !(1..=2).contains(&channels) {
            return Err(DecoderError::UnsupportedChannels(channels as u16));
        }
        let song = info.default_song;
        self.standby.play_song(song, None)?;
        Ok((channels, song))
    }

    /// Returns false if the module was rejected and the previous song kept
    fn apply_load(&mut self, filename: &str, data: &[u8]) -> bool {
        let (channels, song) = match self.prepare_standby(filename, data) {
            Ok(prepared) => prepared,
            Err(e) => {
                RenderMetrics::add(&self.metrics.load_failures, 1);
                self.port
                    .post(Event::error(format!("Failed to load {filename}: {e}")));
                return false;
            }
        };

        std::mem::swap(&mut self.state.decoder, &mut self.standby);
        self.state.channel_count = channels;
        self.state.current_song = song;
        self.state.loaded = true;
        if self.silence_seconds > 0 {
            self.state.decoder.detect_silence(self.silence_seconds);
        }

        let info = self.state.decoder.info();
        let song_info = SongInfo {
            author: info.author.clone(),
            title: info.title.clone(),
            date: info.date.clone(),
            duration_ms: info.duration(song),
            songs: info.songs(),
            song,
            channels,
        };
        self.port.post(Event::SongInfo(song_info));
        self.port.post(Event::Position { value: 0.0 });
        true
    }

    fn apply_seek(&mut self, value: f64) {
        if self.state.channel_count == 0 {
            return;
        }
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.song_duration() {
            Some(duration) => {
                let target = (value * duration as f64).floor() as u32;
                self.state.decoder.seek(target);
            }
            None => {
                self.port
                    .post(Event::warn("Cannot seek: song duration is unknown"));
            }
        }
    }

    fn song_duration(&self) -> Option<u32> {
        self.state
            .decoder
            .info()
            .duration(self.state.current_song)
            .filter(|&d| d > 0)
    }

    /// Playback position as a fraction of the song, 0 when the length is unknown
    fn position_fraction(&self) -> f64 {
        match self.song_duration() {
            Some(duration) => {
                (self.state.decoder.position_ms() as f64 / duration as f64).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }
}
