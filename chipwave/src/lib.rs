//! chipwave - Library interface
//!
//! Real-time chiptune playback: a render engine running on the audio device
//! callback, a lock-free control protocol between that callback and the
//! application thread, and a control-side [`player::Player`] that owns the
//! output graph.
//!
//! # Architecture
//!
//! ```text
//! Control Thread                                   cpal Thread
//!     │                                                │
//! [Player::load / set_position]                        │
//!     │──────────(mpsc: Command)──────────────────►[RenderEngine::render]
//!     │                                            [Decoder::generate]
//!     │                                            [U8 -> f32, tap, gain]
//!     │◄─────────(ring: Event)─────────────────────[post Position]
//! [Player::dispatch_events]                            │
//!     │                                                │
//! [listeners]                                          │
//! ```
//!
//! The decoder itself is pluggable through [`decoder::ChipDecoder`]; a PCM WAV
//! backend ([`decoder::WavDecoder`]) ships with the crate.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod fetch;
pub mod graph;
pub mod metrics;
pub mod player;
pub mod protocol;

#[cfg(test)]
pub(crate) mod test_utils;

pub use decoder::{ChipDecoder, DecoderError, ModuleInfo, SampleFormat, WavDecoder};
pub use engine::RenderEngine;
pub use graph::{Analyser, AnalyserTap, GraphRenderer, GraphState};
pub use player::{Player, PlayerError};
pub use protocol::{Command, Event, Severity, SongInfo};
