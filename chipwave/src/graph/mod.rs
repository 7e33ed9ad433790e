//! Audio output graph
//!
//! ```text
//! RenderEngine ──► [AnalyserTap] ──► GainStage ──► device channels
//! ```
//!
//! [`GraphRenderer`] is the render-side half, moved into the cpal callback.
//! [`OutputGraph`] is the control-side half: running/suspended state, gain
//! target and tap routing. The two halves share only atomics and a
//! `try_recv`-polled route channel.

mod analyser;
mod gain;
mod output;


pub use analyser::{Analyser, AnalyserTap, MAX_FFT_SIZE, MIN_FFT_SIZE};
pub use gain::{GainControl, GainStage};
pub use output::{OutputError, open_stream};

use std::sync::mpsc::{self, Receiver, Sender};

use cpal::traits::StreamTrait;
use cpal::{FromSample, SizedSample};
use tracing::debug;

use crate::decoder::{ChipDecoder, SAMPLE_RATE};
use crate::engine::RenderEngine;

/// Running state of the output clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Running,
    Suspended,
}

/// Graph parameters fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphSettings {
    /// Initial gain (0.0 - 1.0)
    pub gain: f32,
    /// Gain ramp length in frames (0 = immediate)
    pub ramp_frames: usize,
    /// Planar scratch size; larger device callbacks are processed in chunks
    pub max_block_frames: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            gain: 1.0,
            ramp_frames: 441,
            max_block_frames: crate::engine::DEFAULT_MAX_BLOCK_FRAMES,
        }
    }
}

/// Build both halves of the graph around an engine
pub fn build<D: ChipDecoder>(
    engine: RenderEngine<D>,
    settings: GraphSettings,
) -> (OutputGraph, GraphRenderer<D>) {
    let gain = GainControl::new(settings.gain);
    let (routes_tx, routes_rx) = mpsc::channel();
    let frames = settings.max_block_frames.max(1);

    let renderer = GraphRenderer {
        engine,
        gain: gain.stage(settings.ramp_frames),
        tap: None,
        routes: routes_rx,
        left: vec![0.0; frames],
        right: vec![0.0; frames],
    };
    let graph = OutputGraph {
        stream: None,
        state: GraphState::Suspended,
        gain,
        routes: routes_tx,
        sample_rate: SAMPLE_RATE,
    };
    (graph, renderer)
}

// =============================================================================
// Render side
// =============================================================================

/// Render-side graph: engine, analysis tap and gain stage
pub struct GraphRenderer<D: ChipDecoder> {
    engine: RenderEngine<D>,
    gain: GainStage,
    tap: Option<AnalyserTap>,
    /// Tap (re)connections from the control side
    routes: Receiver<Option<AnalyserTap>>,
    /// Pre-allocated planar scratch buffers
    left: Vec<f32>,
    right: Vec<f32>,
}

impl<D: ChipDecoder> GraphRenderer<D> {
    pub fn engine(&self) -> &RenderEngine<D> {
        &self.engine
    }

    /// Gain applied to the most recent frame
    pub fn current_gain(&self) -> f32 {
        self.gain.current()
    }

    pub fn has_tap(&self) -> bool {
        self.tap.is_some()
    }

    /// Fill an interleaved device buffer with `channels` channels
    ///
    /// Mono devices get the average of left and right; channels beyond the
    /// second are silent.
    pub fn process<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        while let Ok(route) = self.routes.try_recv() {
            self.tap = route;
        }
        if channels == 0 {
            return;
        }

        let chunk = self.left.len() * channels;
        for out in data.chunks_mut(chunk) {
            let frames = out.len() / channels;
            let left = &mut self.left[..frames];
            let right = &mut self.right[..frames];

            self.engine.render(left, right);
            if let Some(tap) = self.tap.as_mut() {
                tap.push(left, right);
            }
            self.gain.apply(left, right);

            for (frame, (&l, &r)) in out
                .chunks_exact_mut(channels)
                .zip(left.iter().zip(right.iter()))
            {
                if channels == 1 {
                    frame[0] = T::from_sample((l + r) * 0.5);
                } else {
                    frame[0] = T::from_sample(l);
                    frame[1] = T::from_sample(r);
                    frame[2..].fill(T::EQUILIBRIUM);
                }
            }
            out[frames * channels..].fill(T::EQUILIBRIUM);
        }
    }
}

// =============================================================================
// Control side
// =============================================================================

/// Control-side graph: output clock, gain target and tap routing
pub struct OutputGraph {
    /// The cpal stream, `None` when the renderer is driven by the host
    stream: Option<cpal::Stream>,
    state: GraphState,
    gain: GainControl,
    routes: Sender<Option<AnalyserTap>>,
    sample_rate: u32,
}

impl OutputGraph {
    /// Hand the running device stream to the graph
    pub fn attach_stream(&mut self, stream: cpal::Stream, sample_rate: u32) {
        self.stream = Some(stream);
        self.sample_rate = sample_rate;
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start the output clock. Returns true if the state changed.
    pub fn resume(&mut self) -> Result<bool, OutputError> {
        if self.state == GraphState::Running {
            return Ok(false);
        }
        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        self.state = GraphState::Running;
        debug!("Output graph running");
        Ok(true)
    }

    /// Stop the output clock. Returns true if the state changed.
    pub fn suspend(&mut self) -> Result<bool, OutputError> {
        if self.state == GraphState::Suspended {
            return Ok(false);
        }
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        self.state = GraphState::Suspended;
        debug!("Output graph suspended");
        Ok(true)
    }

    pub fn set_gain(&self, value: f32) {
        self.gain.set(value);
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    /// Route the signal through `tap`, replacing any previous tap
    pub fn connect_tap(&self, tap: AnalyserTap) {
        // The renderer lives as long as the stream; a send error means it is gone.
        let _ = self.routes.send(Some(tap));
    }

    pub fn disconnect_tap(&self) {
        let _ = self.routes.send(None);
    }
}
