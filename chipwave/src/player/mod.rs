//! Control-side player
//!
//! Owns the output graph and the control end of the render protocol.
//! Every method is non-blocking or async; nothing here waits on the render
//! thread. Render events are pulled with [`Player::dispatch_events`] and
//! fanned out to registered listeners.


use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::decoder::ChipDecoder;
use crate::engine::RenderEngine;
use crate::fetch::{self, TransportError};
use crate::graph::{self, Analyser, AnalyserTap, GraphRenderer, GraphState, OutputError, OutputGraph};
use crate::metrics::{MetricsReporter, RenderMetrics};
use crate::protocol::{self, Command, ControlPort, Event, ProtocolError, Severity, SongInfo};

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

type PositionListener = Box<dyn FnMut(f64)>;
type SongInfoListener = Box<dyn FnMut(&SongInfo)>;
type LogListener = Box<dyn FnMut(Severity, &str)>;
type StateListener = Box<dyn FnMut(GraphState)>;

#[derive(Default)]
struct Listeners {
    position: Vec<PositionListener>,
    song_info: Vec<SongInfoListener>,
    log: Vec<LogListener>,
    state_change: Vec<StateListener>,
}

/// Chiptune player: control surface over a render engine on the audio device
pub struct Player {
    graph: OutputGraph,
    port: ControlPort,
    listeners: Listeners,
    client: reqwest::Client,
    reporter: MetricsReporter,
    /// Dropped-event total at the last warning
    reported_drops: u64,
    config: Config,
}

impl Player {
    /// Open the default output device and start an idle, suspended player
    pub fn open<D: ChipDecoder + Default>(config: &Config) -> Result<Self, PlayerError> {
        let (mut player, renderer) = Self::detached::<D>(config)?;
        let (stream, sample_rate) = graph::open_stream(renderer, config.audio.sample_rate)?;
        player.graph.attach_stream(stream, sample_rate);
        info!("Player ready ({}Hz)", sample_rate);
        Ok(player)
    }

    /// Build a player whose render side is driven by the caller
    ///
    /// The returned [`GraphRenderer`] must be moved to the thread that
    /// produces audio; the player never touches it again.
    pub fn detached<D: ChipDecoder + Default>(
        config: &Config,
    ) -> Result<(Self, GraphRenderer<D>), PlayerError> {
        Self::with_decoders(config, D::default(), D::default())
    }

    /// Like [`Self::detached`] with explicit decoder instances
    pub fn with_decoders<D: ChipDecoder>(
        config: &Config,
        active: D,
        standby: D,
    ) -> Result<(Self, GraphRenderer<D>), PlayerError> {
        let (port, render_port) = protocol::channel(config.audio.event_capacity);
        let metrics = RenderMetrics::new();
        let engine = RenderEngine::new(
            active,
            standby,
            render_port,
            config.engine_settings(),
            metrics.clone(),
        );
        let (graph, renderer) = graph::build(engine, config.graph_settings());
        let client = fetch::client(config.network.timeout_secs)?;

        let player = Self {
            graph,
            port,
            listeners: Listeners::default(),
            client,
            reporter: MetricsReporter::new(metrics),
            reported_drops: 0,
            config: config.clone(),
        };
        Ok((player, renderer))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &std::sync::Arc<RenderMetrics> {
        self.reporter.metrics()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Fetch a module and hand it to the render thread
    ///
    /// Returns once the `Load` command is enqueued. The render thread
    /// confirms with a song info event or reports an error log event.
    ///
    /// Commands are applied inside the output callback, so while the graph
    /// is suspended the load (and its song info event) waits for [`Self::play`].
    pub async fn load(&self, url: &str) -> Result<(), PlayerError> {
        let data =
            fetch::fetch_module(&self.client, url, self.config.network.max_module_bytes).await?;
        self.load_bytes(&fetch::filename_hint(url), data)
    }

    /// Hand an in-memory module to the render thread
    ///
    /// Like [`Self::load`], applied on the next output callback.
    pub fn load_bytes(&self, filename: &str, data: Vec<u8>) -> Result<(), PlayerError> {
        debug!("Loading {} ({} bytes)", filename, data.len());
        self.port.send(Command::Load {
            filename: filename.to_string(),
            data,
        })?;
        Ok(())
    }

    /// [`Self::load`] followed by [`Self::play`]
    pub async fn play_url(&mut self, url: &str) -> Result<(), PlayerError> {
        self.load(url).await?;
        self.play()
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Resume the output clock (whether or not a song is loaded)
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.graph.resume()? {
            self.notify_state();
        }
        Ok(())
    }

    /// Suspend the output clock
    pub fn pause(&mut self) -> Result<(), PlayerError> {
        if self.graph.suspend()? {
            self.notify_state();
        }
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<(), PlayerError> {
        match self.graph.state() {
            GraphState::Running => self.pause(),
            GraphState::Suspended => self.play(),
        }
    }

    pub fn state(&self) -> GraphState {
        self.graph.state()
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    /// Set the volume target (clamped to 0.0 - 1.0)
    pub fn set_volume(&self, value: f32) {
        self.graph.set_gain(value);
    }

    pub fn volume(&self) -> f32 {
        self.graph.gain()
    }

    /// Seek to a fraction of the current song (clamped to 0.0 - 1.0, NaN = 0)
    pub fn set_position(&self, value: f64) -> Result<(), PlayerError> {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        self.port.send(Command::SetPosition { value })?;
        Ok(())
    }

    // =========================================================================
    // Visualizer
    // =========================================================================

    /// Route the pre-gain signal through `tap`, replacing any previous tap
    pub fn connect_visualizer(&self, tap: AnalyserTap) {
        self.graph.connect_tap(tap);
    }

    pub fn disconnect_visualizer(&self) {
        self.graph.disconnect_tap();
    }

    /// Create an analyser sized from the config and connect its tap
    pub fn analyser(&self) -> Analyser {
        let (tap, analyser) = Analyser::new(self.config.visualizer.fft_size);
        self.connect_visualizer(tap);
        analyser
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on_position(&mut self, listener: impl FnMut(f64) + 'static) {
        self.listeners.position.push(Box::new(listener));
    }

    pub fn on_song_info(&mut self, listener: impl FnMut(&SongInfo) + 'static) {
        self.listeners.song_info.push(Box::new(listener));
    }

    pub fn on_log(&mut self, listener: impl FnMut(Severity, &str) + 'static) {
        self.listeners.log.push(Box::new(listener));
    }

    pub fn on_state_change(&mut self, listener: impl FnMut(GraphState) + 'static) {
        self.listeners.state_change.push(Box::new(listener));
    }

    fn notify_state(&mut self) {
        let state = self.graph.state();
        for listener in &mut self.listeners.state_change {
            listener(state);
        }
    }

    /// Drain pending render events into the listeners
    ///
    /// Call this periodically from the control thread. Returns the number of
    /// events dispatched.
    pub fn dispatch_events(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.port.try_recv() {
            count += 1;
            match event {
                Event::SongInfo(song) => {
                    info!(
                        "Playing \"{}\" ({} songs, {} channels)",
                        song.name(),
                        song.songs,
                        song.channels
                    );
                    for listener in &mut self.listeners.song_info {
                        listener(&song);
                    }
                }
                Event::Position { value } => {
                    for listener in &mut self.listeners.position {
                        listener(value);
                    }
                }
                Event::Log { severity, message } => {
                    match severity {
                        Severity::Info => info!("{}", message),
                        Severity::Warn => warn!("{}", message),
                        Severity::Error => error!("{}", message),
                    }
                    for listener in &mut self.listeners.log {
                        listener(severity, &message);
                    }
                }
            }
        }

        let dropped = self.port.dropped_events();
        if dropped > self.reported_drops {
            warn!(
                "Render thread dropped {} events (event ring full)",
                dropped - self.reported_drops
            );
            self.reported_drops = dropped;
        }
        self.reporter.maybe_log(dropped);
        count
    }
}
