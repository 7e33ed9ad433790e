//! Control protocol between the control thread and the render thread
//!
//! Two closed message sets cross the thread boundary:
//! - [`Command`] (control -> render): unbounded std `mpsc` channel, polled
//!   with `try_recv` by the render callback.
//! - [`Event`] (render -> control): pre-allocated SPSC ring buffer. Posting
//!   never blocks or allocates; a full ring drops the event and counts it.
//!
//! Messages are standalone notifications. There is no request/response
//! correlation and no ordering between the two directions.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;

/// Default event ring capacity (~2.5s of position updates at 512-frame blocks)
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Message sent from the control thread to the render thread
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the current module
    Load {
        /// Format hint (usually the last path segment of the source)
        filename: String,
        /// Raw module bytes
        data: Vec<u8>,
    },
    /// Seek within the current song (fraction 0..1 of its duration)
    SetPosition { value: f64 },
}

/// Log severity carried by [`Event::Log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Metadata of the song selected by a successful load
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SongInfo {
    pub author: String,
    pub title: String,
    pub date: String,
    /// Song length in milliseconds, `None` when indeterminate
    pub duration_ms: Option<u32>,
    /// Number of songs in the module
    pub songs: usize,
    /// Index of the song being played
    pub song: usize,
    /// 1 for mono, 2 for stereo
    pub channels: u8,
}

impl SongInfo {
    /// Display name in the form `"Author - Title"`
    pub fn name(&self) -> String {
        format!("{} - {}", self.author, self.title)
    }
}

/// Message sent from the render thread to the control thread
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SongInfo(SongInfo),
    Position { value: f64 },
    Log {
        severity: Severity,
        message: Cow<'static, str>,
    },
}

impl Event {
    pub fn info(message: impl Into<Cow<'static, str>>) -> Self {
        Event::Log {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<Cow<'static, str>>) -> Self {
        Event::Log {
            severity: Severity::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<Cow<'static, str>>) -> Self {
        Event::Log {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("render side disconnected")]
    Disconnected,
}

/// Create a connected pair of protocol endpoints
///
/// `event_capacity` bounds the render -> control ring (minimum 1).
pub fn channel(event_capacity: usize) -> (ControlPort, RenderPort) {
    let (commands_tx, commands_rx) = mpsc::channel();
    let ring = HeapRb::<Event>::new(event_capacity.max(1));
    let (events_tx, events_rx) = ring.split();
    let dropped = Arc::new(AtomicU64::new(0));

    (
        ControlPort {
            commands: commands_tx,
            events: events_rx,
            dropped: dropped.clone(),
        },
        RenderPort {
            commands: commands_rx,
            events: events_tx,
            dropped,
        },
    )
}

/// Control-thread endpoint: sends commands, drains events
pub struct ControlPort {
    commands: Sender<Command>,
    events: HeapCons<Event>,
    dropped: Arc<AtomicU64>,
}

impl ControlPort {
    /// Enqueue a command. Never blocks.
    pub fn send(&self, command: Command) -> Result<(), ProtocolError> {
        self.commands
            .send(command)
            .map_err(|_| ProtocolError::Disconnected)
    }

    /// Pop the oldest pending event, if any
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_pop()
    }

    /// Number of events waiting to be drained
    pub fn pending(&self) -> usize {
        self.events.occupied_len()
    }

    /// Total events dropped because the ring was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Render-thread endpoint: polls commands, posts events
pub struct RenderPort {
    commands: Receiver<Command>,
    events: HeapProd<Event>,
    dropped: Arc<AtomicU64>,
}

impl RenderPort {
    /// Poll the next command without blocking
    ///
    /// A disconnected control side reads as "no command": the render thread
    /// keeps producing audio until the output stream is dropped.
    pub fn try_recv(&mut self) -> Option<Command> {
        match self.commands.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Post an event. Returns false (and counts a drop) if the ring is full.
    pub fn post(&mut self, event: Event) -> bool {
        match self.events.try_push(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_send_order() {
        let (control, mut render) = channel(8);
        control
            .send(Command::Load {
                filename: "a.wav".into(),
                data: vec![1, 2, 3],
            })
            .unwrap();
        control.send(Command::SetPosition { value: 0.25 }).unwrap();
        control.send(Command::SetPosition { value: 0.75 }).unwrap();

        assert!(matches!(render.try_recv(), Some(Command::Load { .. })));
        assert_eq!(
            render.try_recv(),
            Some(Command::SetPosition { value: 0.25 })
        );
        assert_eq!(
            render.try_recv(),
            Some(Command::SetPosition { value: 0.75 })
        );
        assert_eq!(render.try_recv(), None);
    }

    #[test]
    fn test_events_arrive_in_post_order() {
        let (mut control, mut render) = channel(8);
        assert!(render.post(Event::SongInfo(SongInfo::default())));
        assert!(render.post(Event::Position { value: 0.0 }));

        assert_eq!(control.pending(), 2);
        assert!(matches!(control.try_recv(), Some(Event::SongInfo(_))));
        assert_eq!(control.try_recv(), Some(Event::Position { value: 0.0 }));
        assert_eq!(control.try_recv(), None);
    }

    #[test]
    fn test_full_event_ring_drops_and_counts() {
        let (mut control, mut render) = channel(2);
        assert!(render.post(Event::Position { value: 0.1 }));
        assert!(render.post(Event::Position { value: 0.2 }));
        assert!(!render.post(Event::Position { value: 0.3 }));
        assert!(!render.post(Event::info("lost")));

        assert_eq!(control.dropped_events(), 2);
        // Oldest events survive
        assert_eq!(control.try_recv(), Some(Event::Position { value: 0.1 }));
        assert_eq!(control.try_recv(), Some(Event::Position { value: 0.2 }));
    }

    #[test]
    fn test_send_after_render_drop_is_disconnected() {
        let (control, render) = channel(4);
        drop(render);
        assert_eq!(
            control.send(Command::SetPosition { value: 0.5 }),
            Err(ProtocolError::Disconnected)
        );
    }

    #[test]
    fn test_render_poll_survives_control_drop() {
        let (control, mut render) = channel(4);
        drop(control);
        assert_eq!(render.try_recv(), None);
        // Posting into a ring with no reader still does not block
        assert!(render.post(Event::Position { value: 0.0 }));
    }

    #[test]
    fn test_song_info_name() {
        let info = SongInfo {
            author: "Jakub Husak".into(),
            title: "Asma Theme".into(),
            ..SongInfo::default()
        };
        assert_eq!(info.name(), "Jakub Husak - Asma Theme");
    }

    #[test]
    fn test_log_constructors() {
        assert_eq!(
            Event::error("boom"),
            Event::Log {
                severity: Severity::Error,
                message: Cow::Borrowed("boom"),
            }
        );
        assert!(matches!(
            Event::warn(String::from("w")),
            Event::Log {
                severity: Severity::Warn,
                ..
            }
        ));
    }
}
