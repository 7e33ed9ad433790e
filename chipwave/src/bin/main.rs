//! chipwave - command line player
//!
//! Plays one module on the default output device until the song ends.
//!
//! # Usage
//!
//! ```bash
//! chipwave path/to/song.wav
//! chipwave https://example.org/music/song.wav --volume 0.5
//! chipwave song.wav --start 0.25 --seconds 30
//! chipwave song.wav --scope
//! ```

use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use chipwave::config;
use chipwave::{GraphState, Player, Severity, SongInfo, WavDecoder};

#[derive(Parser)]
#[command(name = "chipwave")]
#[command(author, version, about = "Real-time chiptune module player")]
struct Args {
    /// Module file path, file:// URL or http(s):// URL
    source: String,

    /// Volume (0.0-1.0, default from config)
    #[arg(long, short = 'v')]
    volume: Option<f32>,

    /// Start position as a fraction of the song (0.0-1.0)
    #[arg(long, short = 's')]
    start: Option<f64>,

    /// Stop after this many seconds
    #[arg(long, short = 'n')]
    seconds: Option<u64>,

    /// Config file (default: platform config directory)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Print a peak meter while playing
    #[arg(long)]
    scope: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    let mut player =
        Player::open::<WavDecoder>(&config).context("Failed to open audio output")?;
    if let Some(volume) = args.volume {
        player.set_volume(volume);
    }

    let finished = Rc::new(Cell::new(false));
    let ended = finished.clone();
    player.on_position(move |value| {
        if value >= 1.0 {
            ended.set(true);
        }
    });
    player.on_song_info(|song: &SongInfo| {
        let duration = song
            .duration_ms
            .map(|ms| format!("{}:{:02}", ms / 60_000, ms / 1000 % 60))
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            "{} [{}] song {}/{}, {}",
            song.name(),
            song.date,
            song.song + 1,
            song.songs,
            duration
        );
    });
    let failed = finished.clone();
    player.on_log(move |severity, _message: &str| {
        // A rejected module leaves nothing to play
        if severity == Severity::Error {
            failed.set(true);
        }
    });
    player.on_state_change(|state: GraphState| info!("Output {:?}", state));

    player
        .play_url(&args.source)
        .await
        .with_context(|| format!("Failed to load {}", args.source))?;
    if let Some(start) = args.start {
        player.set_position(start)?;
    }

    let mut analyser = args.scope.then(|| player.analyser());
    let deadline = args.seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }

        player.dispatch_events();
        if finished.get() {
            break;
        }
        // The decoder came up short: end of data or silence detection stopped
        // it. Covers songs whose position never reaches 1.0.
        if player.metrics().snapshot().short_blocks > 0 {
            info!("Song finished");
            break;
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            info!("Time limit reached");
            break;
        }
        if let Some(analyser) = analyser.as_mut() {
            let width = (analyser.peak() * 40.0).round() as usize;
            print!("\r[{:<40}]", "#".repeat(width.min(40)));
            std::io::stdout().flush()?;
        }
    }

    if analyser.is_some() {
        println!();
    }
    player.pause()?;
    Ok(())
}
