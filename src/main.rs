//! memen-daemon: plays OBS effects on command and ducks music under speech
//!
//! This daemon runs alongside OBS and provides:
//! - A single authenticated OBS websocket session shared by every caller
//! - A line-based command socket for playing effects and updating the
//!   track overlay
//! - Music ducking driven by effect playback and an external speech
//!   status feed
//!
//! Out of scope:
//! - Audio graph setup (virtual sinks, loopbacks)
//! - The speech engine itself

mod config;
mod ducking;
mod effects;
mod events;
mod ipc;
mod lifecycle;
mod media;
mod obs;
mod speech;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ducking::DuckingCoordinator;
use crate::effects::EffectPlayer;
use crate::events::ControllerEvent;
use crate::ipc::{CommandHandler, Server};
use crate::lifecycle::ShutdownSignal;
use crate::media::MediaWaiter;
use crate::obs::{ObsClient, Requester};
use crate::speech::SpeechFeedWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "memen-daemon starting"
    );

    let config = Config::load()?;
    info!(?config, "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    // Components -> event logger
    let (event_tx, mut event_rx) = broadcast::channel::<ControllerEvent>(64);

    let obs_client = Arc::new(ObsClient::new(config.obs.clone()));
    let obs: Arc<dyn Requester> = obs_client.clone();

    // Connect eagerly so a bad password shows up at startup; requests
    // reconnect on their own later.
    if let Err(e) = obs_client.connect().await {
        warn!(error = %e, "initial OBS connection failed, will retry on first command");
    }

    let ducking = Arc::new(DuckingCoordinator::new(
        Arc::clone(&obs),
        config.music_input.clone(),
        event_tx.clone(),
    ));

    let player = Arc::new(EffectPlayer::new(
        Arc::clone(&obs),
        Arc::clone(&ducking),
        MediaWaiter::default(),
        config.playback.clone(),
        event_tx.clone(),
    ));

    let handler = Arc::new(CommandHandler::new(
        player,
        Arc::clone(&obs),
        config.track_input.clone(),
    ));
    let server = Server::bind(&config.listen_addr, handler).await?;

    let watcher = SpeechFeedWatcher::new(
        config.speech_feed_addr.clone(),
        Arc::clone(&ducking),
        config.feed_backoff,
    );

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Accept command clients
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "command server error");
            }
        }

        // Follow the speech feed (never returns)
        _ = watcher.run() => {}

        // Log controller events
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, json = %event.to_json(), "controller event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown();
    ducking.release_all().await;
    obs_client.close().await;

    info!("memen-daemon stopped");

    Ok(())
}
