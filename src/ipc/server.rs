//! TCP command server
//!
//! Each client gets its own task; commands on one connection run in order,
//! while different clients are served concurrently.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::effects::EffectPlayer;
use crate::obs::{set_input_text, Requester};

use super::protocol::{Command, Reply};

/// Longest command line accepted, newline included
const MAX_LINE: usize = 64 * 1024;

/// Executes parsed commands
pub struct CommandHandler {
    player: Arc<EffectPlayer>,
    obs: Arc<dyn Requester>,
    track_input: String,
}

impl CommandHandler {
    pub fn new(
        player: Arc<EffectPlayer>,
        obs: Arc<dyn Requester>,
        track_input: impl Into<String>,
    ) -> Self {
        Self {
            player,
            obs,
            track_input: track_input.into(),
        }
    }

    /// Run one command. `None` means no reply is due (connection closing).
    pub async fn handle(&self, command: Command) -> Option<Reply> {
        let result = match command {
            Command::Quit => return None,
            Command::TrackClear => set_input_text(self.obs.as_ref(), &self.track_input, "")
                .await
                .map_err(|e| e.to_string()),
            Command::Track(text) => {
                info!(%text, "updating track overlay");
                set_input_text(self.obs.as_ref(), &self.track_input, &text)
                    .await
                    .map_err(|e| e.to_string())
            }
            Command::Play { effect, scene } => self
                .player
                .play(&effect, scene.as_deref())
                .await
                .map_err(|e| e.to_string()),
        };

        Some(match result {
            Ok(()) => Reply::Ok,
            Err(message) => Reply::Error(message),
        })
    }
}

/// Command socket server
pub struct Server {
    listener: TcpListener,
    handler: Arc<CommandHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the listening socket
    pub async fn bind(addr: &str, handler: Arc<CommandHandler>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind command socket on {addr}"))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(addr = %listener.local_addr()?, "command server listening");

        Ok(Self {
            listener,
            handler,
            shutdown_tx,
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the task is dropped
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    let handler = Arc::clone(&self.handler);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, handler) => {
                                if let Err(e) = result {
                                    debug!(%peer, ?e, "client session ended");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!(%peer, "client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Serve one client until it quits or hangs up
    async fn handle_client(stream: TcpStream, handler: Arc<CommandHandler>) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = (&mut reader).take(MAX_LINE as u64).read_until(b'\n', &mut buf).await?;
            if n == 0 {
                debug!("client disconnected");
                return Ok(());
            }
            if n == MAX_LINE && buf.last() != Some(&b'\n') {
                warn!(max = MAX_LINE, "command line too long, dropping client");
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let Some(command) = Command::parse(&line) else {
                continue;
            };
            debug!(?command, "received command");

            let Some(reply) = handler.handle(command).await else {
                debug!("client quit");
                return Ok(());
            };

            let reply = format!("{reply}\n");
            if let Err(e) = write_half.write_all(reply.as_bytes()).await {
                warn!(?e, "failed to write reply, dropping client");
                return Ok(());
            }
        }
    }

    /// Stop all client tasks
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("command server shutdown complete");
    }
}
