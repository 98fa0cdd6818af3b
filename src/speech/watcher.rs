//! Reconnecting client for the speech status feed

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::ducking::DuckingCoordinator;

/// One line of the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechSignal {
    Start,
    Stop,
}

impl SpeechSignal {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_uppercase().as_str() {
            "START" => Some(Self::Start),
            "STOP" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Follows the feed forever, reconnecting after a fixed backoff
pub struct SpeechFeedWatcher {
    addr: String,
    ducking: Arc<DuckingCoordinator>,
    backoff: Duration,
}

impl SpeechFeedWatcher {
    pub fn new(
        addr: impl Into<String>,
        ducking: Arc<DuckingCoordinator>,
        backoff: Duration,
    ) -> Self {
        Self {
            addr: addr.into(),
            ducking,
            backoff,
        }
    }

    /// Never returns
    pub async fn run(&self) {
        loop {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!(addr = %self.addr, "connected to speech feed");
                    // Picks up a duck an earlier OBS failure left pending
                    self.ducking.reconcile().await;
                    if let Err(e) = self.follow(stream).await {
                        warn!(addr = %self.addr, ?e, "speech feed read error");
                    }
                    info!(addr = %self.addr, "speech feed disconnected");

                    // Nobody is left to send STOP
                    if self.ducking.state().await.speech_active {
                        self.ducking.set_speech_active(false).await;
                    }
                }
                Err(e) => {
                    debug!(addr = %self.addr, error = %e, "speech feed unavailable");
                }
            }

            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn follow(&self, stream: TcpStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match SpeechSignal::parse(line) {
                Some(SpeechSignal::Start) => self.ducking.set_speech_active(true).await,
                Some(SpeechSignal::Stop) => self.ducking.set_speech_active(false).await,
                None => debug!(%line, "ignoring speech feed line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::{json, Value};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;

    use crate::obs::testing::ScriptedObs;

    #[test]
    fn test_parse_signals() {
        assert_eq!(SpeechSignal::parse("START"), Some(SpeechSignal::Start));
        assert_eq!(SpeechSignal::parse(" stop \r\n"), Some(SpeechSignal::Stop));
        assert_eq!(SpeechSignal::parse("Start"), Some(SpeechSignal::Start));
        assert_eq!(SpeechSignal::parse("PAUSE"), None);
    }

    fn ducking() -> (Arc<DuckingCoordinator>, Arc<ScriptedObs>, Arc<AtomicBool>) {
        let muted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&muted);
        let obs = Arc::new(ScriptedObs::new(move |request_type, data| match request_type {
            "GetInputMute" => Ok(json!({"inputMuted": flag.load(Ordering::SeqCst)})),
            "SetInputMute" => {
                flag.store(data["inputMuted"].as_bool().unwrap(), Ordering::SeqCst);
                Ok(Value::Null)
            }
            _ => Ok(Value::Null),
        }));
        let (tx, _) = broadcast::channel(16);
        (Arc::new(DuckingCoordinator::new(obs.clone(), "Music", tx)), obs, muted)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_feed_toggles_speech_ducking() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (duck, obs, muted) = ducking();

        let watcher = SpeechFeedWatcher::new(addr, Arc::clone(&duck), Duration::from_millis(50));
        let task = tokio::spawn(async move { watcher.run().await });

        let (mut feed, _) = listener.accept().await.unwrap();
        feed.write_all(b"hello\nstart\n").await.unwrap();
        wait_until(|| muted.load(Ordering::SeqCst)).await;
        assert!(duck.state().await.speech_active);

        feed.write_all(b"STOP\n").await.unwrap();
        wait_until(|| !muted.load(Ordering::SeqCst)).await;
        assert!(!duck.state().await.muted_by_us);
        assert_eq!(obs.calls_of("SetInputMute").len(), 2);

        task.abort();
    }

    #[tokio::test]
    async fn test_reconnects_and_clears_speech_on_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (duck, _obs, muted) = ducking();

        let watcher = SpeechFeedWatcher::new(addr, Arc::clone(&duck), Duration::from_millis(20));
        let task = tokio::spawn(async move { watcher.run().await });

        let (mut feed, _) = listener.accept().await.unwrap();
        feed.write_all(b"START\n").await.unwrap();
        wait_until(|| muted.load(Ordering::SeqCst)).await;
        drop(feed);

        wait_until(|| !muted.load(Ordering::SeqCst)).await;
        assert!(!duck.state().await.speech_active);

        // comes back after the backoff
        let (mut feed, _) = listener.accept().await.unwrap();
        feed.write_all(b"START\n").await.unwrap();
        wait_until(|| muted.load(Ordering::SeqCst)).await;

        task.abort();
    }
}
