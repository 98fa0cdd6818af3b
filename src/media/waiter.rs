//! Two-phase wait for a media input to finish playing
//!
//! Phase `WaitingForStart` ends when OBS first reports an active state.
//! Phase `Playing` restarts the clock and ends when the state leaves the
//! active set or the cursor reaches the end of the clip. Either phase gives
//! up quietly on its own timeout.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::obs::{get_media_status, ObsError, Requester};

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A cursor this close to the duration counts as the end of the clip
const END_CURSOR_SLACK_MS: i64 = 50;

/// States that count as "still playing". OBS has used both prefixes.
const ACTIVE_STATES: &[&str] = &[
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_OPENING",
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_BUFFERING",
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_PLAYING",
    "OBS_MEDIA_STATE_OPENING",
    "OBS_MEDIA_STATE_BUFFERING",
    "OBS_MEDIA_STATE_PLAYING",
];

pub fn is_active_state(state: Option<&str>) -> bool {
    state.is_some_and(|s| ACTIVE_STATES.contains(&s))
}

/// OBS can keep reporting PLAYING on the last frame; the cursor says otherwise.
fn cursor_at_end(cursor_ms: Option<i64>, duration_ms: Option<i64>) -> bool {
    match (cursor_ms, duration_ms) {
        (Some(cursor), Some(duration)) if duration > 0 => {
            cursor >= duration - END_CURSOR_SLACK_MS
        }
        _ => false,
    }
}

/// How a wait ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Media played and then stopped
    Finished,
    /// Never reported an active state before the start timeout
    NeverStarted,
    /// Still active when the end timeout expired
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingForStart,
    Playing,
}

/// Polls `GetMediaInputStatus` on a fixed interval
#[derive(Debug, Clone)]
pub struct MediaWaiter {
    poll_interval: Duration,
}

impl Default for MediaWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl MediaWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait for `input_name` to start and then finish playing.
    ///
    /// Only a failing status request is an error; timeouts are reported
    /// through [`WaitOutcome`].
    pub async fn wait_for_completion(
        &self,
        obs: &dyn Requester,
        input_name: &str,
        start_timeout: Duration,
        end_timeout: Duration,
    ) -> Result<WaitOutcome, ObsError> {
        let mut phase = Phase::WaitingForStart;
        let mut phase_started = Instant::now();
        let mut last_state: Option<String> = None;

        loop {
            let status = get_media_status(obs, input_name).await?;
            if status.state != last_state {
                debug!(
                    input = %input_name,
                    state = ?status.state,
                    cursor_ms = ?status.cursor_ms,
                    duration_ms = ?status.duration_ms,
                    "media state changed"
                );
                last_state = status.state.clone();
            }

            let active = is_active_state(status.state.as_deref());
            let at_end = cursor_at_end(status.cursor_ms, status.duration_ms);
            let elapsed = phase_started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;

            match phase {
                Phase::WaitingForStart if active => {
                    debug!(input = %input_name, waited_ms = elapsed_ms, "media started");
                    phase = Phase::Playing;
                    phase_started = Instant::now();
                }
                Phase::WaitingForStart if elapsed >= start_timeout => {
                    info!(input = %input_name, "media never started, nothing to wait for");
                    return Ok(WaitOutcome::NeverStarted);
                }
                Phase::WaitingForStart => {}
                Phase::Playing if !active || at_end => {
                    debug!(input = %input_name, played_ms = elapsed_ms, at_end, "media finished");
                    return Ok(WaitOutcome::Finished);
                }
                Phase::Playing if elapsed >= end_timeout => {
                    warn!(input = %input_name, "media still playing after end timeout, moving on");
                    return Ok(WaitOutcome::Stuck);
                }
                Phase::Playing => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
