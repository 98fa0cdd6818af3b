//! Save/restore mute coordination across overlapping activations

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::events::{ControllerEvent, EventSender};
use crate::obs::{get_input_mute, set_input_mute, Requester};

/// Ducking bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuckState {
    pub effect_active: bool,
    pub speech_active: bool,
    /// We currently own the mute
    pub muted_by_us: bool,
    /// Mute state observed before we took over; set iff `muted_by_us`
    pub prior_user_mute: Option<bool>,
}

impl DuckState {
    pub fn any_active(&self) -> bool {
        self.effect_active || self.speech_active
    }
}

/// Owns the background input's mute while anything is active.
///
/// Every flag change goes through [`DuckingCoordinator::reconcile`] under a
/// single lock, so reconciliations never interleave. Failures are logged and
/// never returned; ducking is best-effort.
pub struct DuckingCoordinator {
    obs: Arc<dyn Requester>,
    input_name: String,
    state: Mutex<DuckState>,
    event_tx: EventSender,
}

impl DuckingCoordinator {
    pub fn new(
        obs: Arc<dyn Requester>,
        input_name: impl Into<String>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            obs,
            input_name: input_name.into(),
            state: Mutex::new(DuckState::default()),
            event_tx,
        }
    }

    /// Current bookkeeping snapshot
    pub async fn state(&self) -> DuckState {
        *self.state.lock().await
    }

    pub async fn set_effect_active(&self, active: bool) {
        let mut state = self.state.lock().await;
        if state.effect_active != active {
            debug!(active, "effect activity changed");
        }
        state.effect_active = active;
        self.reconcile_locked(&mut state).await;
    }

    pub async fn set_speech_active(&self, active: bool) {
        let mut state = self.state.lock().await;
        if state.speech_active != active {
            info!(active, "speech activity changed");
            let _ = self.event_tx.send(if active {
                ControllerEvent::SpeechStarted
            } else {
                ControllerEvent::SpeechStopped
            });
        }
        state.speech_active = active;
        self.reconcile_locked(&mut state).await;
    }

    /// Clear both flags and hand the channel back.
    pub async fn release_all(&self) {
        let mut state = self.state.lock().await;
        state.effect_active = false;
        state.speech_active = false;
        self.reconcile_locked(&mut state).await;
    }

    /// Bring the channel's mute in line with the current flags.
    pub async fn reconcile(&self) {
        let mut state = self.state.lock().await;
        self.reconcile_locked(&mut state).await;
    }

    async fn reconcile_locked(&self, state: &mut DuckState) {
        if !state.any_active() {
            if state.muted_by_us {
                self.restore(state).await;
            }
            return;
        }

        if state.muted_by_us {
            return;
        }

        let obs = self.obs.as_ref();
        let input = self.input_name.as_str();

        let current = match get_input_mute(obs, input, "duckGetMute").await {
            Ok(Some(muted)) => muted,
            Ok(None) => {
                warn!(%input, "OBS did not report a mute state, not ducking");
                return;
            }
            Err(e) => {
                warn!(%input, error = %e, "failed to query mute state, not ducking");
                return;
            }
        };

        // Ownership is taken even when the user had already muted, so the
        // restore always runs. It is recorded before the mute goes out: if
        // this task is dropped mid-request, release still finds it.
        state.prior_user_mute = Some(current);
        state.muted_by_us = true;

        if !current {
            if let Err(e) = set_input_mute(obs, input, true, "duckMute").await {
                warn!(%input, error = %e, "failed to mute background input");
                state.muted_by_us = false;
                state.prior_user_mute = None;
                return;
            }
        }

        info!(input = %self.input_name, prior_muted = current, "ducking engaged");
        let _ = self.event_tx.send(ControllerEvent::DuckEngaged { prior_muted: current });
    }

    async fn restore(&self, state: &mut DuckState) {
        let prior = state.prior_user_mute.unwrap_or(false);

        let input = self.input_name.as_str();

        let restored = match set_input_mute(self.obs.as_ref(), input, prior, "duckRestore").await {
            Ok(()) => true,
            Err(e) => {
                warn!(%input, error = %e, "failed to restore mute state, giving up");
                false
            }
        };

        state.muted_by_us = false;
        state.prior_user_mute = None;
        info!(input = %self.input_name, muted = prior, restored, "ducking released");
        let _ = self.event_tx.send(ControllerEvent::DuckReleased {
            restored_muted: prior,
            restored,
        });
    }
}
