//! Serialized "play named effect" operation

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ducking::DuckingCoordinator;
use crate::events::{ControllerEvent, EventSender};
use crate::media::MediaWaiter;
use crate::obs::{
    get_current_program_scene, get_media_status, get_scene_item_id, set_scene_item_enabled,
    trigger_media_action, ObsError, Requester, MEDIA_ACTION_RESTART, MEDIA_ACTION_STOP,
};

/// Errors surfaced to the command socket
#[derive(Debug, Error)]
pub enum EffectError {
    #[error(transparent)]
    Obs(#[from] ObsError),

    #[error("could not find scene item '{effect}' in scene '{scene}'")]
    NotFound { effect: String, scene: String },
}

/// Timing knobs for playback
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Scene used when the command names none; `None` means the current
    /// program scene
    pub default_scene: Option<String>,
    /// Pause between restart and the wait
    pub settle_delay: Duration,
    /// Added to a known duration before hiding
    pub duration_margin: Duration,
    /// Wait-for-start timeout when the duration is unknown
    pub start_timeout: Duration,
    /// Wait-for-end timeout when the duration is unknown
    pub end_timeout: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_scene: None,
            settle_delay: Duration::from_millis(20),
            duration_margin: Duration::from_millis(100),
            start_timeout: Duration::from_secs(3),
            end_timeout: Duration::from_secs(30),
        }
    }
}

/// Plays effects one at a time
pub struct EffectPlayer {
    obs: Arc<dyn Requester>,
    ducking: Arc<DuckingCoordinator>,
    waiter: MediaWaiter,
    settings: PlaybackSettings,
    lock: Mutex<()>,
    event_tx: EventSender,
}

impl EffectPlayer {
    pub fn new(
        obs: Arc<dyn Requester>,
        ducking: Arc<DuckingCoordinator>,
        waiter: MediaWaiter,
        settings: PlaybackSettings,
        event_tx: EventSender,
    ) -> Self {
        Self {
            obs,
            ducking,
            waiter,
            settings,
            lock: Mutex::new(()),
            event_tx,
        }
    }

    /// Play `effect` in `scene` (or the default scene) and wait until it is
    /// hidden again. Concurrent calls queue behind each other.
    pub async fn play(&self, effect: &str, scene: Option<&str>) -> Result<(), EffectError> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        self.ducking.set_effect_active(true).await;
        let result = self.play_locked(effect, scene).await;
        self.ducking.set_effect_active(false).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(%effect, duration_ms, "effect finished"),
            Err(e) => warn!(%effect, duration_ms, error = %e, "effect failed"),
        }
        let _ = self.event_tx.send(ControllerEvent::EffectFinished {
            effect: effect.to_string(),
            duration_ms,
            success: result.is_ok(),
        });

        result
    }

    async fn play_locked(&self, effect: &str, scene: Option<&str>) -> Result<(), EffectError> {
        let obs = self.obs.as_ref();

        let scene = match scene.or(self.settings.default_scene.as_deref()) {
            Some(scene) => scene.to_string(),
            None => get_current_program_scene(obs).await?,
        };
        info!(%effect, %scene, "playing effect");
        let _ = self.event_tx.send(ControllerEvent::EffectStarted {
            effect: effect.to_string(),
            scene: scene.clone(),
        });

        let not_found = || EffectError::NotFound {
            effect: effect.to_string(),
            scene: scene.clone(),
        };
        let item_id = match get_scene_item_id(obs, &scene, effect).await {
            Ok(Some(id)) => id,
            Ok(None) | Err(ObsError::RequestFailed { .. }) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let duration = self.media_duration(effect).await?;
        debug!(%effect, item_id, ?duration, "resolved effect");

        set_scene_item_enabled(obs, &scene, item_id, true).await?;

        let result = self.restart_and_wait(effect, duration).await;
        match result {
            Ok(()) => {
                set_scene_item_enabled(obs, &scene, item_id, false).await?;
                Ok(())
            }
            Err(e) => {
                if !e.is_connection_lost() {
                    if let Err(hide) = set_scene_item_enabled(obs, &scene, item_id, false).await {
                        debug!(%effect, error = %hide, "hide after failure failed (ignored)");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Known positive duration, or `None`.
    async fn media_duration(&self, effect: &str) -> Result<Option<Duration>, ObsError> {
        match get_media_status(self.obs.as_ref(), effect).await {
            Ok(status) => Ok(status
                .duration_ms
                .filter(|ms| *ms > 0)
                .map(|ms| Duration::from_millis(ms as u64))),
            Err(e) if e.is_connection_lost() => Err(e),
            Err(e) => {
                debug!(%effect, error = %e, "media status unavailable, duration unknown");
                Ok(None)
            }
        }
    }

    async fn restart_and_wait(
        &self,
        effect: &str,
        duration: Option<Duration>,
    ) -> Result<(), ObsError> {
        let obs = self.obs.as_ref();

        if let Err(e) = trigger_media_action(obs, effect, MEDIA_ACTION_STOP).await {
            if e.is_connection_lost() {
                return Err(e);
            }
            debug!(%effect, error = %e, "pre-restart stop failed (ignored)");
        }

        trigger_media_action(obs, effect, MEDIA_ACTION_RESTART).await?;
        tokio::time::sleep(self.settings.settle_delay).await;

        match duration {
            Some(duration) => {
                tokio::time::sleep(duration + self.settings.duration_margin).await;
            }
            None => {
                let (start_timeout, end_timeout) =
                    (self.settings.start_timeout, self.settings.end_timeout);
                let outcome = self
                    .waiter
                    .wait_for_completion(obs, effect, start_timeout, end_timeout)
                    .await?;
                debug!(%effect, ?outcome, "media wait finished");
            }
        }

        Ok(())
    }
}
