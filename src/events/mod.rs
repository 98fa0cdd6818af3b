//! Controller events
//!
//! Published on a broadcast channel whenever an effect starts or finishes,
//! ducking engages or releases, or the speech feed toggles.

use serde::Serialize;
use tokio::sync::broadcast;

/// Sender half shared by every component that publishes events
pub type EventSender = broadcast::Sender<ControllerEvent>;

/// Events emitted by the controller
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// An effect acquired the playback lock
    EffectStarted { effect: String, scene: String },

    /// An effect finished, successfully or not
    EffectFinished {
        effect: String,
        /// Time spent holding the playback lock
        duration_ms: u64,
        success: bool,
    },

    /// Background channel muted on our behalf
    DuckEngaged {
        /// Mute state the channel had before we took over
        prior_muted: bool,
    },

    /// Background channel handed back
    DuckReleased {
        /// State we tried to restore
        restored_muted: bool,
        /// Whether OBS accepted the restore
        restored: bool,
    },

    /// Speech feed reported START
    SpeechStarted,

    /// Speech feed reported STOP (or went away)
    SpeechStopped,
}

impl ControllerEvent {
    /// Single-line JSON for structured log fields
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::EffectStarted { effect, scene } => {
                write!(f, "EFFECT_STARTED {}@{}", effect, scene)
            }
            ControllerEvent::EffectFinished { effect, duration_ms, success } => {
                let outcome = if *success { "ok" } else { "failed" };
                write!(f, "EFFECT_FINISHED {} ({}ms, {})", effect, duration_ms, outcome)
            }
            ControllerEvent::DuckEngaged { prior_muted } => {
                write!(f, "DUCK_ENGAGED (prior_muted={})", prior_muted)
            }
            ControllerEvent::DuckReleased { restored_muted, restored } => {
                write!(f, "DUCK_RELEASED (muted={}, restored={})", restored_muted, restored)
            }
            ControllerEvent::SpeechStarted => write!(f, "SPEECH_STARTED"),
            ControllerEvent::SpeechStopped => write!(f, "SPEECH_STOPPED"),
        }
    }
}
