//! Effect playback
//!
//! Plays one named media source at a time: show it, restart it, wait for it
//! to finish, hide it. Ducking brackets the whole sequence.

mod player;

pub use player::{EffectError, EffectPlayer, PlaybackSettings};
