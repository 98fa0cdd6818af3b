//! Media playback tracking
//!
//! Polls OBS for a media input's state until it has started and then
//! stopped again.

mod waiter;

pub use waiter::MediaWaiter;
