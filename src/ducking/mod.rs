//! Audio ducking for the background music input
//!
//! Two independent activity flags (effect playback and speech) share one
//! mute. The music is muted while either flag is set and handed back in the
//! state we found it once both clear.

mod coordinator;

pub use coordinator::DuckingCoordinator;
