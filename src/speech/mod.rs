//! Speech status feed
//!
//! The text-to-speech engine publishes `START`/`STOP` lines on a TCP port
//! while it talks. The watcher turns them into ducking flag updates.

mod watcher;

pub use watcher::SpeechFeedWatcher;
