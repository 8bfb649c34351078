//! Playback session state
//!
//! The queue holds locally-authoritative navigation intent; the playback
//! state holds device-authoritative transport facts. `SessionStore` is the
//! single merge point between the two.

mod queue;
mod store;

pub use queue::{Queue, Track};
pub use store::{PlaybackState, SessionStore};
