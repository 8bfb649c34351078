//! Device-originated event payloads
//!
//! These mirror the callback shapes of the external playback SDK. Every
//! field of a state payload is optional: the SDK occasionally delivers
//! partial objects, and missing fields must degrade to defaults instead of
//! poisoning local state.

use serde::Deserialize;

use crate::error::Result;
use crate::session::Track;

/// One event from the remote playback device, forwarded verbatim to the
/// session store.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    /// Device handshake completed; `device_id` addresses every subsequent
    /// remote playback command.
    Ready { device_id: String },
    /// Device went offline.
    NotReady { device_id: String },
    /// Transport state report. The SDK sends `null` when it has nothing
    /// to say, hence the inner `Option`.
    StateChanged(Option<RawPlayerState>),
}

/// Raw `player_state_changed` payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlayerState {
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub track_window: Option<RawTrackWindow>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawTrackWindow {
    #[serde(default)]
    pub current_track: Option<Track>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl RawPlayerState {
    /// Parse a state payload as delivered by the SDK callback.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
