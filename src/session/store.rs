//! Session store merging local intent with device-reported state

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::device::DeviceEvent;
use crate::error::PlayerError;

use super::queue::{Queue, Track};

/// Transport state as last reported by an authoritative source. The device
/// `player_state_changed` event always wins once received; local writes are
/// optimistic placeholders until then.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume_percent: u8,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
            volume_percent: 50,
        }
    }
}

/// Shared handle over the session's queue, transport state and device id.
///
/// Two observable surfaces are deliberately kept distinct: the queue cursor
/// is locally authoritative for navigation intent, while
/// `PlaybackState.current_track` is device-authoritative for what is
/// actually playing. UI code showing track art or elapsed time reads the
/// playback state, not the cursor.
#[derive(Clone, Default)]
pub struct SessionStore {
    queue: Arc<Mutex<Queue>>,
    playback: Arc<Mutex<PlaybackState>>,
    device_id: Arc<Mutex<Option<String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue atomically and optimistically point the playback
    /// state at the new current track.
    pub async fn set_queue(&self, tracks: Vec<Track>, start_index: usize, context: &str) {
        let current = self.queue.lock().await.replace(tracks, start_index, context);

        tracing::debug!(
            start_index,
            context,
            track = current.as_ref().map(|t| t.name.as_str()).unwrap_or("none"),
            "Queue replaced"
        );

        let mut playback = self.playback.lock().await;
        playback.current_track = current;
    }

    /// Optimistically advance the cursor. The device's next state event
    /// remains the authority on what actually plays.
    pub async fn next_track(&self) -> Option<Track> {
        let track = self.queue.lock().await.next()?;
        self.playback.lock().await.current_track = Some(track.clone());
        Some(track)
    }

    pub async fn previous_track(&self) -> Option<Track> {
        let track = self.queue.lock().await.previous()?;
        self.playback.lock().await.current_track = Some(track.clone());
        Some(track)
    }

    /// Single reconciliation point for device-originated events, applied in
    /// arrival order. Never fails: malformed payloads degrade to defaults,
    /// since this is called from the session's only event pump.
    pub async fn handle_external_update(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Ready { device_id } => {
                // Only the device id; everything else waits for state events
                *self.device_id.lock().await = Some(device_id);
            }
            DeviceEvent::NotReady { device_id } => {
                tracing::debug!(device_id, "Clearing device id for offline device");
                *self.device_id.lock().await = None;
            }
            DeviceEvent::StateChanged(None) => {
                // The SDK reports null when it has no state to share
            }
            DeviceEvent::StateChanged(Some(raw)) => {
                if raw.paused.is_none() || raw.position.is_none() {
                    let err = PlayerError::MalformedDeviceEvent(
                        "state event missing paused/position".to_string(),
                    );
                    tracing::debug!(error = %err, "Applying defensive defaults");
                }

                let window = raw.track_window.unwrap_or_default();
                let confirmed_track = window.current_track;

                let mut playback = self.playback.lock().await;
                playback.is_playing = raw.paused.map(|paused| !paused).unwrap_or(false);
                playback.position_ms = raw.position.unwrap_or(0);
                playback.duration_ms = window
                    .duration_ms
                    .or(confirmed_track.as_ref().map(|t| t.duration_ms))
                    .unwrap_or(0);
                playback.current_track = confirmed_track.clone();
                drop(playback);

                if let Some(track) = confirmed_track {
                    self.queue.lock().await.sync_to_confirmed(&track);
                }
            }
        }
    }

    pub async fn set_volume(&self, percent: u8) {
        self.playback.lock().await.volume_percent = percent.min(100);
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.playback.lock().await.clone()
    }

    pub async fn device_id(&self) -> Option<String> {
        self.device_id.lock().await.clone()
    }

    /// Tracks and cursor position, for issuing a play command from the
    /// current navigation intent.
    pub async fn queue_snapshot(&self) -> (Vec<Track>, usize) {
        let queue = self.queue.lock().await;
        (queue.tracks().to_vec(), queue.current_index())
    }

    pub async fn queue_context(&self) -> Option<String> {
        self.queue.lock().await.context().map(str::to_string)
    }

    /// Whether the device-confirmed track fell outside the local queue.
    pub async fn queue_diverged(&self) -> bool {
        self.queue.lock().await.is_diverged()
    }
}
