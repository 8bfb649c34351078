//! Session-scoped wiring of the playback components
//!
//! One `PlayerSession` exists per signed-in client session. It owns the
//! single device adapter plus the store, relay and refresh manager, and is
//! passed by reference to callers rather than living in ambient state.

use std::sync::Arc;

use crate::auth::{CredentialRefreshManager, CredentialStore};
use crate::config::Settings;
use crate::device::{DeviceConnection, PlayerAdapter, TokenSupplier};
use crate::error::{PlayerError, Result};
use crate::relay::CommandRelay;
use crate::session::{PlaybackState, SessionStore, Track};

pub struct PlayerSession {
    auth: Arc<CredentialRefreshManager>,
    adapter: PlayerAdapter,
    store: SessionStore,
    relay: CommandRelay,
    user_id: String,
}

impl PlayerSession {
    pub fn new(
        settings: Settings,
        credentials: Arc<dyn CredentialStore>,
        connection: Arc<dyn DeviceConnection>,
        user_id: impl Into<String>,
    ) -> Self {
        let auth = Arc::new(CredentialRefreshManager::new(credentials, settings.clone()));
        let store = SessionStore::new();
        let adapter = PlayerAdapter::new(connection, store.clone());
        let relay = CommandRelay::new(auth.clone(), settings);

        Self {
            auth,
            adapter,
            store,
            relay,
            user_id: user_id.into(),
        }
    }

    /// Connect to the playback device. The connection pulls tokens lazily
    /// through the refresh manager, so a token expiring mid-session is
    /// refreshed transparently on the next request.
    pub async fn connect(&self) -> Result<()> {
        let auth = self.auth.clone();
        let user_id = self.user_id.clone();
        let supplier: TokenSupplier = Arc::new(move || {
            let auth = auth.clone();
            let user_id = user_id.clone();
            Box::pin(async move { auth.get_valid_access_token(&user_id).await })
        });

        self.adapter.initialize(supplier).await
    }

    /// Replace the queue and start playback from `start_index`.
    ///
    /// The local queue updates optimistically before the command is sent;
    /// the device's state events remain the authority on what plays.
    pub async fn play_queue(
        &self,
        tracks: Vec<Track>,
        start_index: usize,
        context: &str,
    ) -> Result<()> {
        let device_id = self
            .store
            .device_id()
            .await
            .ok_or(PlayerError::DeviceNotReady)?;

        self.store
            .set_queue(tracks.clone(), start_index, context)
            .await;

        self.relay
            .play_from_queue(&tracks, start_index, &device_id, &self.user_id)
            .await
    }

    /// Advance to the next queued track and tell the device to play the
    /// queue from the new offset. `Ok(None)` at the end of the queue; no
    /// command is issued in that case.
    pub async fn next_track(&self) -> Result<Option<Track>> {
        let Some(track) = self.store.next_track().await else {
            return Ok(None);
        };
        self.play_from_cursor().await?;
        Ok(Some(track))
    }

    pub async fn previous_track(&self) -> Result<Option<Track>> {
        let Some(track) = self.store.previous_track().await else {
            return Ok(None);
        };
        self.play_from_cursor().await?;
        Ok(Some(track))
    }

    async fn play_from_cursor(&self) -> Result<()> {
        let device_id = self
            .store
            .device_id()
            .await
            .ok_or(PlayerError::DeviceNotReady)?;

        let (tracks, index) = self.store.queue_snapshot().await;
        self.relay
            .play_from_queue(&tracks, index, &device_id, &self.user_id)
            .await
    }

    pub async fn resume(&self) {
        self.adapter.resume().await;
    }

    pub async fn pause(&self) {
        self.adapter.pause().await;
    }

    /// Seek to a percentage of the current track, mirroring a click on a
    /// progress bar. Ignored while no duration is known.
    pub async fn seek_to_percent(&self, percent: f64) {
        let state = self.store.playback_state().await;
        if state.duration_ms == 0 {
            tracing::debug!("Seek ignored, no track duration known");
            return;
        }
        let fraction = percent.clamp(0.0, 100.0) / 100.0;
        let position_ms = (fraction * state.duration_ms as f64) as u64;
        self.adapter.seek(position_ms).await;
    }

    /// Set the device volume and echo it locally so the UI tracks the
    /// slider immediately.
    pub async fn set_volume(&self, percent: u8) {
        let percent = percent.min(100);
        self.adapter.set_volume(percent).await;
        self.store.set_volume(percent).await;
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.store.playback_state().await
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Pause (best effort) and tear down the device connection.
    pub async fn disconnect(&self) {
        self.adapter.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryCredentialStore};
    use crate::device::DeviceEvent;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ScriptedConnection {
        events_tx: std::sync::Mutex<Option<mpsc::Sender<DeviceEvent>>>,
    }

    impl ScriptedConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events_tx: std::sync::Mutex::new(None),
            })
        }

        async fn emit_ready(&self, device_id: &str) {
            let tx = self.events_tx.lock().unwrap().clone().unwrap();
            tx.send(DeviceEvent::Ready {
                device_id: device_id.to_string(),
            })
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[async_trait]
    impl DeviceConnection for ScriptedConnection {
        async fn connect(
            &self,
            _token_supplier: TokenSupplier,
            events: mpsc::Sender<DeviceEvent>,
        ) -> Result<()> {
            *self.events_tx.lock().unwrap() = Some(events);
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn seek(&self, _position_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn set_volume(&self, _percent: u8) -> Result<()> {
            Ok(())
        }

        async fn next_track(&self) -> Result<()> {
            Ok(())
        }

        async fn previous_track(&self) -> Result<()> {
            Ok(())
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            uri: format!("spotify:track:{}", id),
            ..Track::default()
        }
    }

    async fn session_for(
        server: &mockito::Server,
        connection: Arc<ScriptedConnection>,
    ) -> PlayerSession {
        let credential = Credential {
            user_id: "user-1".to_string(),
            access_token: "valid-token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        };
        let credentials = Arc::new(MemoryCredentialStore::with_credential(credential).await);
        let settings = Settings {
            api_base_url: server.url(),
            ..Settings::default()
        };
        PlayerSession::new(settings, credentials, connection, "user-1")
    }

    #[tokio::test]
    async fn play_without_ready_device_is_rejected() {
        let server = mockito::Server::new_async().await;
        let session = session_for(&server, ScriptedConnection::new()).await;

        let err = session
            .play_queue(vec![track("a")], 0, "search results")
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::DeviceNotReady));
    }

    #[tokio::test]
    async fn next_track_plays_queue_from_new_offset() {
        let mut server = mockito::Server::new_async().await;
        let start_mock = server
            .mock("PUT", "/v1/me/player/play")
            .match_query(Matcher::UrlEncoded("device_id".into(), "device-1".into()))
            .match_body(Matcher::Json(json!({
                "uris": ["spotify:track:a", "spotify:track:b"],
                "offset": { "position": 0 }
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let next_mock = server
            .mock("PUT", "/v1/me/player/play")
            .match_query(Matcher::UrlEncoded("device_id".into(), "device-1".into()))
            .match_body(Matcher::Json(json!({
                "uris": ["spotify:track:a", "spotify:track:b"],
                "offset": { "position": 1 }
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let connection = ScriptedConnection::new();
        let session = session_for(&server, connection.clone()).await;
        session.connect().await.unwrap();
        connection.emit_ready("device-1").await;

        session
            .play_queue(vec![track("a"), track("b")], 0, "a given playlist")
            .await
            .unwrap();

        let advanced = session.next_track().await.unwrap().unwrap();
        assert_eq!(advanced.id, "b");

        // End of queue: no further command, just a terminal None
        assert!(session.next_track().await.unwrap().is_none());

        start_mock.assert_async().await;
        next_mock.assert_async().await;
    }

    #[tokio::test]
    async fn volume_is_echoed_locally() {
        let server = mockito::Server::new_async().await;
        let connection = ScriptedConnection::new();
        let session = session_for(&server, connection.clone()).await;
        session.connect().await.unwrap();
        connection.emit_ready("device-1").await;

        session.set_volume(80).await;
        assert_eq!(session.playback_state().await.volume_percent, 80);
    }
}
