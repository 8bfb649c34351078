//! Relay translating queue intent into remote play commands

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::auth::CredentialRefreshManager;
use crate::config::Settings;
use crate::error::{PlayerError, Result};
use crate::session::Track;

/// An un-acknowledged command must never freeze transport controls; after
/// this long a pending command counts as failed.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identical commands re-issued inside this window (a rapid double-click)
/// are coalesced into one request.
const COALESCE_WINDOW: Duration = Duration::from_millis(300);

struct RecentCommand {
    fingerprint: u64,
    issued_at: Instant,
}

/// Sends play commands to the remote device control endpoint.
///
/// A command carries the full ordered URI list plus a start offset, so the
/// remote device owns forward/back navigation for the rest of that context.
/// "Last command sent wins" is the remote's own overlap policy; the relay
/// only guarantees that its own sends hit the wire in issue order and that
/// duplicate bursts collapse to one request.
pub struct CommandRelay {
    http: reqwest::Client,
    auth: Arc<CredentialRefreshManager>,
    settings: Settings,
    command_timeout: Duration,
    send_gate: tokio::sync::Mutex<()>,
    recent: Mutex<Option<RecentCommand>>,
}

impl CommandRelay {
    pub fn new(auth: Arc<CredentialRefreshManager>, settings: Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
            settings,
            command_timeout: COMMAND_TIMEOUT,
            send_gate: tokio::sync::Mutex::new(()),
            recent: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Issue one play command for the queue starting at `offset`. With a
    /// single track and no queue context, falls back to a one-track body.
    ///
    /// Not retried on failure: the operation is user-visible and repeatable
    /// on the next interaction.
    pub async fn play_from_queue(
        &self,
        tracks: &[Track],
        offset: usize,
        device_id: &str,
        user_id: &str,
    ) -> Result<()> {
        if tracks.is_empty() {
            tracing::warn!(device_id, "Play command with no tracks, dropping");
            return Ok(());
        }

        let uris: Vec<String> = tracks.iter().map(Track::playable_uri).collect();
        let body = if uris.len() > 1 {
            json!({ "uris": uris, "offset": { "position": offset } })
        } else {
            json!({ "uris": uris })
        };

        if self.coalesce(device_id, &uris, offset) {
            tracing::debug!(device_id, offset, "Coalescing duplicate play command");
            return Ok(());
        }

        let token = self.auth.get_valid_access_token(user_id).await?;

        // Serialize sends so a stale command cannot overtake a newer one
        // through network reordering.
        let _gate = self.send_gate.lock().await;

        tracing::debug!(
            device_id,
            offset,
            track_count = uris.len(),
            "Sending play command"
        );

        let request = self
            .http
            .put(self.settings.play_url())
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.command_timeout, request).await {
            Err(_) => {
                tracing::warn!(device_id, "Play command not acknowledged in time");
                self.forget_recent();
                return Err(PlayerError::CommandTimeout);
            }
            Ok(Err(e)) => {
                tracing::error!(device_id, error = %e, "Play command transport failure");
                self.forget_recent();
                return Err(PlayerError::Http(e));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_success() {
            tracing::info!(device_id, offset, "Play command accepted");
            Ok(())
        } else {
            tracing::error!(device_id, status = status.as_u16(), "Play command rejected");
            self.forget_recent();
            Err(PlayerError::from_status(status.as_u16()))
        }
    }

    /// True when an identical command was issued within the coalesce
    /// window. Also records this command as the most recent one.
    fn coalesce(&self, device_id: &str, uris: &[String], offset: usize) -> bool {
        let mut hasher = DefaultHasher::new();
        device_id.hash(&mut hasher);
        uris.hash(&mut hasher);
        offset.hash(&mut hasher);
        let fingerprint = hasher.finish();

        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = recent.as_ref() {
            if prev.fingerprint == fingerprint && prev.issued_at.elapsed() < COALESCE_WINDOW {
                return true;
            }
        }
        *recent = Some(RecentCommand {
            fingerprint,
            issued_at: Instant::now(),
        });
        false
    }

    /// Drop the recorded fingerprint after a failed send. Only successful
    /// commands may absorb their duplicates; a retry of a failure must hit
    /// the wire again.
    fn forget_recent(&self) {
        *self.recent.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
