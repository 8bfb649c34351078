//! Credential refresh management
//!
//! Guarantees callers always receive a non-expired access token for a given
//! user, refreshing via the remote auth endpoint when needed. Concurrent
//! callers for the same user share a single in-flight refresh: a rotated
//! refresh token presented twice can invalidate both requests remotely.

mod store;

pub use store::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::config::Settings;
use crate::error::{PlayerError, Result};

/// Tokens this close to expiry are treated as already expired, so a token
/// handed out is not invalidated mid-request by remote clock skew.
const REFRESH_LEEWAY_SECONDS: i64 = 30;

/// Per-user refresh coordination. The gate serializes refresh attempts;
/// the epoch counts completed attempts so a waiter can tell whether a
/// refresh finished while it was queued on the gate.
struct RefreshFlight {
    gate: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// The remote may or may not rotate the refresh token.
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Owner of all credential records; the only component that mutates them.
pub struct CredentialRefreshManager {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    settings: Settings,
    flights: Mutex<HashMap<String, Arc<RefreshFlight>>>,
}

impl CredentialRefreshManager {
    pub fn new(store: Arc<dyn CredentialStore>, settings: Settings) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            settings,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Return an access token that is valid right now, refreshing it first
    /// if the stored one is expired. Fails with `AuthExpired` when neither
    /// the stored token nor a refresh attempt yields a usable token.
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String> {
        if let Some(token) = self.usable_token(user_id).await? {
            return Ok(token);
        }

        let flight = self.flight(user_id);
        let seen_epoch = flight.epoch.load(Ordering::Acquire);
        let _guard = flight.gate.lock().await;

        // A refresh may have completed while this caller was reading the
        // stale credential or queued on the gate. Re-read the store under
        // the gate so the rotated refresh token is never presented twice.
        if let Some(token) = self.usable_token(user_id).await? {
            return Ok(token);
        }
        if flight.epoch.load(Ordering::Acquire) != seen_epoch {
            // A refresh already ran on this caller's behalf and still left
            // no usable token; share its failure instead of retrying.
            return Err(PlayerError::AuthExpired);
        }

        let result = self.refresh(user_id).await;
        flight.epoch.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// The stored access token, if it is still comfortably inside its
    /// validity window. `None` means a refresh is required.
    async fn usable_token(&self, user_id: &str) -> Result<Option<String>> {
        let credential = self
            .store
            .load(user_id)
            .await?
            .ok_or_else(|| PlayerError::UnknownUser(user_id.to_string()))?;

        let horizon = Utc::now() + Duration::seconds(REFRESH_LEEWAY_SECONDS);
        if credential.is_usable_at(horizon) {
            Ok(Some(credential.access_token))
        } else {
            Ok(None)
        }
    }

    /// Call the remote refresh endpoint and persist the rotated tokens.
    /// On failure the stored credential is left untouched, so a later user
    /// action can retry with the last-known-good refresh token.
    async fn refresh(&self, user_id: &str) -> Result<String> {
        let credential = self
            .store
            .load(user_id)
            .await?
            .ok_or_else(|| PlayerError::UnknownUser(user_id.to_string()))?;

        tracing::info!(user_id, "Access token expired, refreshing");

        let response = self
            .http
            .post(self.settings.token_url())
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credential.refresh_token.as_str()),
                ("client_id", self.settings.client_id.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::error!(
                    user_id,
                    status = response.status().as_u16(),
                    "Token refresh rejected"
                );
                return Err(PlayerError::AuthExpired);
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Token refresh request failed");
                return Err(PlayerError::AuthExpired);
            }
        };

        let tokens: TokenResponse = match response.json().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Token refresh response unreadable");
                return Err(PlayerError::AuthExpired);
            }
        };

        let refreshed = Credential {
            user_id: credential.user_id,
            access_token: tokens.access_token.clone(),
            // Keep the existing refresh token when the remote does not rotate
            refresh_token: tokens.refresh_token.unwrap_or(credential.refresh_token),
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
        };
        self.store.save(refreshed).await?;

        tracing::info!(user_id, "Token refreshed successfully");
        Ok(tokens.access_token)
    }

    fn flight(&self, user_id: &str) -> Arc<RefreshFlight> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        flights
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(RefreshFlight {
                    gate: tokio::sync::Mutex::new(()),
                    epoch: AtomicU64::new(0),
                })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;

    fn credential(expires_in_secs: i64) -> Credential {
        Credential {
            user_id: "user-1".to_string(),
            access_token: "old-access".to_string(),
            refresh_token: "old-refresh".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    fn settings(accounts_base_url: &str) -> Settings {
        Settings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            accounts_base_url: accounts_base_url.to_string(),
            ..Settings::default()
        }
    }

    async fn manager_with(
        cred: Credential,
        accounts_base_url: &str,
    ) -> (Arc<MemoryCredentialStore>, CredentialRefreshManager) {
        let store = Arc::new(MemoryCredentialStore::with_credential(cred).await);
        let manager = CredentialRefreshManager::new(store.clone(), settings(accounts_base_url));
        (store, manager)
    }

    #[tokio::test]
    async fn valid_token_is_returned_unchanged() {
        let (_store, manager) = manager_with(credential(3600), "http://127.0.0.1:1").await;
        let token = manager.get_valid_access_token("user-1").await.unwrap();
        assert_eq!(token, "old-access");
    }

    #[tokio::test]
    async fn unknown_user_is_an_error() {
        let (_store, manager) = manager_with(credential(3600), "http://127.0.0.1:1").await;
        let err = manager.get_valid_access_token("nobody").await.unwrap_err();
        assert!(matches!(err, PlayerError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_header("authorization", "Basic aWQ6c2VjcmV0")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "id".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let (store, manager) = manager_with(credential(-60), &server.url()).await;
        let token = manager.get_valid_access_token("user-1").await.unwrap();
        assert_eq!(token, "new-access");

        let saved = store.load("user-1").await.unwrap().unwrap();
        assert_eq!(saved.access_token, "new-access");
        assert_eq!(saved.refresh_token, "new-refresh");
        assert!(saved.is_usable_at(Utc::now() + Duration::minutes(30)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_rotation_keeps_existing_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_body(r#"{"access_token":"new-access","expires_in":3600}"#)
            .create_async()
            .await;

        let (store, manager) = manager_with(credential(-60), &server.url()).await;
        manager.get_valid_access_token("user-1").await.unwrap();

        let saved = store.load("user-1").await.unwrap().unwrap();
        assert_eq!(saved.refresh_token, "old-refresh");
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_auth_expired_and_keeps_stored_credential() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let original = credential(-60);
        let original_expiry = original.expires_at;
        let (store, manager) = manager_with(original, &server.url()).await;

        let err = manager.get_valid_access_token("user-1").await.unwrap_err();
        assert!(matches!(err, PlayerError::AuthExpired));

        // Last-known-good values survive for a later retry
        let saved = store.load("user-1").await.unwrap().unwrap();
        assert_eq!(saved.access_token, "old-access");
        assert_eq!(saved.refresh_token, "old-refresh");
        assert_eq!(saved.expires_at, original_expiry);
    }

    // Parallel workers so callers can really interleave between reading a
    // stale credential and reaching the refresh gate
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_body(r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::with_credential(credential(-60)).await);
        let manager = Arc::new(CredentialRefreshManager::new(
            store,
            settings(&server.url()),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.get_valid_access_token("user-1").await
            }));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token, "new-access");
        }

        mock.assert_async().await;
    }
}
