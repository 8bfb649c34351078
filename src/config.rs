//! Runtime configuration
//!
//! API credentials come from the environment; endpoint base URLs default to
//! the production hosts and are overridable so tests can point at a local
//! mock server.

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    /// Base URL of the accounts service handling token refresh.
    pub accounts_base_url: String,
    /// Base URL of the playback control API.
    pub api_base_url: String,
    /// Name the connected device announces to other clients.
    pub device_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            accounts_base_url: "https://accounts.spotify.com".to_string(),
            api_base_url: "https://api.spotify.com".to_string(),
            device_name: "NextGen Music Player".to_string(),
        }
    }
}

impl Settings {
    /// Build settings from the environment. `SPOTIFY_CLIENT_ID` and
    /// `SPOTIFY_CLIENT_SECRET` are required; the rest are optional
    /// overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            client_id: std::env::var("SPOTIFY_CLIENT_ID")
                .context("SPOTIFY_CLIENT_ID is not set")?,
            client_secret: std::env::var("SPOTIFY_CLIENT_SECRET")
                .context("SPOTIFY_CLIENT_SECRET is not set")?,
            accounts_base_url: std::env::var("SPOTIFY_ACCOUNTS_URL")
                .unwrap_or(defaults.accounts_base_url),
            api_base_url: std::env::var("SPOTIFY_API_URL").unwrap_or(defaults.api_base_url),
            device_name: std::env::var("PLAYER_DEVICE_NAME").unwrap_or(defaults.device_name),
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.accounts_base_url)
    }

    pub fn play_url(&self) -> String {
        format!("{}/v1/me/player/play", self.api_base_url)
    }
}
