//! Error taxonomy for the playback session core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlayerError>;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The stored access token is expired and could not be refreshed. The
    /// user has to re-authenticate through the outer sign-in flow.
    #[error("access credential expired and refresh failed")]
    AuthExpired,

    #[error("no credential on record for user {0}")]
    UnknownUser(String),

    /// No connected, ready playback device to address commands to.
    #[error("playback device is not ready")]
    DeviceNotReady,

    #[error("remote rejected playback command with status {status}")]
    PlaybackCommandFailed { status: u16 },

    /// A playback command was sent but never acknowledged.
    #[error("playback command timed out")]
    CommandTimeout,

    #[error("malformed device event: {0}")]
    MalformedDeviceEvent(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("credential store error: {0}")]
    Store(String),
}

impl PlayerError {
    /// Map a non-success playback command status onto the taxonomy. 401 is
    /// an auth problem, 404 means the addressed device is gone; anything
    /// else surfaces as a plain command failure.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => PlayerError::AuthExpired,
            404 => PlayerError::DeviceNotReady,
            status => PlayerError::PlaybackCommandFailed { status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(PlayerError::from_status(401), PlayerError::AuthExpired));
        assert!(matches!(
            PlayerError::from_status(404),
            PlayerError::DeviceNotReady
        ));
        assert!(matches!(
            PlayerError::from_status(502),
            PlayerError::PlaybackCommandFailed { status: 502 }
        ));
    }
}
