//! Playback session core for a remote streaming device
//!
//! Keeps a local queue/UI synchronized with an asynchronously-reporting
//! remote playback device, while transparently keeping the per-user access
//! credential valid. The pieces are wired together by [`PlayerSession`]:
//!
//! - `auth`: credential records and the single-flight refresh manager
//! - `device`: the SDK seam and the adapter that pumps device events
//! - `session`: queue intent merged with device-reported playback state
//! - `relay`: queue intent translated into remote play commands

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod player;
pub mod relay;
pub mod session;

pub use auth::{
    Credential, CredentialRefreshManager, CredentialStore, FileCredentialStore,
    MemoryCredentialStore,
};
pub use config::Settings;
pub use device::{
    ConnectionState, DeviceConnection, DeviceEvent, PlayerAdapter, RawPlayerState, RawTrackWindow,
    TokenSupplier,
};
pub use error::{PlayerError, Result};
pub use player::PlayerSession;
pub use relay::CommandRelay;
pub use session::{PlaybackState, Queue, SessionStore, Track};
