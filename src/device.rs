//! Playback device integration
//!
//! The remote device is reached through an external SDK; this module owns
//! the seam (`DeviceConnection`), the callback payload shapes, and the
//! adapter that turns raw SDK callbacks into one ordered event stream.

mod adapter;
mod events;

pub use adapter::{ConnectionState, PlayerAdapter};
pub use events::{DeviceEvent, RawPlayerState, RawTrackWindow};

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;

/// Callback the connection uses to obtain a fresh access token lazily,
/// instead of holding one that may expire mid-session.
pub type TokenSupplier = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Seam over the external playback SDK.
///
/// `connect` hands the SDK a token supplier and a sender for its callback
/// events; transport calls map one-to-one onto SDK controls. Implementations
/// live outside this crate (tests use fakes).
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    async fn connect(
        &self,
        token_supplier: TokenSupplier,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn seek(&self, position_ms: u64) -> Result<()>;
    async fn set_volume(&self, percent: u8) -> Result<()>;
    async fn next_track(&self) -> Result<()>;
    async fn previous_track(&self) -> Result<()>;
}
