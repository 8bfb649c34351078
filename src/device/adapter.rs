//! Process-wide owner of the connection to one remote playback device

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::session::SessionStore;

use super::{DeviceConnection, DeviceEvent, TokenSupplier};

/// Size of the internal event channel between the SDK and the pump task.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Lifecycle of the device connection. The playing/paused sub-state while
/// `Ready` is reported by the device and owned by the session store, not
/// tracked here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready { device_id: String },
    /// The device reported itself offline while the session is still up.
    Gone,
}

/// Adapter around the device connection.
///
/// There is one per client session; construct it once at the top level and
/// pass it by reference to whatever needs transport control. Events flow
/// through a single pump task to the session store in arrival order; the
/// adapter itself performs no merging.
pub struct PlayerAdapter {
    connection: Arc<dyn DeviceConnection>,
    store: SessionStore,
    state: Arc<Mutex<ConnectionState>>,
}

impl PlayerAdapter {
    pub fn new(connection: Arc<dyn DeviceConnection>, store: SessionStore) -> Self {
        Self {
            connection,
            store,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
        }
    }

    /// Establish the device connection and start the event pump.
    ///
    /// Idempotent: a second call while already `Connecting` or `Ready` is a
    /// no-op, so multiple UI entry points can race this safely.
    pub async fn initialize(&self, token_supplier: TokenSupplier) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ConnectionState::Connecting | ConnectionState::Ready { .. } => {
                    tracing::debug!("Device already initializing or ready, skipping");
                    return Ok(());
                }
                _ => *state = ConnectionState::Connecting,
            }
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        if let Err(e) = self.connection.connect(token_supplier, events_tx).await {
            tracing::error!(error = %e, "Device connection failed");
            *self.state.lock().await = ConnectionState::Disconnected;
            return Err(e);
        }

        self.spawn_event_pump(events_rx);
        tracing::info!("Device connection established, waiting for ready event");
        Ok(())
    }

    /// Single consumer of device events. Updates the lifecycle state and
    /// forwards each event verbatim to the session store; merge errors stay
    /// inside the store, so this task can never die on a bad payload.
    fn spawn_event_pump(&self, mut events_rx: mpsc::Receiver<DeviceEvent>) {
        let state = self.state.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match &event {
                    DeviceEvent::Ready { device_id } => {
                        tracing::info!(device_id, "Device ready");
                        *state.lock().await = ConnectionState::Ready {
                            device_id: device_id.clone(),
                        };
                    }
                    DeviceEvent::NotReady { device_id } => {
                        tracing::warn!(device_id, "Device went offline");
                        *state.lock().await = ConnectionState::Gone;
                    }
                    DeviceEvent::StateChanged(_) => {}
                }

                store.handle_external_update(event).await;
            }

            tracing::debug!("Device event channel closed, pump stopping");
        });
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// Device id of the ready device, if any.
    pub async fn device_id(&self) -> Option<String> {
        match &*self.state.lock().await {
            ConnectionState::Ready { device_id } => Some(device_id.clone()),
            _ => None,
        }
    }

    // Transport commands are fire-and-forget: with no ready device they are
    // silently dropped (there is no device id to address), and a failure is
    // logged, not retried, and never changes adapter state.

    pub async fn resume(&self) {
        if self.device_id().await.is_none() {
            tracing::debug!("No ready device, dropping resume");
            return;
        }
        if let Err(e) = self.connection.resume().await {
            tracing::warn!(error = %e, "Resume command failed");
        }
    }

    pub async fn pause(&self) {
        if self.device_id().await.is_none() {
            tracing::debug!("No ready device, dropping pause");
            return;
        }
        if let Err(e) = self.connection.pause().await {
            tracing::warn!(error = %e, "Pause command failed");
        }
    }

    pub async fn seek(&self, position_ms: u64) {
        if self.device_id().await.is_none() {
            tracing::debug!(position_ms, "No ready device, dropping seek");
            return;
        }
        if let Err(e) = self.connection.seek(position_ms).await {
            tracing::warn!(position_ms, error = %e, "Seek command failed");
        }
    }

    pub async fn set_volume(&self, percent: u8) {
        if self.device_id().await.is_none() {
            tracing::debug!(percent, "No ready device, dropping volume change");
            return;
        }
        if let Err(e) = self.connection.set_volume(percent).await {
            tracing::warn!(percent, error = %e, "Volume command failed");
        }
    }

    pub async fn next_track(&self) {
        if self.device_id().await.is_none() {
            tracing::debug!("No ready device, dropping next-track");
            return;
        }
        if let Err(e) = self.connection.next_track().await {
            tracing::warn!(error = %e, "Next-track command failed");
        }
    }

    pub async fn previous_track(&self) {
        if self.device_id().await.is_none() {
            tracing::debug!("No ready device, dropping previous-track");
            return;
        }
        if let Err(e) = self.connection.previous_track().await {
            tracing::warn!(error = %e, "Previous-track command failed");
        }
    }

    /// Pause, then tear the connection down.
    ///
    /// The pause is best-effort and its failure is tolerated, but it must be
    /// attempted first: disconnecting a playing device leaves remote audio
    /// running with no controller attached. Teardown itself is never skipped.
    pub async fn disconnect(&self) {
        if let Err(e) = self.connection.pause().await {
            tracing::warn!(error = %e, "Pause before disconnect failed");
        }

        if let Err(e) = self.connection.disconnect().await {
            tracing::warn!(error = %e, "Device teardown reported an error");
        }

        *self.state.lock().await = ConnectionState::Disconnected;
        tracing::info!("Device disconnected");
    }
}
