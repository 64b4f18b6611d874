//! Change Broadcaster
//!
//! Fire-and-forget fan-out of adapter and observer-set changes to every
//! connected client, built on `tokio::sync::broadcast`.
//!
//! # Delivery Semantics
//!
//! - Non-blocking: [`ChangeBroadcaster::broadcast`] never awaits, so it may be
//!   called while holding a synchronous lock.
//! - At most once per client per call. No retry, no persistence.
//! - A client that falls more than `capacity` events behind receives
//!   `RecvError::Lagged` and is expected to refetch full state.
//! - Broadcasting with no connected clients is not an error.
//!
//! ```rust,ignore
//! let broadcaster = ChangeBroadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! broadcaster.broadcast(Channel::BeamlineValueChange, &json!({"name": "phi", "value": 1.0}));
//!
//! let event = rx.recv().await?;
//! assert_eq!(event.channel, Channel::BeamlineValueChange);
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of events buffered per client before it starts lagging.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Client-facing event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Adapter value or state changes
    #[serde(rename = "beamline_value_change")]
    BeamlineValueChange,
    /// Operator/observer set changes
    #[serde(rename = "observersChanged")]
    ObserversChanged,
}

impl Channel {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeamlineValueChange => "beamline_value_change",
            Self::ObserversChanged => "observersChanged",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Destination channel
    pub channel: Channel,
    /// JSON payload
    pub payload: serde_json::Value,
}

impl ClientEvent {
    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

/// Fan-out hub shared by adapters and the control manager.
///
/// Cloning is cheap; all clones feed the same set of receivers.
#[derive(Debug, Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBroadcaster {
    /// Broadcaster with [`DEFAULT_BROADCAST_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Broadcaster buffering `capacity` events per client.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Connect a new client.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Number of connected clients.
    pub fn connected_clients(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver `payload` on `channel` to every connected client.
    ///
    /// Returns the number of clients the event was queued for.
    pub fn broadcast<T: Serialize + ?Sized>(&self, channel: Channel, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(%channel, error = %e, "Failed to serialize broadcast payload");
                return 0;
            }
        };

        match self.tx.send(ClientEvent { channel, payload }) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!(%channel, "No connected clients, event dropped");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_every_client() {
        let broadcaster = ChangeBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let n = broadcaster.broadcast(Channel::ObserversChanged, &json!({"message": ""}));
        assert_eq!(n, 2);

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.channel, Channel::ObserversChanged);
            assert_eq!(event.payload["message"], "");
        }
    }

    #[test]
    fn no_clients_is_not_an_error() {
        let broadcaster = ChangeBroadcaster::new();
        assert_eq!(broadcaster.connected_clients(), 0);
        assert_eq!(
            broadcaster.broadcast(Channel::BeamlineValueChange, &json!({"name": "phi"})),
            0
        );
    }

    #[test]
    fn channel_wire_names() {
        assert_eq!(
            serde_json::to_value(Channel::ObserversChanged).unwrap(),
            json!("observersChanged")
        );
        assert_eq!(Channel::BeamlineValueChange.to_string(), "beamline_value_change");
    }

    #[tokio::test]
    async fn decode_typed_payload() {
        #[derive(Deserialize)]
        struct ValueChange {
            name: String,
            value: f64,
        }

        let broadcaster = ChangeBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(Channel::BeamlineValueChange, &json!({"name": "phi", "value": 2.5}));

        let change: ValueChange = rx.recv().await.unwrap().decode().unwrap();
        assert_eq!(change.name, "phi");
        assert_eq!(change.value, 2.5);
    }
}
