use std::sync::Arc;

use chanswap_core::{ChannelEvent, Envelope, Target};
use tokio::sync::broadcast;

use crate::client::ClientRegistry;

/// Forwards coordinator envelopes to WebSocket clients, in the order the
/// coordinator queued them.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Spawn the forwarding task. Ends when the coordinator is dropped.
    pub fn start(&self, mut rx: broadcast::Receiver<Envelope>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => deliver(&registry, &envelope),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

fn deliver(registry: &ClientRegistry, envelope: &Envelope) {
    let Some(json) = serialize_event(&envelope.event) else {
        tracing::error!(event = envelope.event.event_type(), "failed to serialize event");
        return;
    };
    match &envelope.target {
        Target::All => {
            let delivered = registry.broadcast_all(&json);
            tracing::trace!(event = envelope.event.event_type(), delivered, "broadcast");
        }
        Target::One(connection_id) => {
            if !registry.send_to(connection_id, json) {
                tracing::debug!(
                    connection_id = %connection_id,
                    event = envelope.event.event_type(),
                    "unicast target gone"
                );
            }
        }
    }
}

/// Create an event bridge wired to the coordinator's event channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<Envelope>,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(registry).start(rx)
}

pub fn serialize_event(event: &ChannelEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanswap_core::{ConnectionId, Stats};
    use std::time::Duration;

    #[test]
    fn serialize_stats_event() {
        let json = serialize_event(&ChannelEvent::StatsChanged(Stats {
            votes: 2,
            visitors: 4,
        }))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "statsChanged", "votes": 2, "visitors": 4})
        );
    }

    #[tokio::test]
    async fn bridge_broadcasts_to_all_clients() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(16);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        let handle = create_bridge(Arc::clone(&registry), rx);
        tx.send(Envelope::all(ChannelEvent::ActiveItemChanged { item: None }))
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(msg.contains("activeItemChanged"));
        }
        handle.abort();
    }

    #[tokio::test]
    async fn bridge_unicasts_to_target_only() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(16);
        let (a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        let handle = create_bridge(Arc::clone(&registry), rx);
        tx.send(Envelope::one(
            a,
            ChannelEvent::VoteRejected {
                reason: "already voted".into(),
            },
        ))
        .unwrap();
        tx.send(Envelope::all(ChannelEvent::CatalogChanged { items: vec![] }))
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.contains("voteRejected"));

        // b sees only the broadcast that followed
        let only = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(only.contains("catalogChanged"));
        handle.abort();
    }

    #[tokio::test]
    async fn bridge_stops_when_sender_dropped() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel::<Envelope>(4);
        let handle = create_bridge(registry, rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn unicast_to_departed_client_is_dropped() {
        let registry = ClientRegistry::new(32);
        let (_other, mut rx_other) = registry.register();
        deliver(
            &registry,
            &Envelope::one(ConnectionId::new(), ChannelEvent::VoteRejected { reason: "x".into() }),
        );
        assert!(rx_other.try_recv().is_err());
    }
}
