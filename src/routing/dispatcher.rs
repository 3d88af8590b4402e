//! Dispatch loop
//!
//! Consumes [`BrokerEvent`]s from the connection manager and fans them out:
//! heartbeats to the liveness tracker, confirmations to the gateway, sensor
//! samples into storage. Malformed messages are dropped here with a
//! diagnostic; nothing in this loop ever returns an error to the transport.

use crate::gateway::CommandGateway;
use crate::health::HealthFlag;
use crate::liveness::LivenessTracker;
use crate::protocol::{unit_for_kind, HardwareAddress, InboundMessage, RouteError, TopicSchema};
use crate::storage::{SensorReading, Store};
use crate::transport::mqtt::BrokerEvent;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct MessageDispatcher {
    schema: TopicSchema,
    liveness: Arc<LivenessTracker>,
    gateway: Arc<CommandGateway>,
    store: Arc<dyn Store>,
    storage_health: Arc<HealthFlag>,
}

impl MessageDispatcher {
    pub fn new(
        schema: TopicSchema,
        liveness: Arc<LivenessTracker>,
        gateway: Arc<CommandGateway>,
        store: Arc<dyn Store>,
        storage_health: Arc<HealthFlag>,
    ) -> Self {
        Self {
            schema,
            liveness,
            gateway,
            store,
            storage_health,
        }
    }

    /// Run until the broker event channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                BrokerEvent::Connected => {
                    // Commands may have been dropped while the session was
                    // down; arm reconciliation for every device.
                    self.liveness.rearm().await;
                }
                BrokerEvent::Message { topic, payload } => {
                    self.dispatch(&topic, &payload).await;
                }
            }
        }
        info!("broker event channel closed, dispatcher stopping");
    }

    /// Classify and handle one inbound message.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        match self.schema.classify(topic, payload) {
            Ok(InboundMessage::SensorSample { addr, kind, value }) => {
                self.ingest_sample(addr, kind, value).await;
            }
            Ok(InboundMessage::ActuatorConfirm { addr, kind, value }) => {
                self.gateway.confirm_command(&addr, &kind, &value).await;
            }
            Ok(InboundMessage::Heartbeat { addr, payload }) => {
                self.liveness.on_heartbeat(&addr, &payload).await;
            }
            Ok(InboundMessage::DeviceStatusBroadcast { value }) => {
                debug!(value = %value, "device status broadcast");
            }
            Err(e @ RouteError::UnrecognizedTopic(_)) => {
                debug!(error = %e, "dropping message on unrecognized topic");
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed message");
            }
        }
    }

    async fn ingest_sample(&self, addr: HardwareAddress, kind: String, value: f64) {
        // Samples from unregistered devices carry no context; drop them.
        match self.store.device(&addr).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(device = %addr, kind = %kind, "sample from unknown device dropped");
                return;
            }
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                return;
            }
        }

        let unit = unit_for_kind(&kind).to_string();
        let reading = SensorReading {
            addr: addr.clone(),
            kind: kind.clone(),
            value,
            unit,
            timestamp: Utc::now(),
        };
        match self.store.append_reading(reading).await {
            Ok(()) => {
                self.storage_health.restore();
                debug!(device = %addr, kind = %kind, value, "stored sensor reading");
            }
            Err(e) => self.storage_health.degrade(&e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessSection;
    use crate::reconcile::Reconciler;
    use crate::storage::{Device, MemoryStore};
    use crate::testing::mocks::{FlakyStore, MockPublisher};

    fn addr() -> HardwareAddress {
        HardwareAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn dispatcher_with(store: Arc<dyn Store>) -> MessageDispatcher {
        let schema = TopicSchema::new("ns");
        let publisher = Arc::new(MockPublisher::new());
        let health = Arc::new(HealthFlag::new("storage"));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            publisher.clone(),
            schema.clone(),
            health.clone(),
        ));
        let liveness = Arc::new(LivenessTracker::new(
            store.clone(),
            reconciler,
            health.clone(),
            LivenessSection::default(),
        ));
        let gateway = Arc::new(CommandGateway::new(
            store.clone(),
            publisher,
            schema.clone(),
            health.clone(),
        ));
        MessageDispatcher::new(schema, liveness, gateway, store, health)
    }

    #[tokio::test]
    async fn test_sensor_sample_is_stored_with_unit() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_device(Device::new(addr(), "bench"))
            .await
            .unwrap();
        let dispatcher = dispatcher_with(store.clone());

        dispatcher
            .dispatch("ns/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"25.5")
            .await;

        let readings = store.readings(&addr()).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, 25.5);
        assert_eq!(readings[0].unit, "°C");
    }

    #[tokio::test]
    async fn test_sample_from_unknown_device_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_with(store.clone());

        dispatcher
            .dispatch("ns/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"25.5")
            .await;

        assert!(store.readings(&addr()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_routes_to_liveness() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_device(Device::new(addr(), "bench"))
            .await
            .unwrap();
        let dispatcher = dispatcher_with(store.clone());

        dispatcher
            .dispatch("ns/heartbeat/AA:BB:CC:DD:EE:FF", b"192.168.8.130")
            .await;

        let device = store.device(&addr()).await.unwrap().unwrap();
        assert!(device.is_online());
        assert_eq!(device.network_addr.as_deref(), Some("192.168.8.130"));
    }

    #[tokio::test]
    async fn test_malformed_messages_never_panic_or_propagate() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_with(store);

        for (topic, payload) in [
            ("ns/sensors/not-a-mac/temperatura", b"25.5".to_vec()),
            ("ns/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"abc".to_vec()),
            ("other/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"1".to_vec()),
            ("ns/heartbeat/AA:BB:CC:DD:EE:FF", vec![0xff, 0xfe]),
            ("ns", b"".to_vec()),
        ] {
            dispatcher.dispatch(topic, &payload).await;
        }
    }

    #[tokio::test]
    async fn test_storage_outage_degrades_without_stopping_dispatch() {
        let store = Arc::new(FlakyStore::new());
        store
            .upsert_device(Device::new(addr(), "bench"))
            .await
            .unwrap();
        let dispatcher = dispatcher_with(store.clone());
        store.fail_everything(true);

        dispatcher
            .dispatch("ns/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"25.5")
            .await;
        assert!(dispatcher.storage_health.is_degraded());

        // Outage ends: the next sample both stores and restores the flag.
        store.fail_everything(false);
        dispatcher
            .dispatch("ns/sensors/AA:BB:CC:DD:EE:FF/temperatura", b"26.0")
            .await;
        assert!(!dispatcher.storage_health.is_degraded());
        assert_eq!(store.readings(&addr()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_channel_until_close() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_device(Device::new(addr(), "bench"))
            .await
            .unwrap();
        let dispatcher = Arc::new(dispatcher_with(store.clone()));
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(dispatcher.run(rx));
        tx.send(BrokerEvent::Message {
            topic: "ns/heartbeat/AA:BB:CC:DD:EE:FF".to_string(),
            payload: b"192.168.8.130".to_vec(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(store.device(&addr()).await.unwrap().unwrap().is_online());
    }
}
