//! Actuator reconciliation
//!
//! Devices lose their outputs on power loss; the persisted actuator state is
//! the source of truth. When a device transitions back to online (or the
//! broker session itself is re-established), every persisted state for that
//! device is republished so the hardware converges on what the backend
//! believes.
//!
//! Failures are isolated per actuator: one failed republish never stops the
//! remaining actuators of the same device.

use crate::health::HealthFlag;
use crate::protocol::{HardwareAddress, TopicSchema};
use crate::storage::Store;
use crate::transport::CommandPublisher;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Reconciler {
    store: Arc<dyn Store>,
    publisher: Arc<dyn CommandPublisher>,
    schema: TopicSchema,
    storage_health: Arc<HealthFlag>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn CommandPublisher>,
        schema: TopicSchema,
        storage_health: Arc<HealthFlag>,
    ) -> Self {
        Self {
            store,
            publisher,
            schema,
            storage_health,
        }
    }

    /// Republish every persisted actuator state for one device.
    ///
    /// Never returns an error: a storage failure skips the run (the next
    /// online transition retries), a publish failure skips that actuator.
    pub async fn reconcile(&self, addr: &HardwareAddress) {
        let states = match self.store.actuator_states(addr).await {
            Ok(states) => {
                self.storage_health.restore();
                states
            }
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                return;
            }
        };

        if states.is_empty() {
            debug!(device = %addr, "no actuator state to reconcile");
            return;
        }

        let mut sent = 0usize;
        for state in &states {
            let topic = self.schema.command_topic(addr, &state.kind);
            match self
                .publisher
                .publish(&topic, state.value.as_bytes(), QoS::AtLeastOnce, false)
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(
                        device = %addr,
                        kind = %state.kind,
                        error = %e,
                        "reconciliation republish failed, skipping actuator"
                    );
                }
            }
        }

        info!(
            device = %addr,
            actuators = states.len(),
            sent,
            "reconciled actuator state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ActuatorState, MemoryStore};
    use crate::testing::mocks::MockPublisher;
    use chrono::Utc;

    fn addr() -> HardwareAddress {
        HardwareAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn state(kind: &str, value: &str) -> ActuatorState {
        ActuatorState {
            addr: addr(),
            kind: kind.to_string(),
            value: value.to_string(),
            updated_at: Utc::now(),
        }
    }

    fn reconciler(
        store: Arc<MemoryStore>,
        publisher: Arc<MockPublisher>,
    ) -> Reconciler {
        Reconciler::new(
            store,
            publisher,
            TopicSchema::new("ns"),
            Arc::new(HealthFlag::new("storage")),
        )
    }

    #[tokio::test]
    async fn test_republishes_every_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_actuator_state(state("led_azul", "ON")).await.unwrap();
        store.upsert_actuator_state(state("bomba", "OFF")).await.unwrap();
        let publisher = Arc::new(MockPublisher::new());

        reconciler(store, publisher.clone()).reconcile(&addr()).await;

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        let topics: Vec<&str> = published.iter().map(|m| m.topic.as_str()).collect();
        assert!(topics.contains(&"ns/actuators/AA:BB:CC:DD:EE:FF/led_azul"));
        assert!(topics.contains(&"ns/actuators/AA:BB:CC:DD:EE:FF/bomba"));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_actuator_state(state("led_azul", "ON")).await.unwrap();
        let publisher = Arc::new(MockPublisher::new());
        let reconciler = reconciler(store, publisher.clone());

        reconciler.reconcile(&addr()).await;
        reconciler.reconcile(&addr()).await;

        // Same publish both times, redundant but harmless.
        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, published[1].topic);
        assert_eq!(published[0].payload, published[1].payload);
    }

    #[tokio::test]
    async fn test_no_state_publishes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MockPublisher::new());

        reconciler(store, publisher.clone()).reconcile(&addr()).await;

        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_abort_the_run() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_actuator_state(state("led_azul", "ON")).await.unwrap();
        store.upsert_actuator_state(state("bomba", "OFF")).await.unwrap();
        let publisher = Arc::new(MockPublisher::new());
        publisher.fail_publishes(true);

        // Completes despite every publish failing.
        reconciler(store, publisher.clone()).reconcile(&addr()).await;

        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_flips_health_and_skips() {
        let store = Arc::new(crate::testing::mocks::FlakyStore::new());
        store.fail_everything(true);
        let publisher = Arc::new(MockPublisher::new());
        let health = Arc::new(HealthFlag::new("storage"));
        let reconciler = Reconciler::new(
            store,
            publisher.clone(),
            TopicSchema::new("ns"),
            health.clone(),
        );

        reconciler.reconcile(&addr()).await;

        assert!(health.is_degraded());
        assert!(publisher.published().is_empty());
    }
}
