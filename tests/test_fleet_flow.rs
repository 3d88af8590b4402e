//! End-to-end flow through the dispatch loop against mocked transport and
//! in-memory persistence: session establishment, heartbeat, reconciliation,
//! command, confirmation, telemetry.

use fleetbridge::config::LivenessSection;
use fleetbridge::gateway::CommandGateway;
use fleetbridge::health::HealthFlag;
use fleetbridge::liveness::LivenessTracker;
use fleetbridge::protocol::{HardwareAddress, TopicSchema};
use fleetbridge::reconcile::Reconciler;
use fleetbridge::routing::MessageDispatcher;
use fleetbridge::storage::{ActuatorState, DeliveryStatus, Device, MemoryStore, Store};
use fleetbridge::testing::mocks::MockPublisher;
use fleetbridge::transport::mqtt::BrokerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Harness {
    store: Arc<MemoryStore>,
    publisher: Arc<MockPublisher>,
    gateway: Arc<CommandGateway>,
    dispatcher: Arc<MessageDispatcher>,
}

fn addr() -> HardwareAddress {
    HardwareAddress::parse("7C:9E:BD:F1:DA:E4").unwrap()
}

fn harness() -> Harness {
    let schema = TopicSchema::new("damiot");
    let store = Arc::new(MemoryStore::new());
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
        publisher.clone(),
        schema.clone(),
        health.clone(),
    ));
    let dispatcher = Arc::new(MessageDispatcher::new(
        schema,
        liveness,
        gateway.clone(),
        store.clone(),
        health,
    ));
    Harness {
        store,
        publisher,
        gateway,
        dispatcher,
    }
}

fn message(topic: &str, payload: &[u8]) -> BrokerEvent {
    BrokerEvent::Message {
        topic: topic.to_string(),
        payload: payload.to_vec(),
    }
}

#[tokio::test]
async fn test_full_fleet_flow() {
    let h = harness();
    h.store
        .upsert_device(Device::new(addr(), "greenhouse node"))
        .await
        .unwrap();
    h.store
        .upsert_actuator_state(ActuatorState {
            addr: addr(),
            kind: "led_azul".to_string(),
            value: "ON".to_string(),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let (tx, rx) = mpsc::channel(32);
    let run = tokio::spawn(h.dispatcher.clone().run(rx));

    // Session comes up, then the device heartbeats: the persisted LED state
    // must be republished exactly once.
    tx.send(BrokerEvent::Connected).await.unwrap();
    tx.send(message("damiot/heartbeat/7C:9E:BD:F1:DA:E4", b"192.168.8.130"))
        .await
        .unwrap();
    tx.send(message(
        "damiot/sensores-invalid/7C:9E:BD:F1:DA:E4/x",
        b"junk",
    ))
    .await
    .unwrap();
    tx.send(message(
        "damiot/sensors/7C:9E:BD:F1:DA:E4/temperatura",
        b"21.5",
    ))
    .await
    .unwrap();
    tx.send(message(
        "damiot/actuators/7C:9E:BD:F1:DA:E4/led_azul/status",
        b"on",
    ))
    .await
    .unwrap();
    drop(tx);
    run.await.unwrap();

    // Device is online with its network address recorded.
    let device = h.store.device(&addr()).await.unwrap().unwrap();
    assert!(device.is_online());
    assert_eq!(device.network_addr.as_deref(), Some("192.168.8.130"));

    // Reconciliation republished the persisted actuator state.
    let published = h.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].topic,
        "damiot/actuators/7C:9E:BD:F1:DA:E4/led_azul"
    );
    assert_eq!(published[0].payload, b"ON");

    // The telemetry sample landed with its derived unit.
    let readings = h.store.readings(&addr()).await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].unit, "°C");

    // The confirmation updated the actuator state row.
    let states = h.store.actuator_states(&addr()).await.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].value, "ON");
}

#[tokio::test]
async fn test_command_then_confirmation() {
    let h = harness();
    h.store
        .upsert_device(Device::new(addr(), "greenhouse node"))
        .await
        .unwrap();

    let state = h
        .gateway
        .issue_command(&addr(), "bomba", "on")
        .await
        .unwrap();
    assert_eq!(state.value, "ON");
    assert_eq!(
        h.publisher.published()[0].topic,
        "damiot/actuators/7C:9E:BD:F1:DA:E4/bomba"
    );

    // The device confirms on its status topic.
    h.dispatcher
        .dispatch("damiot/actuators/7C:9E:BD:F1:DA:E4/bomba/status", b"ON")
        .await;

    let events = h.gateway.events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, DeliveryStatus::Confirmed);
    assert_eq!(events[0].response.as_deref(), Some("ON"));
}

#[tokio::test]
async fn test_command_while_disconnected_is_recorded_for_reconciliation() {
    let h = harness();
    h.store
        .upsert_device(Device::new(addr(), "greenhouse node"))
        .await
        .unwrap();
    h.publisher.set_connected(false);

    // The publish is silently dropped, but the desired state persists.
    let state = h
        .gateway
        .issue_command(&addr(), "led_azul", "ON")
        .await
        .unwrap();
    assert_eq!(state.value, "ON");
    assert!(h.publisher.published().is_empty());

    // Broker returns, device heartbeats after the session event: the
    // desired state is delivered by reconciliation.
    h.publisher.set_connected(true);
    let (tx, rx) = mpsc::channel(8);
    let run = tokio::spawn(h.dispatcher.clone().run(rx));
    tx.send(BrokerEvent::Connected).await.unwrap();
    tx.send(message("damiot/heartbeat/7C:9E:BD:F1:DA:E4", b"192.168.8.130"))
        .await
        .unwrap();
    drop(tx);
    run.await.unwrap();

    let published = h.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload, b"ON");
}
