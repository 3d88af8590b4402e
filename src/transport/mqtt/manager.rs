//! Broker connection manager
//!
//! Owns the MQTT session and all of its mutable state. Nothing here ever
//! propagates a fatal error: a failed connect records the failure and
//! returns, a publish without a live session is dropped with a diagnostic.
//!
//! Retry model: the event-loop task exits on any transport loss, and a
//! supervisory tick (fixed interval, no backoff) re-invokes `connect()`
//! whenever the state is not `Connected`. Connect attempts are mutually
//! excluded, never queued. On every transition into `Connected` the manager
//! re-issues all configured subscriptions and emits [`BrokerEvent::Connected`]
//! so the liveness tracker can re-arm reconciliation.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError};
use crate::config::MqttSection;
use crate::health::{Health, HealthFlag};
use crate::transport::CommandPublisher;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Events surfaced to the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Session (re)established; subscriptions have been re-issued.
    Connected,
    /// Inbound publish on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
}

/// Snapshot of connection diagnostics, the only externally visible error
/// signal of the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticInfo {
    pub client_id: String,
    pub broker_url: String,
    pub state: ConnectionState,
    pub broker_health: Health,
    pub last_error: Option<String>,
    pub last_dropped_publish: Option<String>,
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_error: Option<String>,
    last_dropped_publish: Option<String>,
}

#[derive(Default)]
struct Session {
    client: Option<AsyncClient>,
    loop_handle: Option<JoinHandle<()>>,
}

pub struct ConnectionManager {
    config: MqttSection,
    subscriptions: Vec<String>,
    events: mpsc::Sender<BrokerEvent>,
    session: Mutex<Session>,
    /// Held for the duration of a connect attempt; `try_lock` makes a
    /// concurrent attempt a no-op instead of queueing it.
    connect_gate: Mutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    diagnostics: std::sync::Mutex<Diagnostics>,
    health: HealthFlag,
}

impl ConnectionManager {
    pub fn new(
        config: MqttSection,
        subscriptions: Vec<String>,
        events: mpsc::Sender<BrokerEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            subscriptions,
            events,
            session: Mutex::new(Session::default()),
            connect_gate: Mutex::new(()),
            state_tx,
            shutdown_tx,
            diagnostics: std::sync::Mutex::new(Diagnostics::default()),
            health: HealthFlag::new("mqtt"),
        }
    }

    /// Attempt to establish a broker session.
    ///
    /// Never returns an error: failures are recorded in the diagnostics and
    /// retried by the next supervisory tick. A call while another attempt is
    /// in flight returns immediately.
    pub async fn connect(self: &Arc<Self>) {
        let Ok(_gate) = self.connect_gate.try_lock() else {
            debug!("connect attempt already in progress");
            return;
        };
        if self.is_connected() || *self.shutdown_tx.borrow() {
            return;
        }

        self.set_state(ConnectionState::Connecting);
        let options = match configure_mqtt_options(&self.config) {
            Ok(options) => options,
            Err(e) => {
                self.record_failure(&e.to_string());
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        let (client, event_loop) = AsyncClient::new(options, 64);
        // The client must be in place before the loop task runs: a fast
        // ConnAck triggers resubscription through the session.
        {
            let mut session = self.session.lock().await;
            if let Some(stale) = session.loop_handle.take() {
                stale.abort();
            }
            session.client = Some(client);
        }
        let handle = tokio::spawn(Self::drive_event_loop(Arc::clone(self), event_loop));
        self.session.lock().await.loop_handle = Some(handle);

        // Wait for the broker acknowledgment; the event-loop task flips the
        // state. Timeouts are abandoned, not retried here.
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        if !self.await_connected(timeout).await && self.state() == ConnectionState::Connecting {
            self.record_failure("timed out waiting for broker acknowledgment");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    async fn await_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        tokio::time::timeout(timeout, async move {
            loop {
                match *rx.borrow_and_update() {
                    ConnectionState::Connected => return true,
                    ConnectionState::Disconnected => return false,
                    ConnectionState::Connecting => {}
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await
        .unwrap_or(false)
    }

    /// Poll the rumqttc event loop until shutdown or transport loss. On loss
    /// the task exits; the supervisory tick is the sole retry mechanism.
    async fn drive_event_loop(manager: Arc<Self>, mut event_loop: EventLoop) {
        let mut shutdown_rx = manager.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        manager.on_session_established().await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = String::from_utf8_lossy(&publish.topic).to_string();
                        let message = BrokerEvent::Message {
                            topic,
                            payload: publish.payload.to_vec(),
                        };
                        if manager.events.send(message).await.is_err() {
                            warn!("message dispatcher gone, stopping event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect(_))) => {
                        manager.on_connection_loss("broker sent disconnect");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        manager.on_connection_loss(&e.to_string());
                        break;
                    }
                }
            }
        }
    }

    async fn on_session_established(&self) {
        {
            let mut diag = self.diagnostics.lock().expect("diagnostics lock poisoned");
            diag.last_error = None;
        }
        self.set_state(ConnectionState::Connected);
        self.health.restore();
        self.resubscribe().await;
        let _ = self.events.send(BrokerEvent::Connected).await;
    }

    async fn resubscribe(&self) {
        let client = self.session.lock().await.client.clone();
        let Some(client) = client else { return };
        for topic in &self.subscriptions {
            match client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                Ok(()) => debug!(topic = %topic, "subscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "subscription failed"),
            }
        }
    }

    fn on_connection_loss(&self, reason: &str) {
        self.record_failure(reason);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Record a transport failure. The health flag keeps the log output to
    /// one line per outage no matter how many attempts fail.
    fn record_failure(&self, reason: &str) {
        {
            let mut diag = self.diagnostics.lock().expect("diagnostics lock poisoned");
            diag.last_error = Some(reason.to_string());
        }
        self.health.degrade(reason);
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev == next {
            return;
        }
        match next {
            ConnectionState::Connected => info!(client_id = %self.config.client_id, "broker session established"),
            _ => debug!(from = ?prev, to = ?next, "connection state changed"),
        }
    }

    /// Best-effort publish. With no live session the message is dropped and
    /// the reason recorded; the individual message is never queued or
    /// retried.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        if !self.is_connected() {
            self.note_dropped_publish(topic);
            return Ok(());
        }
        let client = self.session.lock().await.client.clone();
        let Some(client) = client else {
            self.note_dropped_publish(topic);
            return Ok(());
        };
        client
            .publish(topic, qos, retain, payload.to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(e.to_string()))
    }

    fn note_dropped_publish(&self, topic: &str) {
        let reason = format!("no live broker session, dropped publish to {topic}");
        debug!("{reason}");
        let mut diag = self.diagnostics.lock().expect("diagnostics lock poisoned");
        diag.last_dropped_publish = Some(reason);
    }

    pub fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn diagnostic_info(&self) -> DiagnosticInfo {
        let diag = self.diagnostics.lock().expect("diagnostics lock poisoned");
        DiagnosticInfo {
            client_id: self.config.client_id.clone(),
            broker_url: self.config.broker_url.clone(),
            state: self.state(),
            broker_health: self.health.current(),
            last_error: diag.last_error.clone(),
            last_dropped_publish: diag.last_dropped_publish.clone(),
        }
    }

    /// Spawn the supervisory tick: every `retry_interval_secs` it re-invokes
    /// `connect()` unless the session is already up.
    pub fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut shutdown_rx = manager.shutdown_tx.subscribe();
            let mut tick =
                tokio::time::interval(Duration::from_secs(manager.config.retry_interval_secs));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if !manager.is_connected() {
                            manager.connect().await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Graceful shutdown: best-effort broker disconnect, then stop the
    /// event-loop task. Failures here are logged, not retried.
    pub async fn shutdown(&self) {
        {
            let session = self.session.lock().await;
            if let Some(client) = &session.client {
                if let Err(e) = client.disconnect().await {
                    debug!(error = %e, "disconnect request failed during shutdown");
                }
            }
        }
        let _ = self.shutdown_tx.send(true);

        let mut session = self.session.lock().await;
        if let Some(handle) = session.loop_handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
        session.client = None;
        self.set_state(ConnectionState::Disconnected);
        info!("broker session closed");
    }
}

#[async_trait]
impl CommandPublisher for ConnectionManager {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        ConnectionManager::publish(self, topic, payload, qos, retain).await
    }

    fn is_connected(&self) -> bool {
        ConnectionManager::is_connected(self)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(handle) = session.loop_handle.take() {
                handle.abort();
            }
        }
    }
}
