//! MQTT broker connection.
//!
//! [`BrokerConnection`] owns the link lifecycle and is the only component
//! that talks to the broker.  The actual MQTT client is behind the
//! [`BrokerConnector`] / [`BrokerClient`] ports so the lifecycle logic is
//! testable on the host.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"` with feature `espidf`**: [`esp_impl::EspMqttConnector`]
//!   wraps `esp_idf_svc::mqtt::client::EspMqttClient` over `mqtts://`.
//! - **all other targets**: [`loopback::LoopbackBroker`], an in-process
//!   broker used by the test-suite and simulations.
//!
//! ## Link lifecycle
//!
//! ```text
//!  connect() ──▶ Connecting ──(transport up)──▶ Connected ──(control topic
//!                    │                             │        subscribed)──▶ Ready
//!                    └──(open fails)──▶ Disconnected ◀──(transport down)──┘
//! ```
//!
//! Transport events (`connected`, `disconnected`, `message`) are delivered
//! through [`LinkEvents`] on the transport's own task, never on the control
//! thread.  Inbound messages are forwarded to a [`MessageHandler`], which
//! must only enqueue work.
//!
//! ## Lock order
//!
//! esp-mqtt holds its internal API lock while it runs the event callback,
//! and `publish` takes that same lock while the client mutex is held.  The
//! callback therefore never waits for the client mutex: it `try_lock`s, and
//! if the mutex is busy it leaves a resubscribe pending.  The pending
//! subscribe is finished by whoever holds the mutex next (`publish`,
//! `subscribe`) or by [`BrokerConnection::poll`] on the control thread.
//!
//! ## Reconnection policy
//!
//! The core never retries a failed `connect()`.  If the transport itself
//! re-establishes a dropped link, it is accepted only when
//! [`ConnectionConfig::auto_reconnect`] is set; otherwise the connection
//! stays `Disconnected` for good.

#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub mod esp_impl;
#[cfg(not(target_os = "espidf"))]
pub mod loopback;

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::ports::{MessageHandler, Publisher};
use crate::error::{ConnectionError, PublishError, SubscriptionError};

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// How the broker's certificate is checked during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Accept any certificate, including self-signed and untrusted chains.
    ///
    /// The link is still encrypted but the peer is not authenticated, so a
    /// man-in-the-middle cannot be detected.  Only for constrained or lab
    /// deployments.
    AcceptAny,
    /// Validate the broker chain against this PEM-encoded CA certificate.
    PinnedCa { ca_pem: String },
    /// Validate against the platform's built-in CA bundle.
    CertificateBundle,
}

/// Opaque broker credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Broker endpoint and session settings.  Read-only once handed to
/// [`BrokerConnection::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// A random suffix is appended on every connect: `<prefix>-<uuid>`.
    pub client_id_prefix: String,
    pub credentials: Option<Credentials>,
    pub tls: TlsPolicy,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
    /// Accept transport-level reconnects after the link drops.
    pub auto_reconnect: bool,
    /// Delay between transport reconnect attempts (when enabled).
    pub reconnect_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8883,
            client_id_prefix: "conveyor".into(),
            credentials: None,
            tls: TlsPolicy::AcceptAny,
            clean_session: true,
            keep_alive_secs: 30,
            auto_reconnect: false,
            reconnect_timeout_ms: 10_000,
        }
    }
}

const PEM_CERT_HEADER: &str = "-----BEGIN CERTIFICATE-----";

impl ConnectionConfig {
    /// `mqtts://host:port` — the transport is always TLS.
    pub fn broker_url(&self) -> String {
        format!("mqtts://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.is_empty() || self.host.contains(char::is_whitespace) {
            return Err(ConnectionError::InvalidConfig("host must be a non-empty hostname"));
        }
        if self.port == 0 {
            return Err(ConnectionError::InvalidConfig("port must be non-zero"));
        }
        if let Some(c) = &self.credentials {
            if c.username.is_empty() {
                return Err(ConnectionError::InvalidConfig("username must not be empty"));
            }
        }
        if let TlsPolicy::PinnedCa { ca_pem } = &self.tls {
            if !ca_pem.contains(PEM_CERT_HEADER) {
                return Err(ConnectionError::Security("pinned CA is not a PEM certificate"));
            }
        }
        Ok(())
    }
}

/// `<prefix>-<32 hex digits>`, fresh on every call.
pub fn unique_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple();
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}-{suffix}")
    }
}

// ───────────────────────────────────────────────────────────────
// Transport ports
// ───────────────────────────────────────────────────────────────

/// Error reported by a transport client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    NotConnected,
    Rejected,
    Io,
}

impl From<BrokerError> for PublishError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::NotConnected => Self::NotConnected,
            BrokerError::Rejected => Self::Rejected,
            BrokerError::Io => Self::Transport,
        }
    }
}

impl From<BrokerError> for SubscriptionError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::NotConnected => Self::NotConnected,
            BrokerError::Rejected => Self::Rejected,
            BrokerError::Io => Self::Transport,
        }
    }
}

/// A live MQTT client handle.  Methods must not block on the network: they
/// queue the request in the client's outbox and return.
pub trait BrokerClient: Send {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), BrokerError>;

    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: &[u8])
    -> Result<(), BrokerError>;
}

/// Factory that opens a transport session.
///
/// `open` starts the session and returns the client handle.  Link events are
/// reported later (or immediately, from inside `open`) through `events`.
pub trait BrokerConnector {
    type Client: BrokerClient + 'static;

    fn open(
        &mut self,
        config: &ConnectionConfig,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<Self::Client, ConnectionError>;
}

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    /// Transport up, control subscription not yet confirmed.
    Connected = 2,
    /// Subscribed to the control topic; fully operational.
    Ready = 3,
}

impl LinkState {
    fn from_raw(raw: u32) -> Self {
        match raw & LINK_STATE_MASK {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Ready,
            _ => Self::Disconnected,
        }
    }

    /// Whether publish/subscribe requests can be issued.
    pub fn is_up(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }
}

/// Low byte of the shared link word holds the [`LinkState`]; the rest is an
/// epoch bumped on every link-up, so a subscribe that raced a relink cannot
/// mark the new link ready.
const LINK_STATE_MASK: u32 = 0xff;

/// Receiver side of transport events, implemented by the connection.
trait LinkSink: Send + Sync {
    fn connected(&self);
    fn disconnected(&self);
    fn message(&self, topic: &str, payload: &[u8]);
}

/// Handle given to a transport for reporting link events.  Cheap to clone;
/// safe to call from any thread.
#[derive(Clone)]
pub struct LinkEvents {
    sink: Arc<dyn LinkSink>,
}

impl LinkEvents {
    /// The transport session is established.
    pub fn connected(&self) {
        self.sink.connected();
    }

    /// The transport session dropped.
    pub fn disconnected(&self) {
        self.sink.disconnected();
    }

    /// A message arrived on a subscribed topic.
    pub fn message(&self, topic: &str, payload: &[u8]) {
        self.sink.message(topic, payload);
    }
}

/// State shared between the owning [`BrokerConnection`] and the transport's
/// callback task.
struct LinkShared<C> {
    /// `epoch << 8 | LinkState`.
    link: AtomicU32,
    /// Set once the first session dropped.
    dropped_once: AtomicBool,
    /// Link came up but the control subscription has not been issued yet.
    resubscribe_pending: AtomicBool,
    allow_relink: bool,
    client: Mutex<Option<C>>,
    control_topic: String,
    handler: Arc<dyn MessageHandler>,
}

impl<C: BrokerClient> LinkShared<C> {
    fn state(&self) -> LinkState {
        LinkState::from_raw(self.link.load(Ordering::Acquire))
    }

    /// Change the state, keeping the epoch.
    fn set_state(&self, s: LinkState) {
        let _ = self.link.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            Some((raw & !LINK_STATE_MASK) | s as u32)
        });
    }

    /// New link: bump the epoch and enter `Connected`.
    fn begin_link(&self) {
        let _ = self.link.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            let epoch = (raw >> 8).wrapping_add(1);
            Some((epoch << 8) | LinkState::Connected as u32)
        });
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<C>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the client returned by `open` and finish the handshake if the
    /// transport already reported the link up.
    fn install(&self, client: C) {
        let mut guard = self.lock_client();
        *guard = Some(client);
        self.subscribe_control(&mut guard);
    }

    /// `Connected → Ready` once the control topic is subscribed.  Runs under
    /// the client lock so only one path issues a pending subscribe.
    fn subscribe_control(&self, guard: &mut MutexGuard<'_, Option<C>>) {
        let link = self.link.load(Ordering::Acquire);
        if LinkState::from_raw(link) != LinkState::Connected
            || !self.resubscribe_pending.load(Ordering::Acquire)
        {
            return;
        }
        let Some(client) = guard.as_mut() else {
            return;
        };
        self.resubscribe_pending.store(false, Ordering::Release);
        let result = client.subscribe(&self.control_topic, QoS::ExactlyOnce);

        // A drop or relink while subscribing leaves a link that needs its
        // own subscribe; only the link this call saw may become Ready.
        let ready = (link & !LINK_STATE_MASK) | LinkState::Ready as u32;
        let settled = match result {
            Ok(()) => self
                .link
                .compare_exchange(link, ready, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            Err(e) => {
                let e = SubscriptionError::from(e);
                error!("MQTT: control subscription to '{}' failed — {}", self.control_topic, e);
                self.link.load(Ordering::Acquire) == link
            }
        };
        if !settled {
            self.resubscribe_pending.store(true, Ordering::Release);
            debug!("MQTT: link changed during control subscribe");
        } else if result.is_ok() {
            info!("MQTT: subscribed to '{}', link ready", self.control_topic);
        }
    }
}

impl<C: BrokerClient> LinkSink for LinkShared<C> {
    fn connected(&self) {
        if self.dropped_once.load(Ordering::Acquire) && !self.allow_relink {
            warn!("MQTT: transport re-linked but auto_reconnect is off; staying disconnected");
            return;
        }
        info!("MQTT: connected to broker");
        self.begin_link();
        self.resubscribe_pending.store(true, Ordering::Release);
        let mut guard = match self.client.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("MQTT: client busy, control subscription deferred");
                return;
            }
        };
        self.subscribe_control(&mut guard);
    }

    fn disconnected(&self) {
        self.dropped_once.store(true, Ordering::Release);
        self.resubscribe_pending.store(false, Ordering::Release);
        if self.state() != LinkState::Disconnected {
            warn!("MQTT: disconnected from broker");
        }
        self.set_state(LinkState::Disconnected);
    }

    fn message(&self, topic: &str, payload: &[u8]) {
        debug!(
            "MQTT: raw '{}' on '{}' (len={})",
            String::from_utf8_lossy(payload),
            topic,
            payload.len()
        );
        self.handler.on_message(topic, payload);
    }
}

// ───────────────────────────────────────────────────────────────
// BrokerConnection
// ───────────────────────────────────────────────────────────────

/// An open broker session.
///
/// Shared as `Arc<BrokerConnection<_>>` between the control loop (status
/// publishes) and sensor zones; every method takes `&self`.
pub struct BrokerConnection<C> {
    shared: Arc<LinkShared<C>>,
    client_id: String,
    config: ConnectionConfig,
}

impl<C: BrokerClient + 'static> BrokerConnection<C> {
    /// Open a session and subscribe to `control_topic` as soon as the link
    /// is up.  Inbound messages go to `handler` on the transport's task.
    ///
    /// Fails without retrying; the caller owns the retry policy.
    pub fn connect<K>(
        connector: &mut K,
        config: ConnectionConfig,
        control_topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, ConnectionError>
    where
        K: BrokerConnector<Client = C>,
    {
        if let Err(e) = config.validate() {
            error!("MQTT: refusing to connect — {}", e);
            return Err(e);
        }
        if config.tls == TlsPolicy::AcceptAny {
            warn!("MQTT: certificate validation disabled; broker identity is not verified");
        }

        let client_id = unique_client_id(&config.client_id_prefix);
        let shared = Arc::new(LinkShared {
            link: AtomicU32::new(LinkState::Connecting as u32),
            dropped_once: AtomicBool::new(false),
            resubscribe_pending: AtomicBool::new(false),
            allow_relink: config.auto_reconnect,
            client: Mutex::new(None),
            control_topic: control_topic.to_owned(),
            handler,
        });

        info!("MQTT: connecting to {} as '{}'", config.broker_url(), client_id);
        let sink: Arc<dyn LinkSink> = shared.clone();
        let client = match connector.open(&config, &client_id, LinkEvents { sink }) {
            Ok(c) => c,
            Err(e) => {
                shared.set_state(LinkState::Disconnected);
                error!("MQTT: connect to {} failed — {}", config.broker_url(), e);
                return Err(e);
            }
        };
        shared.install(client);

        Ok(Self {
            shared,
            client_id,
            config,
        })
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn control_topic(&self) -> &str {
        &self.shared.control_topic
    }

    /// Issue a control subscription the transport task had to defer.
    /// Cheap when nothing is pending; call once per control tick.
    pub fn poll(&self) {
        if !self.shared.resubscribe_pending.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.shared.lock_client();
        self.shared.subscribe_control(&mut guard);
    }

    /// Subscribe to an additional topic.  Inbound messages on it reach the
    /// same handler as the control topic.
    pub fn subscribe(&self, topic: &str) -> Result<(), SubscriptionError> {
        if !self.state().is_up() {
            warn!("MQTT: cannot subscribe to '{}' — not connected", topic);
            return Err(SubscriptionError::NotConnected);
        }
        let mut guard = self.shared.lock_client();
        self.shared.subscribe_control(&mut guard);
        let client = guard.as_mut().ok_or(SubscriptionError::NotConnected)?;
        client.subscribe(topic, QoS::ExactlyOnce).map_err(|e| {
            let e = SubscriptionError::from(e);
            warn!("MQTT: subscribe to '{}' failed — {}", topic, e);
            e
        })?;
        info!("MQTT: subscribed to '{}'", topic);
        Ok(())
    }

    /// Publish with QoS 2, retain off.  A down link is reported, not fatal.
    pub fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.state().is_up() {
            warn!("MQTT: client not connected, cannot publish to '{}'", topic);
            return Err(PublishError::NotConnected);
        }
        let mut guard = self.shared.lock_client();
        self.shared.subscribe_control(&mut guard);
        let client = guard.as_mut().ok_or(PublishError::NotConnected)?;
        client
            .publish(topic, QoS::ExactlyOnce, false, payload.as_bytes())
            .map_err(|e| {
                let e = PublishError::from(e);
                warn!("MQTT: publish to '{}' failed — {}", topic, e);
                e
            })?;
        info!("MQTT: published {} -> {}", topic, payload);
        Ok(())
    }
}

impl<C: BrokerClient + 'static> Publisher for BrokerConnection<C> {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        BrokerConnection::publish(self, topic, payload)
    }

    fn is_connected(&self) -> bool {
        self.state().is_up()
    }

    fn poll(&self) {
        BrokerConnection::poll(self);
    }
}
