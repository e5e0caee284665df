//! In-process loopback broker for host builds.
//!
//! Implements [`BrokerConnector`] without any networking: sessions live in a
//! shared table, publishes are recorded and delivered synchronously to every
//! session subscribed to the exact topic.  Tests drive failure modes through
//! the control methods (`set_online`, `require_credentials`, `reject_topic`,
//! `drop_connections`, `restore_connections`).
//!
//! Link events are always fired with the broker table unlocked, because the
//! connection reacts to `connected` by calling back into `subscribe`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use super::{BrokerClient, BrokerConnector, BrokerError, ConnectionConfig, LinkEvents, QoS};
use crate::error::ConnectionError;

/// One message as seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub client_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

struct Session {
    id: u64,
    client_id: String,
    events: LinkEvents,
    subscriptions: Vec<String>,
    connected: bool,
}

struct BrokerTable {
    online: bool,
    credentials: Option<(String, String)>,
    rejected_topics: Vec<String>,
    sessions: Vec<Session>,
    log: Vec<PublishedMessage>,
    next_session: u64,
}

/// Shared handle to the loopback broker.  Clones refer to the same broker.
#[derive(Clone)]
pub struct LoopbackBroker {
    table: Arc<Mutex<BrokerTable>>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(BrokerTable {
                online: true,
                credentials: None,
                rejected_topics: Vec::new(),
                sessions: Vec::new(),
                log: Vec::new(),
                next_session: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While offline, `open` fails with a handshake error.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Only accept sessions presenting exactly these credentials.
    pub fn require_credentials(&self, username: &str, password: &str) {
        self.lock().credentials = Some((username.to_owned(), password.to_owned()));
    }

    /// Refuse subscriptions to `topic`.
    pub fn reject_topic(&self, topic: &str) {
        self.lock().rejected_topics.push(topic.to_owned());
    }

    /// Every message published so far, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().log.clone()
    }

    /// Payloads published on `topic`, oldest first.
    pub fn payloads_on(&self, topic: &str) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload_str().to_owned())
            .collect()
    }

    /// Client ids of every session ever opened.
    pub fn client_ids(&self) -> Vec<String> {
        self.lock().sessions.iter().map(|s| s.client_id.clone()).collect()
    }

    /// Publish from an external client (not recorded as one of ours).
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let targets = self.lock().subscribers_of(topic);
        for events in targets {
            events.message(topic, payload);
        }
    }

    /// Drop every live session, as a broker restart or network loss would.
    pub fn drop_connections(&self) {
        let targets: Vec<LinkEvents> = {
            let mut t = self.lock();
            t.sessions
                .iter_mut()
                .filter(|s| s.connected)
                .map(|s| {
                    s.connected = false;
                    s.subscriptions.clear();
                    s.events.clone()
                })
                .collect()
        };
        for events in targets {
            events.disconnected();
        }
    }

    /// Bring dropped sessions back, as a transport-level reconnect would.
    pub fn restore_connections(&self) {
        let targets: Vec<LinkEvents> = {
            let mut t = self.lock();
            t.sessions
                .iter_mut()
                .filter(|s| !s.connected)
                .map(|s| {
                    s.connected = true;
                    s.events.clone()
                })
                .collect()
        };
        for events in targets {
            events.connected();
        }
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerTable {
    fn session_mut(&mut self, id: u64) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn subscribers_of(&self, topic: &str) -> Vec<LinkEvents> {
        self.sessions
            .iter()
            .filter(|s| s.connected && s.subscriptions.iter().any(|t| t == topic))
            .map(|s| s.events.clone())
            .collect()
    }
}

impl BrokerConnector for LoopbackBroker {
    type Client = LoopbackClient;

    fn open(
        &mut self,
        config: &ConnectionConfig,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<LoopbackClient, ConnectionError> {
        let session = {
            let mut t = self.lock();
            if !t.online {
                return Err(ConnectionError::Handshake);
            }
            if let Some((user, pass)) = &t.credentials {
                let presented = config
                    .credentials
                    .as_ref()
                    .map(|c| (c.username.as_str(), c.password.as_str()));
                if presented != Some((user.as_str(), pass.as_str())) {
                    return Err(ConnectionError::Authentication);
                }
            }
            let id = t.next_session;
            t.next_session += 1;
            t.sessions.push(Session {
                id,
                client_id: client_id.to_owned(),
                events: events.clone(),
                subscriptions: Vec::new(),
                connected: true,
            });
            id
        };
        info!("Loopback: session {} opened for '{}'", session, client_id);

        // Report the link before `open` returns, like a fast CONNACK.
        events.connected();

        Ok(LoopbackClient {
            broker: self.clone(),
            session,
        })
    }
}

/// Client handle for one loopback session.
pub struct LoopbackClient {
    broker: LoopbackBroker,
    session: u64,
}

impl BrokerClient for LoopbackClient {
    fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), BrokerError> {
        let mut t = self.broker.lock();
        if t.rejected_topics.iter().any(|r| r == topic) {
            return Err(BrokerError::Rejected);
        }
        let session = t.session_mut(self.session).ok_or(BrokerError::NotConnected)?;
        if !session.connected {
            return Err(BrokerError::NotConnected);
        }
        if !session.subscriptions.iter().any(|s| s == topic) {
            session.subscriptions.push(topic.to_owned());
        }
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let targets = {
            let mut t = self.broker.lock();
            let session = t.session_mut(self.session).ok_or(BrokerError::NotConnected)?;
            if !session.connected {
                return Err(BrokerError::NotConnected);
            }
            let client_id = session.client_id.clone();
            t.log.push(PublishedMessage {
                client_id,
                topic: topic.to_owned(),
                payload: payload.to_vec(),
                qos,
                retain,
            });
            t.subscribers_of(topic)
        };
        for events in targets {
            events.message(topic, payload);
        }
        Ok(())
    }
}
