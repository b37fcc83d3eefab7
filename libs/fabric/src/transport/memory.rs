use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{Connector, Message, Subscription, SubscriptionId, Transport};

/// Default maximum payload accepted by a broker (1 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Prefix of the per-request reply subjects
const INBOX_PREFIX: &str = "_INBOX.";

/// In-process publish/subscribe broker
///
/// Routes messages between connections of the same process with the
/// semantics the RPC layer relies on: queue-group load balancing,
/// sender-specified reply addresses and a maximum payload size.
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    max_payload: usize,
    routes: RwLock<HashMap<String, Vec<Route>>>,
    next_id: AtomicU64,
    open_connections: AtomicUsize,
    cursor: AtomicUsize,
    shut_down: AtomicBool,
}

struct Route {
    id: SubscriptionId,
    connection: u64,
    queue_group: Option<String>,
    sender: mpsc::UnboundedSender<Result<Message>>,
}

impl MemoryBroker {
    /// Create a broker with the default payload limit
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the broker
    pub fn builder() -> MemoryBrokerBuilder {
        MemoryBrokerBuilder::new()
    }

    /// Open a new connection
    pub fn connection(&self) -> Result<MemoryConnection> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(Error::Connect("broker has been shut down".to_string()));
        }
        self.inner.open_connections.fetch_add(1, Ordering::AcqRel);
        Ok(MemoryConnection {
            id: self.inner.next_id(),
            broker: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        })
    }

    pub fn max_payload(&self) -> usize {
        self.inner.max_payload
    }

    /// Number of connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::Acquire)
    }

    /// Number of live subscriptions on `subject`
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .routes
            .read()
            .get(subject)
            .map_or(0, |routes| routes.len())
    }

    /// Simulate losing the broker
    ///
    /// Every live subscription receives one fatal error and then ends.
    /// New connections are refused and existing ones report disconnected.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let routes = std::mem::take(&mut *self.inner.routes.write());
        for route in routes.into_values().flatten() {
            let _ = route.sender.send(Err(Error::ConnectionClosed));
        }
        debug!("Memory broker shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.connection()?))
    }
}

impl BrokerInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn check_subject(subject: &str) -> Result<()> {
        if subject.is_empty() || subject.chars().any(char::is_whitespace) {
            return Err(Error::InvalidSubject(subject.to_string()));
        }
        Ok(())
    }

    fn route(&self, subject: &str, reply_to: Option<&str>, payload: &[u8]) -> Result<()> {
        Self::check_subject(subject)?;
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let table = self.routes.read();
        let Some(routes) = table.get(subject) else {
            return Ok(());
        };

        let message = Message {
            subject: subject.to_string(),
            reply_to: reply_to.map(str::to_string),
            payload: payload.to_vec(),
        };

        let mut groups: HashMap<&str, Vec<&Route>> = HashMap::new();
        for route in routes {
            match &route.queue_group {
                Some(group) => groups.entry(group.as_str()).or_default().push(route),
                // A closed receiver just means the subscriber is going away
                None => {
                    let _ = route.sender.send(Ok(message.clone()));
                }
            }
        }
        for members in groups.values() {
            let pick = self.cursor.fetch_add(1, Ordering::Relaxed) % members.len();
            let _ = members[pick].sender.send(Ok(message.clone()));
        }
        Ok(())
    }

    fn add_route(
        &self,
        connection: u64,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription> {
        Self::check_subject(subject)?;
        if let Some(group) = queue_group {
            if group.is_empty() || group.chars().any(char::is_whitespace) {
                return Err(Error::InvalidSubject(group.to_string()));
            }
        }

        let id = SubscriptionId::new(self.next_id());
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes
            .write()
            .entry(subject.to_string())
            .or_default()
            .push(Route {
                id,
                connection,
                queue_group: queue_group.map(str::to_string),
                sender,
            });
        Ok(Subscription::new(id, subject, receiver))
    }

    fn remove_route(&self, connection: u64, id: SubscriptionId) {
        let mut routes = self.routes.write();
        routes.retain(|_, entries| {
            entries.retain(|r| !(r.connection == connection && r.id == id));
            !entries.is_empty()
        });
    }

    fn remove_connection(&self, connection: u64) {
        let mut routes = self.routes.write();
        routes.retain(|_, entries| {
            entries.retain(|r| r.connection != connection);
            !entries.is_empty()
        });
    }
}

/// A connection to a [`MemoryBroker`]
///
/// Closing (or dropping) the connection removes all of its subscriptions.
pub struct MemoryConnection {
    id: u64,
    broker: Arc<BrokerInner>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    fn release(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.broker.remove_connection(self.id);
        self.broker.open_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryConnection {
    async fn publish_message(
        &self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<()> {
        self.ensure_open()?;
        self.broker.route(subject, reply_to, payload)
    }

    async fn request(&self, subject: &str, payload: &[u8], timeout: Duration) -> Result<Message> {
        self.ensure_open()?;
        let inbox = format!("{}{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let mut replies = self.broker.add_route(self.id, &inbox, None)?;

        let outcome = match self.broker.route(subject, Some(&inbox), payload) {
            Ok(()) => tokio::time::timeout(timeout, replies.next()).await,
            Err(e) => {
                self.broker.remove_route(self.id, replies.id());
                return Err(e);
            }
        };
        self.broker.remove_route(self.id, replies.id());

        match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }

    async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<Subscription> {
        self.ensure_open()?;
        self.broker.add_route(self.id, subject, queue_group)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.ensure_open()?;
        self.broker.remove_route(self.id, id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.broker.shut_down.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builder for configuring a [`MemoryBroker`]
#[derive(Default)]
pub struct MemoryBrokerBuilder {
    max_payload: Option<usize>,
}

impl MemoryBrokerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest payload the broker accepts
    pub fn max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = Some(bytes);
        self
    }

    /// Build the broker
    pub fn build(self) -> MemoryBroker {
        MemoryBroker {
            inner: Arc::new(BrokerInner {
                max_payload: self.max_payload.unwrap_or(DEFAULT_MAX_PAYLOAD),
                routes: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                open_connections: AtomicUsize::new(0),
                cursor: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }
}
