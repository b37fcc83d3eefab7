use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Result;

pub mod memory;

pub use self::memory::{MemoryBroker, MemoryBrokerBuilder, MemoryConnection, DEFAULT_MAX_PAYLOAD};

/// A message delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    /// Sender-specified address the answer should be published to
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

/// Identifies one subscription on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// Deliveries for one subscription
///
/// `Ok` items are messages. An `Err` item is a fatal fault reported by the
/// transport out of band. The stream ends once the subscription is removed
/// or its connection closes.
pub struct Subscription {
    id: SubscriptionId,
    subject: String,
    receiver: mpsc::UnboundedReceiver<Result<Message>>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        subject: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Result<Message>>,
    ) -> Self {
        Self {
            id,
            subject: subject.into(),
            receiver,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next delivery
    pub async fn next(&mut self) -> Option<Result<Message>> {
        self.receiver.recv().await
    }
}

/// One connection to a publish/subscribe broker
///
/// Methods take `&self` so a single connection can be shared between the
/// tasks answering messages concurrently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload, optionally naming a reply address
    async fn publish_message(
        &self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<()>;

    /// Publish a payload without a reply address
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        self.publish_message(subject, None, payload).await
    }

    /// Publish on `subject` and wait for exactly one reply
    ///
    /// Fails with [`crate::Error::Timeout`] if nothing arrives within `timeout`.
    async fn request(&self, subject: &str, payload: &[u8], timeout: Duration) -> Result<Message>;

    /// Subscribe to `subject`, optionally as a member of a queue group
    async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<Subscription>;

    /// Remove a subscription made on this connection
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Whether the connection can still be used
    fn is_connected(&self) -> bool;

    /// Close the connection, dropping all of its subscriptions
    async fn close(&self) -> Result<()>;
}

/// Opens connections to one broker address
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}
