use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use constellation_core::{Request, Response, RpcError};
use constellation_fabric::codec::{Codec, JsonCodec};
use constellation_fabric::{Channel, Connector, Message, Subscription, SubscriptionId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::responder::{catch_panic, Responder};

/// Subscription-backed responder for one subject
///
/// Hands every decoded request to its [`Responder`] and publishes the answer
/// to the reply address the sender supplied. A bad payload, a failing
/// responder or a refused reply never ends the subscription.
///
/// Lifecycle: unbound → bound ([`Listener::bind`]) → running
/// ([`Listener::start`]) → disposed ([`Listener::dispose`], terminal).
pub struct Listener {
    subject: String,
    queue_group: String,
    responder: Arc<dyn Responder>,
    disposed: Arc<AtomicBool>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    connector: Option<Arc<dyn Connector>>,
    channel: Option<Channel<JsonCodec>>,
    active: Option<Active>,
}

struct Active {
    id: SubscriptionId,
    pump: JoinHandle<()>,
}

impl Listener {
    pub fn new(
        subject: impl Into<String>,
        queue_group: impl Into<String>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            subject: subject.into(),
            queue_group: queue_group.into(),
            responder,
            disposed: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(State::default()),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// Attach the transport the listener connects through
    ///
    /// Rebinding drops the current connection; call [`Listener::start`] again afterwards.
    pub async fn bind(&self, connector: Arc<dyn Connector>) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed("Listener"));
        }
        let mut state = self.state.lock().await;
        if let Some(previous) = state.channel.take() {
            self.teardown(&mut state, &previous).await;
            if let Err(e) = previous.close().await {
                debug!(subject = %self.subject, error = %e, "Failed to close previous connection");
            }
        }
        state.connector = Some(connector);
        Ok(())
    }

    /// Subscribe and start answering requests
    ///
    /// Connects on first use. When already running, the current subscription
    /// is replaced by a fresh one.
    pub async fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed("Listener"));
        }
        let mut state = self.state.lock().await;
        // dispose() may have won the race for the lock
        if self.is_disposed() {
            return Err(Error::Disposed("Listener"));
        }

        let reusable = state
            .channel
            .as_ref()
            .filter(|channel| channel.transport().is_connected())
            .cloned();
        let channel = match reusable {
            Some(channel) => channel,
            None => {
                let connector = state
                    .connector
                    .clone()
                    .ok_or_else(|| Error::NotBound(self.subject.clone()))?;
                let channel = Channel::connect(connector.as_ref(), JsonCodec)
                    .await
                    .map_err(|source| Error::Listener {
                        subject: self.subject.clone(),
                        source,
                    })?;
                state.channel = Some(channel.clone());
                channel
            }
        };

        self.teardown(&mut state, &channel).await;

        let subscription = channel
            .transport()
            .subscribe(&self.subject, Some(&self.queue_group))
            .await
            .map_err(|source| Error::Listener {
                subject: self.subject.clone(),
                source,
            })?;

        let id = subscription.id();
        let context = Arc::new(MessageContext {
            subject: self.subject.clone(),
            channel,
            responder: Arc::clone(&self.responder),
            disposed: Arc::clone(&self.disposed),
        });
        let pump = tokio::spawn(pump(subscription, context));
        state.active = Some(Active { id, pump });

        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            subscription = %id,
            "Subscription started"
        );
        Ok(())
    }

    /// Whether a subscription is currently delivering messages
    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state
            .active
            .as_ref()
            .is_some_and(|active| !active.pump.is_finished())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Unsubscribe and disconnect
    ///
    /// Idempotent. Messages already being handled may still be answered or
    /// may be dropped; neither raises.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(channel) = state.channel.take() {
            self.teardown(&mut state, &channel).await;
            if let Err(e) = channel.close().await {
                debug!(subject = %self.subject, error = %e, "Failed to close connection");
            }
        } else if let Some(active) = state.active.take() {
            active.pump.abort();
        }
        state.connector = None;
        info!(subject = %self.subject, "Listener disposed");
    }

    /// Remove the active subscription, if any
    async fn teardown(&self, state: &mut State, channel: &Channel<JsonCodec>) {
        let Some(active) = state.active.take() else {
            return;
        };
        if let Err(e) = channel.transport().unsubscribe(active.id).await {
            debug!(subject = %self.subject, subscription = %active.id, error = %e, "Failed to unsubscribe");
        }
        active.pump.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.take() {
            active.pump.abort();
        }
    }
}

/// Everything a message task needs, shared between tasks
struct MessageContext {
    subject: String,
    channel: Channel<JsonCodec>,
    responder: Arc<dyn Responder>,
    disposed: Arc<AtomicBool>,
}

/// Drain a subscription, handing each message to its own task
async fn pump(mut subscription: Subscription, context: Arc<MessageContext>) {
    while let Some(delivery) = subscription.next().await {
        match delivery {
            Ok(message) => {
                let context = Arc::clone(&context);
                tokio::spawn(async move { context.handle(message).await });
            }
            Err(e) => {
                error!(subject = %context.subject, error = %e, "Fatal error in subscription");
            }
        }
    }
    debug!(subject = %context.subject, "Subscription closed");
}

impl MessageContext {
    async fn handle(&self, message: Message) {
        let response = self.respond(&message.payload).await;

        let Some(reply_to) = message.reply_to else {
            debug!(subject = %self.subject, "Message has no reply address, dropping response");
            return;
        };

        if let Err(e) = self.channel.publish(&reply_to, &response).await {
            if self.disposed.load(Ordering::Acquire) {
                debug!(subject = %self.subject, error = %e, "Reply dropped after disposal");
            } else {
                error!(subject = %self.subject, error = %e, "Error publishing reply");
            }
        }
    }

    async fn respond(&self, payload: &[u8]) -> Response {
        let request: Option<Request> = match self.channel.codec().decode(payload) {
            Ok(request) => request,
            Err(e) => return Response::failure(None, RpcError::internal(e.to_string())),
        };
        let id = request.as_ref().and_then(|r| r.id.clone());

        match catch_panic(self.responder.respond(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => Response::failure(id, RpcError::internal(e.to_string())),
            Err(panic) => Response::failure(id, RpcError::internal(panic)),
        }
    }
}
