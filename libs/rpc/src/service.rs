use std::future::Future;
use std::sync::Arc;

use constellation_fabric::Connector;
use futures::future::join_all;
use tracing::{error, info};

use crate::config::RpcConfig;
use crate::dispatch::DispatchTable;
use crate::error::{Error, Result};
use crate::listener::Listener;
use crate::responder::Responder;

/// A set of methods served over one transport
///
/// Each registered method gets its own [`Listener`] subscribed to the
/// subject of the same name. All listeners join the service's queue group,
/// so replicas of a service split the traffic between them.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use constellation_core::{Request, Response};
/// use constellation_fabric::MemoryBroker;
/// use constellation_rpc::{Client, RpcService};
///
/// # async fn example() -> constellation_rpc::Result<()> {
/// let broker = Arc::new(MemoryBroker::new());
/// let service = RpcService::new(broker.clone(), "greeter", |table| {
///     table.register("greet", |request: Request| async move {
///         let name = request.param("name")?.to_string();
///         Ok::<_, anyhow::Error>(Response::success(request.id, format!("Hello {name}")))
///     });
/// });
/// service.start().await?;
///
/// let client = Client::new(broker);
/// let response = client
///     .call(&Request::new("greet").with_id("1").with_param("name", "Ada"))
///     .await?;
/// assert_eq!(response.result(), Some("Hello Ada"));
///
/// service.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct RpcService {
    connector: Arc<dyn Connector>,
    queue_group: String,
    table: Arc<DispatchTable>,
    listeners: Vec<Listener>,
}

impl RpcService {
    /// Build a service from the methods `register` adds to a fresh table
    ///
    /// The set of subjects is fixed here; methods registered on the table
    /// later are served only if their subject already has a listener.
    pub fn new<F>(connector: Arc<dyn Connector>, queue_group: impl Into<String>, register: F) -> Self
    where
        F: FnOnce(&DispatchTable),
    {
        let queue_group = queue_group.into();
        let table = Arc::new(DispatchTable::new());
        register(&table);

        let responder: Arc<dyn Responder> = table.clone();
        let listeners = table
            .methods()
            .into_iter()
            .map(|method| {
                info!(subject = %method, queue_group = %queue_group, "Creating subscription");
                Listener::new(method, queue_group.clone(), Arc::clone(&responder))
            })
            .collect();

        Self {
            connector,
            queue_group,
            table,
            listeners,
        }
    }

    pub fn from_config<F>(connector: Arc<dyn Connector>, config: &RpcConfig, register: F) -> Self
    where
        F: FnOnce(&DispatchTable),
    {
        Self::new(connector, config.queue_group.clone(), register)
    }

    /// Bind and start every listener
    ///
    /// All listeners are attempted. If any of them fails, the whole group is
    /// disposed and the failures are returned together.
    pub async fn start(&self) -> Result<()> {
        let outcomes = join_all(self.listeners.iter().map(|listener| async move {
            listener.bind(Arc::clone(&self.connector)).await?;
            listener.start().await
        }))
        .await;

        let failures: Vec<(String, Error)> = self
            .listeners
            .iter()
            .zip(outcomes)
            .filter_map(|(listener, outcome)| {
                outcome.err().map(|e| (listener.subject().to_string(), e))
            })
            .collect();

        if failures.is_empty() {
            info!(
                queue_group = %self.queue_group,
                listeners = self.listeners.len(),
                "All listeners started"
            );
            return Ok(());
        }

        for (subject, e) in &failures {
            error!(subject = %subject, error = %e, "Failed to start listener");
        }
        self.stop().await;
        Err(Error::Start {
            total: self.listeners.len(),
            failures,
        })
    }

    /// Dispose every listener; safe to call repeatedly
    pub async fn stop(&self) {
        join_all(self.listeners.iter().map(Listener::dispose)).await;
        info!(queue_group = %self.queue_group, "All listeners stopped");
    }

    /// Whether every listener is still delivering messages
    pub async fn is_healthy(&self) -> bool {
        join_all(self.listeners.iter().map(Listener::is_running))
            .await
            .into_iter()
            .all(|running| running)
    }

    /// Start, serve until `shutdown` resolves, then stop
    pub async fn run_until<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }

    /// The table requests are dispatched through
    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    /// Subjects with a listener, sorted by name
    pub fn subjects(&self) -> Vec<&str> {
        self.listeners.iter().map(Listener::subject).collect()
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }
}
