use std::future::Future;
use std::sync::Arc;

use constellation_core::{Request, Response, RpcError};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::responder::{catch_panic, Responder};

/// Boxed future returned by a registered handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Response>>;

/// A registered method implementation
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// Registry mapping method names to handlers
///
/// Aggregates many method implementations behind one responder identity.
/// Lookups and registrations work on individual shards, so serving requests
/// never waits on a table-wide lock.
///
/// # Example
///
/// ```
/// use constellation_core::{Request, Response};
/// use constellation_rpc::DispatchTable;
///
/// # async fn example() {
/// let table = DispatchTable::new();
/// table.register("echo", |request: Request| async move {
///     let data = request.param("data")?.to_string();
///     Ok::<_, anyhow::Error>(Response::success(request.id, data))
/// });
///
/// let response = table
///     .serve(Request::new("echo").with_id("1").with_param("data", "ping"))
///     .await;
/// assert_eq!(response.result(), Some("ping"));
/// # }
/// ```
#[derive(Default)]
pub struct DispatchTable {
    methods: DashMap<String, Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `method`, replacing any previous binding
    pub fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        let method = method.into();
        let handler: Handler = Arc::new(move |request| handler(request).boxed());
        if self.methods.insert(method.clone(), handler).is_some() {
            debug!(method = %method, "Replaced method handler");
        }
    }

    /// Remove the binding for `method`; true if one existed
    pub fn unregister(&self, method: &str) -> bool {
        self.methods.remove(method).is_some()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Names of all registered methods, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        methods.sort();
        methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Route a request to its handler
    ///
    /// Never fails: every fault becomes an error response, with the request id
    /// echoed whenever there is a request to take it from.
    pub async fn serve(&self, request: impl Into<Option<Request>>) -> Response {
        let request = request.into();
        info!(
            method = request.as_ref().map_or("", |r| r.method.as_str()),
            "Request received"
        );

        let Some(request) = request else {
            return Response::failure(None, RpcError::invalid_request("Request was not provided"));
        };
        if !request.has_method() {
            return Response::failure(
                request.id,
                RpcError::method_not_found("Method name is not provided"),
            );
        }

        let Some(handler) = self
            .methods
            .get(&request.method)
            .map(|entry| Arc::clone(entry.value()))
        else {
            let message = format!("Method {} not found.", request.method);
            return Response::failure(request.id, RpcError::method_not_found(message));
        };

        let id = request.id.clone();
        match catch_panic(async move { handler(request).await }).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => Response::failure(id, handler_error(error)),
            Err(panic) => Response::failure(id, RpcError::server(panic).with_data("handler panicked")),
        }
    }

    /// Serve a request and decode its result, raising a carried error
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: impl Into<Option<Request>>,
    ) -> Result<T, RpcError> {
        self.serve(request).await.decode_result()
    }
}

/// Structured errors pass through; anything else is a server fault
fn handler_error(error: anyhow::Error) -> RpcError {
    match error.downcast::<RpcError>() {
        Ok(rpc) => rpc,
        Err(error) => RpcError::server(error.to_string()).with_data(format!("{:?}", error)),
    }
}

#[async_trait::async_trait]
impl Responder for DispatchTable {
    async fn respond(&self, request: Option<Request>) -> anyhow::Result<Response> {
        Ok(self.serve(request).await)
    }
}
