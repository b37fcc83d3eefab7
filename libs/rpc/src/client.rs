use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use constellation_core::{Request, Response, RpcError};
use constellation_fabric::codec::JsonCodec;
use constellation_fabric::Connector;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use crate::config::{RpcConfig, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::error::{Error, Result};
use crate::responder::{Responder, ResponderExt};

/// Issues RPC calls over a publish/subscribe transport
///
/// Every call opens its own connection, publishes the request on the subject
/// named by `request.method`, waits for the correlated reply and closes the
/// connection again. Calls never share mutable state.
pub struct Client {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    disposed: AtomicBool,
}

impl Client {
    /// Create a client with the default timeout
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn from_config(connector: Arc<dyn Connector>, config: &RpcConfig) -> Self {
        Self::new(connector).with_timeout(config.request_timeout())
    }

    /// Set the timeout used by [`Client::call`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call with the configured timeout
    pub async fn call(&self, request: &Request) -> Result<Response> {
        self.call_with_timeout(request, self.timeout).await
    }

    /// Publish `request` and wait at most `timeout` for its response
    ///
    /// The returned response may itself carry an RPC error. `Err` means the
    /// call could not complete: timeouts and every other transport fault
    /// surface as an `InternalError`.
    pub async fn call_with_timeout(&self, request: &Request, timeout: Duration) -> Result<Response> {
        if self.is_disposed() {
            return Err(Error::Disposed("Client"));
        }

        debug!(method = %request.method, timeout_ms = timeout.as_millis() as u64, "Calling");
        constellation_fabric::request::request::<Request, Response, _>(
            self.connector.as_ref(),
            &request.method,
            request,
            JsonCodec,
            timeout,
        )
        .await
        .map_err(Error::internal)
    }

    /// Call and decode the result, raising an error carried in the response
    pub async fn invoke<T: DeserializeOwned + Send>(&self, request: &Request) -> Result<T> {
        self.execute(request.clone()).await
    }

    /// Blocking form of [`Client::call`]
    ///
    /// Works outside any runtime and from worker threads of a multi-thread
    /// runtime. A current-thread runtime cannot be blocked without stalling
    /// the reply, so the call is refused there.
    pub fn call_blocking(&self, request: &Request) -> Result<Response> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.call(request)))
            }
            Ok(_) => Err(Error::internal(
                "blocking call is not supported on a current-thread runtime",
            )),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(Error::internal)?;
                runtime.block_on(self.call(request))
            }
        }
    }

    /// Refuse further calls; repeated disposal is a no-op
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!("Client disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Remote counterpart of [`crate::DispatchTable`]'s responder
///
/// Transport faults are raised as [`Error`]; RPC errors come back inside the response.
#[async_trait::async_trait]
impl Responder for Client {
    async fn respond(&self, request: Option<Request>) -> anyhow::Result<Response> {
        let Some(request) = request else {
            return Ok(Response::failure(
                None,
                RpcError::invalid_request("Request was not provided"),
            ));
        };
        Ok(self.call(&request).await?)
    }
}
