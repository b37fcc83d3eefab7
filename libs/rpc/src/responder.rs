use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use constellation_core::{Request, Response, RpcError};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Produces the response for one inbound request
///
/// This is what a [`crate::Listener`] invokes for every message it receives.
/// `request` is `None` when the payload decoded to an absent request.
/// An `Err` is reported to the caller as an `InternalError`.
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: Option<Request>) -> anyhow::Result<Response>;
}

/// Typed calls over any [`Responder`]
///
/// A [`crate::DispatchTable`] and a [`crate::Client`] are both responders, so
/// a typed proxy written against this trait runs in-process or remotely
/// without change.
pub trait ResponderExt: Responder {
    /// Serve `request` and decode its result as `T`, raising a carried error
    fn execute<'a, T>(&'a self, request: Request) -> BoxFuture<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a;
}

impl<R: Responder + ?Sized> ResponderExt for R {
    fn execute<'a, T>(&'a self, request: Request) -> BoxFuture<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        async move {
            let response = self
                .respond(Some(request))
                .await
                .map_err(responder_fault)?;
            Ok(response.decode_result()?)
        }
        .boxed()
    }
}

/// Recover the typed error a responder raised, if it raised one
fn responder_fault(error: anyhow::Error) -> Error {
    match error.downcast::<Error>() {
        Ok(error) => error,
        Err(error) => match error.downcast::<RpcError>() {
            Ok(rpc) => Error::Rpc(rpc),
            Err(error) => Error::internal(error),
        },
    }
}

/// Responder backed by a plain async function
pub struct ResponderFn<F> {
    f: F,
}

/// Adapt an async function into a [`Responder`]
///
/// An absent request is rejected before the function runs.
pub fn responder_fn<F, Fut>(f: F) -> ResponderFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    ResponderFn { f }
}

#[async_trait::async_trait]
impl<F, Fut> Responder for ResponderFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Response>> + Send,
{
    async fn respond(&self, request: Option<Request>) -> anyhow::Result<Response> {
        let request = request.ok_or_else(|| anyhow::anyhow!("Request was not provided"))?;
        (self.f)(request).await
    }
}

/// Await `future`, turning a panic into its message
pub(crate) async fn catch_panic<F: Future>(future: F) -> std::result::Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
