//! Constellation RPC - Request/response over publish/subscribe
//!
//! Callers publish a [`constellation_core::Request`] on the subject named by
//! its method and wait for one [`constellation_core::Response`] on a private
//! reply address. Responders subscribe to subjects inside a queue group, so
//! replicas of a service share the load.
//!
//! - [`DispatchTable`] routes requests to handlers by method name.
//! - [`Listener`] answers requests arriving on one subject.
//! - [`RpcService`] runs one listener per registered method.
//! - [`Client`] issues calls with a timeout.
//!
//! Both the table and the client are [`Responder`]s, so code written against
//! [`ResponderExt::execute`] runs in-process or remotely without change.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod responder;
pub mod service;

pub use client::Client;
pub use config::RpcConfig;
pub use dispatch::{DispatchTable, Handler, HandlerFuture};
pub use error::{Error, Result};
pub use listener::Listener;
pub use responder::{responder_fn, Responder, ResponderExt, ResponderFn};
pub use service::RpcService;
