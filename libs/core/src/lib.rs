//! Constellation Core - RPC envelope model
//!
//! Request, response and error shapes shared by callers and responders,
//! independent of the transport that carries them.
//!
//! # Example
//!
//! ```
//! use constellation_core::{ErrorCode, Request, Response};
//!
//! let request = Request::new("greeter:hello")
//!     .with_id("42")
//!     .with_param("name", "world");
//!
//! let name = request.param("name").unwrap();
//! let response = Response::success(request.id.clone(), format!("hello {}", name));
//! assert_eq!(response.result(), Some("hello world"));
//!
//! let missing = request.param("age").unwrap_err();
//! assert!(missing.is(ErrorCode::InvalidParam));
//! ```

pub mod envelope;
pub mod error;

pub use envelope::{Request, Response, Version, JSONRPC_VERSION};
pub use error::{ErrorCode, RpcError};
