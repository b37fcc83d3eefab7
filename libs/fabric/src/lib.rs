//! Constellation Fabric - Low-level messaging layer
//!
//! Provides the publish/subscribe transport contract (connections,
//! queue-group subscriptions, request/reply with reply inboxes), codec
//! support (JSON) and an in-process broker implementing the contract.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use constellation_fabric::{codec::JsonCodec, request::request, MemoryBroker};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyRequest { data: String }
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyResponse { result: i32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryBroker::new();
//! let req = MyRequest { data: "hello".to_string() };
//!
//! // One-off request on the "compute" subject
//! let resp: MyResponse =
//!     request(&broker, "compute", &req, JsonCodec, Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use error::{Error, Result};
pub use transport::{
    Connector, MemoryBroker, Message, Subscription, SubscriptionId, Transport,
};
