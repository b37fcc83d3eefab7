use constellation_core::{ErrorCode, RpcError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Listener for {0} is not bound to a transport")]
    NotBound(String),

    #[error("Listener for {subject} failed: {source}")]
    Listener {
        subject: String,
        #[source]
        source: constellation_fabric::Error,
    },

    #[error("{} of {total} listeners failed to start", .failures.len())]
    Start {
        total: usize,
        failures: Vec<(String, Error)>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a transport fault as an `InternalError`
    pub(crate) fn internal(fault: impl std::fmt::Display) -> Self {
        Self::Rpc(RpcError::internal(fault.to_string()))
    }

    /// The RPC error code, for faults that carry one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rpc(e) => e.kind(),
            _ => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
