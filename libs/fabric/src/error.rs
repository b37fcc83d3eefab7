use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),

    #[error("Maximum payload exceeded: {size} bytes (limit {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request on {subject} timed out after {}ms", .timeout.as_millis())]
    Timeout { subject: String, timeout: Duration },

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
