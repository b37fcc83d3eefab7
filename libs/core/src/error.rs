use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::null_as_default;

/// Fixed JSON-RPC 2.0 style error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// A request parameter could not be converted
    ParseError = -32700,
    /// The request envelope is missing or malformed
    InvalidRequest = -32600,
    /// No handler is registered for the method
    MethodNotFound = -32601,
    /// A required request parameter is missing
    InvalidParam = -32602,
    /// Transport-level fault: timeout, connect failure, decode failure
    InternalError = -32603,
    /// A registered handler failed while executing
    ServerError = -32000,
}

impl ErrorCode {
    /// Numeric wire value
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Look up a code from its wire value
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParam),
            -32603 => Some(Self::InternalError),
            -32000 => Some(Self::ServerError),
            _ => None,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParseError => "ParseError",
            Self::InvalidRequest => "InvalidRequest",
            Self::MethodNotFound => "MethodNotFound",
            Self::InvalidParam => "InvalidParam",
            Self::InternalError => "InternalError",
            Self::ServerError => "ServerError",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Structured RPC error, carried in the `error` field of a response
///
/// Also usable as a Rust error so handlers can return it with `?`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RpcError {
    pub code: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach diagnostic detail
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    /// The code as a known [`ErrorCode`], if it is one
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }
}
