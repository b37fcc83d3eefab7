use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorCode, RpcError};

/// Protocol version written into every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// The `jsonrpc` field
///
/// Always written as `"2.0"`. Any incoming value (including `null`) is accepted and ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Version)
    }
}

/// Decode `null` the same way as an absent field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A JSON scalar read as text, the way loosely typed peers send ids and parameters
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(text) => text,
            Scalar::Number(number) => number.to_string(),
            Scalar::Flag(flag) => flag.to_string(),
        }
    }
}

/// Accept a string, number or boolean id and keep its text form
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

/// Parameter values may be any scalar; `null` values are dropped
fn lenient_params<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let params = Option::<HashMap<String, Option<Scalar>>>::deserialize(deserializer)?;
    Ok(params
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, String::from(value))))
        .collect())
}

/// RPC request envelope
///
/// `method` doubles as the transport subject the request is published on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Version,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Bearer token, carried through untouched
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient_params")]
    pub params: HashMap<String, String>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Whether the request names a method it can be routed on
    pub fn has_method(&self) -> bool {
        !self.method.is_empty()
    }

    /// Look up a required parameter
    ///
    /// A missing parameter yields an `InvalidParam` error whose `data` is the parameter name.
    pub fn param(&self, name: &str) -> Result<&str, RpcError> {
        self.params.get(name).map(String::as_str).ok_or_else(|| {
            RpcError::new(
                ErrorCode::InvalidParam,
                format!("Parameter {} was not provided.", name),
            )
            .with_data(name)
        })
    }

    /// Look up a required parameter and convert it
    ///
    /// Conversion failures yield a `ParseError` carrying the conversion message.
    pub fn parse_param<T>(&self, name: &str) -> Result<T, RpcError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.param(name)?;
        raw.parse::<T>().map_err(|e| {
            RpcError::new(ErrorCode::ParseError, e.to_string())
                .with_data(format!("{}={:?} as {}", name, raw, std::any::type_name::<T>()))
        })
    }
}

/// RPC response envelope
///
/// `result` and `error` are mutually exclusive; the constructors are the only way to set them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResponseWire")]
pub struct Response {
    pub jsonrpc: Version,
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct ResponseWire {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl From<ResponseWire> for Response {
    fn from(wire: ResponseWire) -> Self {
        match wire.error {
            Some(error) => Self::failure(wire.id, error),
            None => Self {
                jsonrpc: Version,
                id: wire.id,
                result: wire.result,
                error: None,
            },
        }
    }
}

impl Response {
    pub fn success(id: Option<String>, result: impl Into<String>) -> Self {
        Self {
            jsonrpc: Version,
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(id: Option<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: Version,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// A successful response without a result payload
    pub fn empty(id: Option<String>) -> Self {
        Self {
            jsonrpc: Version,
            id,
            result: None,
            error: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Turn the `error` field into an `Err`
    pub fn into_result(self) -> Result<Option<String>, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }

    /// Interpret `result` as the JSON text of `T`
    ///
    /// An absent result decodes from `null`.
    pub fn decode_result<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        let result = self.into_result()?;
        serde_json::from_str(result.as_deref().unwrap_or("null")).map_err(|e| {
            RpcError::new(ErrorCode::ParseError, e.to_string())
                .with_data(std::any::type_name::<T>())
        })
    }
}
