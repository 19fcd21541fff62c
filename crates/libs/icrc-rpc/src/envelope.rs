//! JSON-RPC 2.0 envelopes and their structural validation.
//!
//! The message channel is shared with unrelated traffic, so the parsers here
//! return `Option` rather than errors: anything that does not look exactly
//! like a protocol envelope is simply not ours.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes::SignerErrorCode;
use crate::methods::IcrcMethod;

pub const JSON_RPC_VERSION: &str = "2.0";

/// Correlation id shared by a request and its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl RpcId {
    /// A fresh random id, unique among outstanding requests.
    pub fn generate() -> Self {
        Self::String(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(text) => f.write_str(text),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for RpcId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RpcId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u64> for RpcId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: RpcId, method: IcrcMethod, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            method: method.as_str().to_string(),
            params,
        }
    }

    /// Parses a request, rejecting notifications and foreign payloads.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.as_object().is_some_and(|object| object.contains_key("id")) {
            return None;
        }
        let request = serde_json::from_value::<Self>(value.clone()).ok()?;
        if request.jsonrpc != JSON_RPC_VERSION {
            log::trace!("rpc(envelope): request {} has jsonrpc {:?}", request.id, request.jsonrpc);
            return None;
        }
        Some(request)
    }

    pub fn icrc_method(&self) -> Option<IcrcMethod> {
        IcrcMethod::parse(&self.method)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn signer(code: SignerErrorCode) -> Self {
        Self::new(code.code(), code.default_message())
    }
}

impl fmt::Display for RpcResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A response carries exactly one of `result` or `error`; [`RpcResponse::from_value`]
/// enforces that, so the two constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcResponseError>,
}

impl RpcResponse {
    pub fn success(id: RpcId, result: Value) -> Self {
        Self { jsonrpc: JSON_RPC_VERSION.to_string(), id, result: Some(result), error: None }
    }

    pub fn failure(id: RpcId, error: RpcResponseError) -> Self {
        Self { jsonrpc: JSON_RPC_VERSION.to_string(), id, result: None, error: Some(error) }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.as_object().is_some_and(|object| object.contains_key("id")) {
            return None;
        }
        let response = serde_json::from_value::<Self>(value.clone()).ok()?;
        if response.jsonrpc != JSON_RPC_VERSION {
            log::trace!("rpc(envelope): response {} has jsonrpc {:?}", response.id, response.jsonrpc);
            return None;
        }
        match (&response.result, &response.error) {
            (Some(_), None) | (None, Some(_)) => Some(response),
            _ => {
                log::trace!(
                    "rpc(envelope): response {} must carry exactly one of result or error",
                    response.id
                );
                None
            }
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RpcResponseError> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_outcome(self) -> Result<Value, RpcResponseError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcResponseError::new(
                crate::codes::rpc::INTERNAL_ERROR,
                "response carries neither result nor error",
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A matched protocol envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl Envelope {
    pub fn classify(value: &Value) -> Option<Self> {
        if let Some(request) = RpcRequest::from_value(value) {
            return Some(Self::Request(request));
        }
        let response = RpcResponse::from_value(value).map(Self::Response);
        if response.is_none() {
            log::trace!("rpc(envelope): ignoring a message that is not a JSON-RPC envelope");
        }
        response
    }
}

/// True when `value` is an error response correlated with `id`.
pub fn is_error_response_for(value: &Value, id: &RpcId) -> Option<RpcResponseError> {
    let response = RpcResponse::from_value(value)?;
    if &response.id != id {
        return None;
    }
    response.error
}
