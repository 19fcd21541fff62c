use std::fmt::Display;

use thiserror::Error;

/// Errors raised while decoding protocol values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcError {
    #[error("invalid principal: {reason}")]
    InvalidPrincipal { reason: String },

    #[error("invalid blob: {reason}")]
    InvalidBlob { reason: String },

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("codec error: {message}")]
    Codec { message: String },
}

impl RpcError {
    pub fn invalid_principal(reason: impl Display) -> Self {
        Self::InvalidPrincipal { reason: reason.to_string() }
    }

    pub fn invalid_blob(reason: impl Display) -> Self {
        Self::InvalidBlob { reason: reason.to_string() }
    }

    pub fn invalid_params(method: impl Into<String>, reason: impl Display) -> Self {
        Self::InvalidParams { method: method.into(), reason: reason.to_string() }
    }

    pub fn codec(message: impl Display) -> Self {
        Self::Codec { message: message.to_string() }
    }
}
