use std::fmt::Display;

use icrc_agent::AgentError;
use icrc_rpc::{LedgerCallError, RpcError, RpcResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelyingPartyError {
    #[error("Wallet options cannot be parsed: {reason}")]
    InvalidOptions { reason: String },

    #[error("Wallet request options cannot be parsed: {reason}")]
    InvalidRequestOptions { reason: String },

    #[error("Unable to open the signer window.")]
    PopupBlocked,

    #[error("Connection timeout. Unable to connect to the signer.")]
    ConnectionTimeout,

    #[error("The response origin {origin} does not match the requested signer URL {url}.")]
    ConnectOriginMismatch { origin: String, url: String },

    #[error("The response origin {origin} does not match the signer origin {expected}.")]
    OriginMismatch { origin: String, expected: String },

    #[error("The response was not sent by the signer window.")]
    SourceMismatch,

    #[error("Request to signer timed out after {timeout_ms} milliseconds.")]
    RequestTimeout { timeout_ms: u128 },

    /// The signer answered the request with an error envelope.
    #[error("{message}")]
    Response { code: i64, message: String },

    #[error("The signer is disconnected.")]
    Disconnected,

    #[error("The signer window is closed.")]
    PopupClosed,

    #[error("The signer did not return any permission.")]
    NoPermissionData,

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("ledger refused the call: {0}")]
    Ledger(#[from] LedgerCallError),
}

impl RelyingPartyError {
    pub fn invalid_options(reason: impl Display) -> Self {
        Self::InvalidOptions { reason: reason.to_string() }
    }

    pub fn invalid_request_options(reason: impl Display) -> Self {
        Self::InvalidRequestOptions { reason: reason.to_string() }
    }

    /// Code of the signer's error envelope, when that is what failed the request.
    pub fn response_code(&self) -> Option<i64> {
        match self {
            Self::Response { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The connection is gone; retrying on this instance cannot succeed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Disconnected | Self::PopupClosed)
    }
}

impl From<RpcResponseError> for RelyingPartyError {
    fn from(error: RpcResponseError) -> Self {
        Self::Response { code: error.code, message: error.message }
    }
}
