use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CertificateError {
    #[error("certificate decode failed: {reason}")]
    Decode { reason: String },

    #[error("malformed hash tree: {reason}")]
    InvalidTree { reason: String },

    #[error("invalid public key: {reason}")]
    InvalidKey { reason: String },

    #[error("certificate signature does not verify")]
    InvalidSignature,

    #[error("delegation certificates must not carry a delegation")]
    NestedDelegation,

    #[error("canister {canister_id} is outside the delegated subnet ranges")]
    CanisterNotInRange { canister_id: String },

    #[error("certificate is missing {path}")]
    MissingPath { path: String },

    #[error("certificate time {certificate_time} is more than {max_skew_ms} ms away from {now}")]
    TimeOutOfRange { certificate_time: u64, now: u64, max_skew_ms: u64 },
}

impl CertificateError {
    pub fn decode(reason: impl Display) -> Self {
        Self::Decode { reason: reason.to_string() }
    }

    pub fn invalid_tree(reason: impl Display) -> Self {
        Self::InvalidTree { reason: reason.to_string() }
    }

    pub fn invalid_key(reason: impl Display) -> Self {
        Self::InvalidKey { reason: reason.to_string() }
    }

    pub fn missing_path(path: &[&[u8]]) -> Self {
        let rendered: Vec<String> =
            path.iter().map(|label| String::from_utf8_lossy(label).into_owned()).collect();
        Self::MissingPath { path: rendered.join("/") }
    }
}

/// The content map returned with a call result does not describe the call
/// that was requested.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallAssertionError {
    #[error("The response canister ID does not match the requested canister ID.")]
    CanisterId,

    #[error("The response method does not match the request method.")]
    Method,

    #[error("The response does not contain the request arguments.")]
    Arg,

    #[error("The response sender does not match the request sender.")]
    Sender,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    CallAssertion(#[from] CallAssertionError),

    #[error("the agent has no trusted root key")]
    MissingRootKey,

    #[error("The request has expired and is no longer valid. Please try again with a new request.")]
    ExpiredRequest,

    #[error("sender {actual} does not match the agent identity {expected}")]
    SenderMismatch { expected: String, actual: String },

    #[error("invalid request status: {status}")]
    InvalidStatus { status: String },

    #[error("the certificate reports a reply but carries no reply data")]
    InvalidReply,

    #[error("call rejected with code {code}: {message}")]
    Rejected { code: u64, message: String },

    #[error("request {request_id} did not reach a final status in time")]
    Timeout { request_id: String },

    #[error("encoding failed: {reason}")]
    Encoding { reason: String },
}

impl AgentError {
    pub fn transport(message: impl Display) -> Self {
        Self::Transport { message: message.to_string() }
    }

    pub fn encoding(reason: impl Display) -> Self {
        Self::Encoding { reason: reason.to_string() }
    }

    /// Only transport hiccups are worth retrying; every certificate or status
    /// failure is final for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
