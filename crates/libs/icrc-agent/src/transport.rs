use async_trait::async_trait;
use icrc_rpc::Principal;

use crate::error::AgentError;

/// What the platform answered to a call submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Synchronous answer carrying a certificate for the request status.
    Certified { certificate: Vec<u8> },
    /// HTTP 202: accepted for processing, status must be polled.
    Accepted,
    /// Refused before reaching consensus.
    Rejected { reject_code: u64, reject_message: String },
}

/// Network access to the ledger platform.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<SubmitResponse, AgentError>;

    /// Returns the raw certificate answering a read-state envelope.
    async fn read_state(
        &self,
        canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<Vec<u8>, AgentError>;
}
