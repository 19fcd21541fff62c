//! ICRC-21 consent messages and where the signer gets them from.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use icrc_agent::Agent;
use icrc_rpc::{Blob, IcrcLedgerCodec, Principal, RpcError, TokenMetadata};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SignerError;

pub const ICRC21_CONSENT_MESSAGE_METHOD: &str = "icrc21_canister_call_consent_message";
pub const ICRC1_METADATA_METHOD: &str = "icrc1_metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentMessageMetadata {
    pub language: String,
    pub utc_offset_minutes: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSpec {
    GenericDisplay,
    LineDisplay { characters_per_line: u16, lines_per_page: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentMessageSpec {
    pub metadata: ConsentMessageMetadata,
    pub device_spec: Option<DeviceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentMessageRequest {
    pub method: String,
    pub arg: Vec<u8>,
    pub user_preferences: ConsentMessageSpec,
}

impl ConsentMessageRequest {
    /// A request without utc offset or device preferences.
    pub fn new(method: impl Into<String>, arg: Vec<u8>, language: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arg,
            user_preferences: ConsentMessageSpec {
                metadata: ConsentMessageMetadata {
                    language: language.into(),
                    utc_offset_minutes: None,
                },
                device_spec: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDisplayPage {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentMessage {
    GenericDisplayMessage(String),
    LineDisplayMessage { pages: Vec<LineDisplayPage> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentInfo {
    pub metadata: ConsentMessageMetadata,
    pub consent_message: ConsentMessage,
}

impl ConsentInfo {
    pub fn generic(message: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            metadata: ConsentMessageMetadata { language: language.into(), utc_offset_minutes: None },
            consent_message: ConsentMessage::GenericDisplayMessage(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub description: String,
}

/// The `Err` arm of a consent message response; `Display` is the text relayed
/// to the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Icrc21Error {
    #[error("Error: {description} (Code: {error_code})")]
    GenericError { description: String, error_code: u128 },
    #[error("Insufficient Payment: {}", .0.description)]
    InsufficientPayment(ErrorInfo),
    #[error("Unsupported Canister Call: {}", .0.description)]
    UnsupportedCanisterCall(ErrorInfo),
    #[error("Consent Message Unavailable: {}", .0.description)]
    ConsentMessageUnavailable(ErrorInfo),
}

pub type ConsentMessageResponse = Result<ConsentInfo, Icrc21Error>;

/// What the consent prompt is shown: the canister's own message, or one the
/// signer built locally because the canister could not be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultConsentInfo {
    Ok(ConsentInfo),
    Warn { canister_id: Principal, method: String, arg: Blob, consent_info: ConsentInfo },
}

impl ResultConsentInfo {
    pub fn consent_info(&self) -> &ConsentInfo {
        match self {
            Self::Ok(info) => info,
            Self::Warn { consent_info, .. } => consent_info,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warn { .. })
    }
}

/// Candid encoding of the ICRC-21 endpoint.
pub trait Icrc21Codec: Send + Sync {
    fn encode_request(&self, request: &ConsentMessageRequest) -> Result<Vec<u8>, RpcError>;
    fn decode_response(&self, reply: &[u8]) -> Result<ConsentMessageResponse, RpcError>;
}

#[async_trait]
pub trait ConsentMessageSource: Send + Sync {
    /// `Err` is a hard failure (network, certificate, codec); a structured
    /// refusal by the canister comes back as `Ok(Err(_))`.
    async fn consent_message(
        &self,
        canister_id: &Principal,
        request: &ConsentMessageRequest,
    ) -> Result<ConsentMessageResponse, SignerError>;
}

#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn token_metadata(&self, ledger_id: &Principal) -> Result<TokenMetadata, SignerError>;
}

/// Fetches consent messages and token metadata through certified update calls
/// made by the owner's agent. Metadata is cached per ledger.
pub struct AgentCanisterApi {
    agent: Arc<Agent>,
    icrc21: Arc<dyn Icrc21Codec>,
    ledger: Arc<dyn IcrcLedgerCodec>,
    metadata: Mutex<HashMap<Principal, TokenMetadata>>,
}

impl AgentCanisterApi {
    pub fn new(
        agent: Arc<Agent>,
        icrc21: Arc<dyn Icrc21Codec>,
        ledger: Arc<dyn IcrcLedgerCodec>,
    ) -> Self {
        Self { agent, icrc21, ledger, metadata: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl ConsentMessageSource for AgentCanisterApi {
    async fn consent_message(
        &self,
        canister_id: &Principal,
        request: &ConsentMessageRequest,
    ) -> Result<ConsentMessageResponse, SignerError> {
        let arg = self.icrc21.encode_request(request).map_err(SignerError::consent_source)?;
        let reply = self
            .agent
            .update(canister_id, ICRC21_CONSENT_MESSAGE_METHOD, arg)
            .await
            .map_err(SignerError::consent_source)?;
        self.icrc21.decode_response(&reply).map_err(SignerError::consent_source)
    }
}

#[async_trait]
impl TokenMetadataSource for AgentCanisterApi {
    async fn token_metadata(&self, ledger_id: &Principal) -> Result<TokenMetadata, SignerError> {
        let cached =
            self.metadata.lock().unwrap_or_else(PoisonError::into_inner).get(ledger_id).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let reply = self
            .agent
            .update(ledger_id, ICRC1_METADATA_METHOD, self.ledger.encode_metadata_request())
            .await
            .map_err(SignerError::metadata)?;
        let metadata = self.ledger.decode_metadata(&reply).map_err(SignerError::metadata)?;
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ledger_id.clone(), metadata.clone());
        Ok(metadata)
    }
}
