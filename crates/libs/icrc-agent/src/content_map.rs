//! CBOR content maps: the exact call and read-state payloads the agent signs.

use icrc_rpc::{CallCanisterParams, Principal};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::AgentError;

pub const REQUEST_TYPE_CALL: &str = "call";
pub const REQUEST_TYPE_READ_STATE: &str = "read_state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContent {
    pub request_type: String,
    #[serde(with = "serde_bytes")]
    pub canister_id: Vec<u8>,
    pub method_name: String,
    #[serde(with = "serde_bytes")]
    pub arg: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub sender: Vec<u8>,
    pub ingress_expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub nonce: Option<Vec<u8>>,
}

impl CallContent {
    pub fn from_params(params: &CallCanisterParams, ingress_expiry: u64) -> Self {
        Self {
            request_type: REQUEST_TYPE_CALL.to_string(),
            canister_id: params.canister_id.as_slice().to_vec(),
            method_name: params.method.clone(),
            arg: params.arg.to_vec(),
            sender: params.sender.as_slice().to_vec(),
            ingress_expiry,
            nonce: params.nonce.as_ref().map(|nonce| nonce.to_vec()),
        }
    }

    pub fn canister_id(&self) -> Result<Principal, AgentError> {
        Principal::from_slice(&self.canister_id).map_err(AgentError::encoding)
    }

    pub fn sender(&self) -> Result<Principal, AgentError> {
        Principal::from_slice(&self.sender).map_err(AgentError::encoding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStateContent {
    pub request_type: String,
    #[serde(with = "serde_bytes")]
    pub sender: Vec<u8>,
    pub ingress_expiry: u64,
    pub paths: Vec<Vec<ByteBuf>>,
}

/// `{content, sender_pubkey?, sender_sig?}` as submitted to the platform.
#[derive(Debug, Serialize)]
pub struct SignedEnvelope<'a, T> {
    pub content: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pubkey: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_sig: Option<ByteBuf>,
}

/// CBOR with the self-describe tag, as the platform expects.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, AgentError> {
    let mut serializer = serde_cbor::Serializer::new(Vec::new());
    serializer.self_describe().map_err(AgentError::encoding)?;
    value.serialize(&mut serializer).map_err(AgentError::encoding)?;
    Ok(serializer.into_inner())
}

pub fn encode_call_content(content: &CallContent) -> Result<Vec<u8>, AgentError> {
    encode_cbor(content)
}

pub fn decode_call_content(bytes: &[u8]) -> Result<CallContent, AgentError> {
    serde_cbor::from_slice(bytes).map_err(AgentError::encoding)
}
