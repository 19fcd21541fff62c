//! Responses the signer posts back to the relying party.

use std::sync::Arc;

use icrc_rpc::codes::rpc;
use icrc_rpc::{
    signer_supported_standards, AccountsResult, CallCanisterResult, IcrcAccount, MessageTarget,
    RpcId, RpcResponse, RpcResponseError, Scope, ScopesResult, SignerErrorCode,
    SupportedStandardsResult, ICRC29_STATUS_READY,
};
use serde::Serialize;
use serde_json::Value;

/// Where the answer to one request goes.
#[derive(Clone)]
pub struct ReplyTo {
    id: RpcId,
    origin: String,
    target: Arc<dyn MessageTarget>,
}

impl ReplyTo {
    pub fn new(id: RpcId, origin: impl Into<String>, target: Arc<dyn MessageTarget>) -> Self {
        Self { id, origin: origin.into(), target }
    }

    pub fn id(&self) -> &RpcId {
        &self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn post(&self, response: RpcResponse) {
        log::trace!("signer(notify): {} -> {}", self.id, self.origin);
        self.target.post_message(response.to_value(), &self.origin);
    }

    pub fn success(&self, result: impl Serialize) {
        match serde_json::to_value(result) {
            Ok(value) => self.post(RpcResponse::success(self.id.clone(), value)),
            Err(err) => self.error_with(SignerErrorCode::Generic, err.to_string()),
        }
    }

    pub fn ready(&self) {
        self.post(RpcResponse::success(self.id.clone(), Value::from(ICRC29_STATUS_READY)));
    }

    pub fn supported_standards(&self) {
        self.success(SupportedStandardsResult { supported_standards: signer_supported_standards() });
    }

    pub fn scopes(&self, scopes: Vec<Scope>) {
        self.success(ScopesResult { scopes });
    }

    pub fn accounts(&self, accounts: Vec<IcrcAccount>) {
        self.success(AccountsResult { accounts });
    }

    pub fn call_result(&self, result: &CallCanisterResult) {
        self.success(result);
    }

    pub fn error(&self, code: SignerErrorCode) {
        self.post(RpcResponse::failure(self.id.clone(), RpcResponseError::signer(code)));
    }

    pub fn error_with(&self, code: SignerErrorCode, message: impl Into<String>) {
        self.post(RpcResponse::failure(self.id.clone(), RpcResponseError::new(code.code(), message)));
    }

    pub fn invalid_params(&self, message: impl Into<String>) {
        self.post(RpcResponse::failure(
            self.id.clone(),
            RpcResponseError::new(rpc::INVALID_PARAMS, message),
        ));
    }

    pub fn request_not_supported(&self, message: impl Into<String>) {
        self.error_with(SignerErrorCode::RequestNotSupported, message);
    }

    /// NETWORK_ERROR with `message`, or the generic text when there is none.
    pub fn network_error(&self, message: Option<String>) {
        match message.filter(|message| !message.is_empty()) {
            Some(message) => self.error_with(SignerErrorCode::Network, message),
            None => self.error(SignerErrorCode::Network),
        }
    }
}
