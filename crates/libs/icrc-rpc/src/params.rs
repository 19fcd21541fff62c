//! Typed params and results for each ICRC method.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::account::IcrcAccount;
use crate::blob::Blob;
use crate::error::RpcError;
use crate::methods::{Scope, ScopedMethod, SupportedStandard};
use crate::principal::Principal;

/// Result of `icrc29_status` once the signer is listening.
pub const ICRC29_STATUS_READY: &str = "ready";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCanisterParams {
    pub canister_id: Principal,
    pub sender: Principal,
    pub method: String,
    pub arg: Blob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCanisterResult {
    pub certificate: Blob,
    pub content_map: Blob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsResult {
    pub accounts: Vec<IcrcAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopesResult {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedScope {
    pub method: String,
}

impl From<ScopedMethod> for RequestedScope {
    fn from(method: ScopedMethod) -> Self {
        Self { method: method.as_str().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPermissionsParams {
    pub scopes: Vec<RequestedScope>,
}

impl RequestPermissionsParams {
    pub fn for_methods(methods: impl IntoIterator<Item = ScopedMethod>) -> Self {
        Self { scopes: methods.into_iter().map(RequestedScope::from).collect() }
    }

    /// Requested methods the protocol can scope; unknown ones are dropped.
    pub fn scoped_methods(&self) -> Vec<ScopedMethod> {
        let mut methods: Vec<ScopedMethod> =
            self.scopes.iter().filter_map(|scope| ScopedMethod::parse(&scope.method)).collect();
        methods.sort();
        methods.dedup();
        methods
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedStandardsResult {
    pub supported_standards: Vec<SupportedStandard>,
}

/// Decodes `params` for `method`, mapping failures to [`RpcError::InvalidParams`].
pub fn parse_params<T: DeserializeOwned>(method: &str, params: Option<&Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params(method, "missing params"))?;
    serde_json::from_value(params.clone()).map_err(|err| RpcError::invalid_params(method, err))
}

/// Decodes a result payload; `None` when it has another shape.
pub fn parse_result<T: DeserializeOwned>(result: &Value) -> Option<T> {
    serde_json::from_value(result.clone()).ok()
}

impl AccountsResult {
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.accounts.is_empty() {
            return Err(RpcError::invalid_params("icrc27_accounts", "at least one account is required"));
        }
        Ok(())
    }
}

impl CallCanisterParams {
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.method.is_empty() {
            return Err(RpcError::invalid_params("icrc49_call_canister", "method must not be empty"));
        }
        Ok(())
    }
}
