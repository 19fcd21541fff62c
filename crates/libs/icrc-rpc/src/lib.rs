//! Wire vocabulary for the ICRC signer interaction protocol.
//!
//! Both ends of the protocol (the relying party driving a popup and the
//! signer answering inside it) speak JSON-RPC 2.0 over a cross-window
//! message channel. This crate owns everything the two sides agree on:
//!
//! - **Envelopes** ([`RpcRequest`], [`RpcResponse`]) and their structural validator
//! - **Protocol vocabulary**: methods, scopes, standards, error codes
//! - **Identities**: [`Principal`] and ICRC-1 [`IcrcAccount`] with their textual forms
//! - **Typed params/results** for each ICRC method
//! - **[`retry_until_ready`]**, the bounded polling primitive behind handshakes
//! - **Host seams**: [`MessageEvent`], [`MessageTarget`] and the [`Clock`]
//! - **Ledger argument types** and the opaque [`IcrcLedgerCodec`]

pub mod account;
pub mod blob;
pub mod clock;
pub mod codes;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod message;
pub mod methods;
pub mod params;
pub mod principal;
pub mod retry;

pub use account::{IcrcAccount, Subaccount};
pub use blob::Blob;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codes::SignerErrorCode;
pub use envelope::{
    is_error_response_for, Envelope, RpcId, RpcRequest, RpcResponse, RpcResponseError,
    JSON_RPC_VERSION,
};
pub use error::RpcError;
pub use ledger::{
    ApproveArgs, BlockIndex, IcrcLedgerCodec, LedgerCallError, TokenMetadata, TransferArg,
    TransferFromArgs, ICRC1_TRANSFER, ICRC2_APPROVE, ICRC2_TRANSFER_FROM,
};
pub use message::{parse_origin, MessageEvent, MessageTarget, WindowId};
pub use methods::{
    signer_supported_standards, IcrcMethod, IcrcStandard, PermissionState, Scope, ScopeMethod,
    ScopedMethod, SupportedStandard,
};
pub use params::{
    parse_params, parse_result, AccountsResult, CallCanisterParams, CallCanisterResult,
    RequestPermissionsParams, RequestedScope, ScopesResult, SupportedStandardsResult,
    ICRC29_STATUS_READY,
};
pub use principal::Principal;
pub use retry::{retries_for, retry_until_ready, ReadyState, RetryOutcome};
