//! ICRC-1/ICRC-2 ledger argument types and the codec seam.
//!
//! The candid encoding of these types is generated per ledger and lives
//! outside this workspace; callers plug it in through [`IcrcLedgerCodec`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{IcrcAccount, Subaccount};
use crate::error::RpcError;

pub type BlockIndex = u128;

pub const ICRC1_TRANSFER: &str = "icrc1_transfer";
pub const ICRC2_APPROVE: &str = "icrc2_approve";
pub const ICRC2_TRANSFER_FROM: &str = "icrc2_transfer_from";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArg {
    pub from_subaccount: Option<Subaccount>,
    pub to: IcrcAccount,
    pub amount: u128,
    pub fee: Option<u128>,
    pub memo: Option<Vec<u8>>,
    pub created_at_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveArgs {
    pub from_subaccount: Option<Subaccount>,
    pub spender: IcrcAccount,
    pub amount: u128,
    pub expected_allowance: Option<u128>,
    pub expires_at: Option<u64>,
    pub fee: Option<u128>,
    pub memo: Option<Vec<u8>>,
    pub created_at_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFromArgs {
    pub spender_subaccount: Option<Subaccount>,
    pub from: IcrcAccount,
    pub to: IcrcAccount,
    pub amount: u128,
    pub fee: Option<u128>,
    pub memo: Option<Vec<u8>>,
    pub created_at_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub fee: u128,
}

/// Errors a ledger reports in the `Err` arm of a transfer, approve or
/// transfer-from result.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LedgerCallError {
    #[error("bad fee, expected {expected_fee}")]
    BadFee { expected_fee: u128 },
    #[error("bad burn, minimum is {min_burn_amount}")]
    BadBurn { min_burn_amount: u128 },
    #[error("insufficient funds, balance is {balance}")]
    InsufficientFunds { balance: u128 },
    #[error("insufficient allowance, allowance is {allowance}")]
    InsufficientAllowance { allowance: u128 },
    #[error("allowance changed, current allowance is {current_allowance}")]
    AllowanceChanged { current_allowance: u128 },
    #[error("approval expired at {ledger_time}")]
    Expired { ledger_time: u64 },
    #[error("transaction too old")]
    TooOld,
    #[error("transaction created in the future, ledger time is {ledger_time}")]
    CreatedInFuture { ledger_time: u64 },
    #[error("duplicate of block {duplicate_of}")]
    Duplicate { duplicate_of: BlockIndex },
    #[error("ledger temporarily unavailable")]
    TemporarilyUnavailable,
    #[error("ledger error {error_code}: {message}")]
    GenericError { error_code: u128, message: String },
}

/// Candid encoding for one ledger's ICRC-1/ICRC-2 interface.
pub trait IcrcLedgerCodec: Send + Sync {
    fn encode_transfer(&self, arg: &TransferArg) -> Result<Vec<u8>, RpcError>;
    fn decode_transfer(&self, bytes: &[u8]) -> Result<TransferArg, RpcError>;

    fn encode_approve(&self, arg: &ApproveArgs) -> Result<Vec<u8>, RpcError>;
    fn decode_approve(&self, bytes: &[u8]) -> Result<ApproveArgs, RpcError>;

    fn encode_transfer_from(&self, arg: &TransferFromArgs) -> Result<Vec<u8>, RpcError>;
    fn decode_transfer_from(&self, bytes: &[u8]) -> Result<TransferFromArgs, RpcError>;

    /// Decodes the reply of `method` into a block index or the ledger's error.
    fn decode_call_result(
        &self,
        method: &str,
        reply: &[u8],
    ) -> Result<Result<BlockIndex, LedgerCallError>, RpcError>;

    /// Argument for `icrc1_metadata` (an empty candid tuple for most ledgers).
    fn encode_metadata_request(&self) -> Vec<u8>;
    fn decode_metadata(&self, reply: &[u8]) -> Result<TokenMetadata, RpcError>;
}
