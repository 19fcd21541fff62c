//! ICRC-1/ICRC-2 ledger calls through a connected signer.

use std::sync::Arc;
use std::time::Duration;

use icrc_agent::{decode_call_response, RootKey};
use icrc_rpc::{
    ApproveArgs, Blob, BlockIndex, CallCanisterParams, CallCanisterResult, Clock,
    IcrcLedgerCodec, Principal, SystemClock, TransferArg, TransferFromArgs, ICRC1_TRANSFER,
    ICRC2_APPROVE, ICRC2_TRANSFER_FROM,
};

use crate::error::RelyingPartyError;
use crate::relying_party::RelyingParty;
use crate::request::RequestOptions;

pub const ICP_LEDGER_CANISTER_ID: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

/// Encodes ledger arguments with `codec`, has the signer execute the call
/// and verifies the returned certificate against `root_key` before decoding
/// the block index.
pub struct IcrcLedger {
    relying_party: RelyingParty,
    ledger_id: Principal,
    codec: Arc<dyn IcrcLedgerCodec>,
    root_key: RootKey,
    clock: Arc<dyn Clock>,
    max_skew: Duration,
}

impl IcrcLedger {
    pub fn new(
        relying_party: RelyingParty,
        ledger_id: Principal,
        codec: Arc<dyn IcrcLedgerCodec>,
        root_key: RootKey,
    ) -> Self {
        Self {
            relying_party,
            ledger_id,
            codec,
            root_key,
            clock: Arc::new(SystemClock),
            max_skew: Duration::from_secs(5 * 60),
        }
    }

    /// The ICP ledger.
    pub fn icp(
        relying_party: RelyingParty,
        codec: Arc<dyn IcrcLedgerCodec>,
        root_key: RootKey,
    ) -> Result<Self, RelyingPartyError> {
        let ledger_id = Principal::from_text(ICP_LEDGER_CANISTER_ID)?;
        Ok(Self::new(relying_party, ledger_id, codec, root_key))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger_id(&self) -> &Principal {
        &self.ledger_id
    }

    pub async fn transfer(
        &self,
        owner: &Principal,
        arg: &TransferArg,
        options: &RequestOptions,
    ) -> Result<BlockIndex, RelyingPartyError> {
        let arg = self.codec.encode_transfer(arg)?;
        self.call(owner, ICRC1_TRANSFER, arg, options).await
    }

    pub async fn approve(
        &self,
        owner: &Principal,
        arg: &ApproveArgs,
        options: &RequestOptions,
    ) -> Result<BlockIndex, RelyingPartyError> {
        let arg = self.codec.encode_approve(arg)?;
        self.call(owner, ICRC2_APPROVE, arg, options).await
    }

    pub async fn transfer_from(
        &self,
        owner: &Principal,
        arg: &TransferFromArgs,
        options: &RequestOptions,
    ) -> Result<BlockIndex, RelyingPartyError> {
        let arg = self.codec.encode_transfer_from(arg)?;
        self.call(owner, ICRC2_TRANSFER_FROM, arg, options).await
    }

    async fn call(
        &self,
        owner: &Principal,
        method: &str,
        arg: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<BlockIndex, RelyingPartyError> {
        let params = CallCanisterParams {
            canister_id: self.ledger_id.clone(),
            sender: owner.clone(),
            method: method.to_string(),
            arg: Blob::from(arg),
            nonce: None,
        };
        let result = self.relying_party.call(&params, options).await?;
        self.decode_response(&params, &result)
    }

    /// Verifies `result` for `params` and decodes the ledger's answer.
    pub fn decode_response(
        &self,
        params: &CallCanisterParams,
        result: &CallCanisterResult,
    ) -> Result<BlockIndex, RelyingPartyError> {
        let reply = decode_call_response(
            params,
            result,
            &self.root_key,
            self.clock.now_nanos(),
            self.max_skew,
        )?;
        let block = self.codec.decode_call_result(&params.method, &reply)??;
        log::debug!("rp(ledger): {} landed in block {block}", params.method);
        Ok(block)
    }
}
