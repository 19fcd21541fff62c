//! Fixtures shared by the signer's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use icrc_agent::testing::TestReplica;
use icrc_agent::{Agent, Ed25519Identity, Identity};
use icrc_rpc::{
    ApproveArgs, BlockIndex, Blob, CallCanisterParams, IcrcAccount, IcrcLedgerCodec,
    LedgerCallError, ManualClock, MessageTarget, PermissionState, Principal, RpcError,
    TokenMetadata, TransferArg, TransferFromArgs, ICRC1_TRANSFER,
};
use serde_json::Value;

use crate::consent::{
    ConsentInfo, ConsentMessageRequest, ConsentMessageResponse, ConsentMessageSource,
    ResultConsentInfo, TokenMetadataSource,
};
use crate::error::SignerError;
use crate::prompts::{
    CallCanisterPayload, ConsentDecision, ConsentMessagePayload, PermissionsPromptPayload,
    Prompt, Responder,
};

pub(crate) const NOW_MS: u64 = 1_700_000_000_000;
pub(crate) const ORIGIN: &str = "https://dapp.example";

#[derive(Default)]
pub(crate) struct Outbox(Mutex<Vec<(Value, String)>>);

impl Outbox {
    pub(crate) fn sent(&self) -> Vec<(Value, String)> {
        self.0.lock().expect("outbox").clone()
    }

    pub(crate) fn last(&self) -> Value {
        self.sent().last().map(|(data, _)| data.clone()).expect("a posted message")
    }
}

impl MessageTarget for Outbox {
    fn post_message(&self, data: Value, target_origin: &str) {
        self.0.lock().expect("outbox").push((data, target_origin.to_string()));
    }
}

/// Ledger codec that uses JSON in place of candid.
pub(crate) struct JsonLedgerCodec;

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, RpcError> {
    serde_json::to_vec(value).map_err(RpcError::codec)
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    serde_json::from_slice(bytes).map_err(RpcError::codec)
}

impl IcrcLedgerCodec for JsonLedgerCodec {
    fn encode_transfer(&self, arg: &TransferArg) -> Result<Vec<u8>, RpcError> {
        to_json(arg)
    }
    fn decode_transfer(&self, bytes: &[u8]) -> Result<TransferArg, RpcError> {
        from_json(bytes)
    }
    fn encode_approve(&self, arg: &ApproveArgs) -> Result<Vec<u8>, RpcError> {
        to_json(arg)
    }
    fn decode_approve(&self, bytes: &[u8]) -> Result<ApproveArgs, RpcError> {
        from_json(bytes)
    }
    fn encode_transfer_from(&self, arg: &TransferFromArgs) -> Result<Vec<u8>, RpcError> {
        to_json(arg)
    }
    fn decode_transfer_from(&self, bytes: &[u8]) -> Result<TransferFromArgs, RpcError> {
        from_json(bytes)
    }
    fn decode_call_result(
        &self,
        _method: &str,
        reply: &[u8],
    ) -> Result<Result<BlockIndex, LedgerCallError>, RpcError> {
        from_json(reply)
    }
    fn encode_metadata_request(&self) -> Vec<u8> {
        b"null".to_vec()
    }
    fn decode_metadata(&self, reply: &[u8]) -> Result<TokenMetadata, RpcError> {
        from_json(reply)
    }
}

pub(crate) enum CannedConsent {
    Message(ConsentMessageResponse),
    Fail(String),
}

pub(crate) struct StubConsentSource {
    answer: CannedConsent,
    calls: AtomicUsize,
}

impl StubConsentSource {
    pub(crate) fn answering(answer: CannedConsent) -> Arc<Self> {
        Arc::new(Self { answer, calls: AtomicUsize::new(0) })
    }

    pub(crate) fn ok(message: &str) -> Arc<Self> {
        Self::answering(CannedConsent::Message(Ok(ConsentInfo::generic(message, "en"))))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsentMessageSource for StubConsentSource {
    async fn consent_message(
        &self,
        _canister_id: &Principal,
        _request: &ConsentMessageRequest,
    ) -> Result<ConsentMessageResponse, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            CannedConsent::Message(response) => Ok(response.clone()),
            CannedConsent::Fail(message) => Err(SignerError::consent_source(message)),
        }
    }
}

pub(crate) struct StubMetadata(pub(crate) Option<TokenMetadata>);

#[async_trait]
impl TokenMetadataSource for StubMetadata {
    async fn token_metadata(&self, _ledger_id: &Principal) -> Result<TokenMetadata, SignerError> {
        self.0.clone().ok_or_else(|| SignerError::metadata("ledger unreachable"))
    }
}

pub(crate) fn icp() -> TokenMetadata {
    TokenMetadata { name: "Internet Computer".into(), symbol: "ICP".into(), decimals: 8, fee: 10_000 }
}

pub(crate) struct Fixture {
    pub(crate) clock: ManualClock,
    pub(crate) replica: Arc<TestReplica>,
    pub(crate) agent: Arc<Agent>,
    pub(crate) owner: Principal,
}

pub(crate) fn fixture() -> Fixture {
    let clock = ManualClock::new(NOW_MS);
    let replica = Arc::new(TestReplica::new(Arc::new(clock.clone())));
    let identity = Arc::new(Ed25519Identity::from_secret([7u8; 32]));
    let owner = identity.sender();
    let agent = Arc::new(
        Agent::builder(replica.clone(), identity)
            .root_key(replica.root_key())
            .clock(Arc::new(clock.clone()))
            .build(),
    );
    Fixture { clock, replica, agent, owner }
}

pub(crate) fn ledger_id() -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 2, 1, 1]).expect("principal")
}

pub(crate) fn transfer_params(sender: &Principal) -> CallCanisterParams {
    let arg = TransferArg {
        from_subaccount: None,
        to: IcrcAccount::new(Principal::management()),
        amount: 150_000_000,
        fee: None,
        memo: None,
        created_at_time: None,
    };
    CallCanisterParams {
        canister_id: ledger_id(),
        sender: sender.clone(),
        method: ICRC1_TRANSFER.into(),
        arg: Blob::new(JsonLedgerCodec.encode_transfer(&arg).expect("encode")),
        nonce: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Answer {
    Approve,
    Reject,
    /// Keep the responder without answering.
    Hold,
    /// Drop the responder.
    Ignore,
}

pub(crate) struct ConsentRecorder {
    answer: Answer,
    pub(crate) seen: Mutex<Vec<String>>,
    pub(crate) shown: Mutex<Vec<ResultConsentInfo>>,
    pub(crate) held: Mutex<Vec<Responder<ConsentDecision>>>,
}

impl ConsentRecorder {
    pub(crate) fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer,
            seen: Mutex::new(Vec::new()),
            shown: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("seen").clone()
    }

    pub(crate) fn shown(&self) -> Vec<ResultConsentInfo> {
        self.shown.lock().expect("shown").clone()
    }
}

impl Prompt<ConsentMessagePayload> for ConsentRecorder {
    fn prompt(&self, payload: ConsentMessagePayload) {
        let mut seen = self.seen.lock().expect("seen");
        match payload {
            ConsentMessagePayload::Loading { .. } => seen.push("loading".into()),
            ConsentMessagePayload::Error { details, .. } => {
                seen.push(format!("error: {}", details.unwrap_or_default()))
            }
            ConsentMessagePayload::Result { consent_info, respond, .. } => {
                seen.push("result".into());
                self.shown.lock().expect("shown").push(consent_info);
                match self.answer {
                    Answer::Approve => respond.respond(ConsentDecision::Approve),
                    Answer::Reject => respond.respond(ConsentDecision::Reject),
                    Answer::Hold => self.held.lock().expect("held").push(respond),
                    Answer::Ignore => drop(respond),
                }
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct CallRecorder(Mutex<Vec<String>>);

impl CallRecorder {
    pub(crate) fn seen(&self) -> Vec<String> {
        self.0.lock().expect("seen").clone()
    }
}

impl Prompt<CallCanisterPayload> for CallRecorder {
    fn prompt(&self, payload: CallCanisterPayload) {
        let label = match payload {
            CallCanisterPayload::Executing { .. } => "executing",
            CallCanisterPayload::Result { .. } => "result",
            CallCanisterPayload::Error { .. } => "error",
        };
        self.0.lock().expect("seen").push(label.into());
    }
}

/// A permissions prompt that answers every requested scope with `state`.
pub(crate) fn permissions_answering(
    state: PermissionState,
) -> impl Fn(PermissionsPromptPayload) + Send + Sync {
    move |payload: PermissionsPromptPayload| {
        let confirmed =
            payload.requested_scopes.iter().map(|scope| icrc_rpc::Scope { state, ..*scope }).collect();
        payload.confirm.respond(confirmed);
    }
}
