use std::sync::{Arc, Mutex};
use std::time::Duration;

use icrc_rpc::{Blob, CallCanisterParams, Clock, Principal, SystemClock};
use serde::Deserialize;
use serde_bytes::ByteBuf;

use crate::certificate::{Certificate, RootKey};
use crate::content_map::{
    encode_call_content, encode_cbor, CallContent, ReadStateContent, SignedEnvelope,
    REQUEST_TYPE_READ_STATE,
};
use crate::error::AgentError;
use crate::expiry::{call_hash, ExpiryCache};
use crate::identity::Identity;
use crate::polling::{millis, PollStrategy};
use crate::request_id::{leb128_decode, RequestId};
use crate::transport::{SubmitResponse, Transport};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(with = "millis")]
    pub ingress_expiry: Duration,
    #[serde(with = "millis")]
    pub certificate_max_skew: Duration,
    pub poll: PollStrategy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ingress_expiry: Duration::from_secs(5 * 60),
            certificate_max_skew: Duration::from_secs(5 * 60),
            poll: PollStrategy::default(),
        }
    }
}

/// A certified call outcome: the reply plus the evidence both ends verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub request_id: RequestId,
    pub certificate: Vec<u8>,
    pub content_map: Vec<u8>,
    pub reply: Vec<u8>,
}

impl CallOutcome {
    pub fn to_result(&self) -> icrc_rpc::CallCanisterResult {
        icrc_rpc::CallCanisterResult {
            certificate: Blob::from(self.certificate.clone()),
            content_map: Blob::from(self.content_map.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RequestStatus {
    Replied(Vec<u8>),
    Pending(String),
}

/// Signs calls, submits them and verifies the certified outcome.
///
/// The expiry cache lives here rather than in a global so independent
/// sessions never observe each other's nonces.
pub struct Agent {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn Identity>,
    root_key: Option<RootKey>,
    clock: Arc<dyn Clock>,
    config: AgentConfig,
    expiry_cache: Mutex<ExpiryCache>,
}

pub struct AgentBuilder {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn Identity>,
    root_key: Option<RootKey>,
    clock: Arc<dyn Clock>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn root_key(mut self, root_key: RootKey) -> Self {
        self.root_key = Some(root_key);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            transport: self.transport,
            identity: self.identity,
            root_key: self.root_key,
            clock: self.clock,
            config: self.config,
            expiry_cache: Mutex::new(ExpiryCache::new()),
        }
    }
}

impl Agent {
    pub fn builder(transport: Arc<dyn Transport>, identity: Arc<dyn Identity>) -> AgentBuilder {
        AgentBuilder {
            transport,
            identity,
            root_key: None,
            clock: Arc::new(SystemClock),
            config: AgentConfig::default(),
        }
    }

    pub fn sender(&self) -> Principal {
        self.identity.sender()
    }

    pub fn root_key(&self) -> Option<&RootKey> {
        self.root_key.as_ref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Convenience for plain update calls without a nonce.
    pub async fn update(
        &self,
        canister_id: &Principal,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<Vec<u8>, AgentError> {
        let params = CallCanisterParams {
            canister_id: canister_id.clone(),
            sender: self.sender(),
            method: method.to_string(),
            arg: Blob::from(arg),
            nonce: None,
        };
        self.call(&params).await.map(|outcome| outcome.reply)
    }

    pub async fn call(&self, params: &CallCanisterParams) -> Result<CallOutcome, AgentError> {
        let sender = self.identity.sender();
        if sender != params.sender {
            return Err(AgentError::SenderMismatch {
                expected: sender.to_text(),
                actual: params.sender.to_text(),
            });
        }
        let root_key = self.root_key.as_ref().ok_or(AgentError::MissingRootKey)?;

        let ingress_expiry = self.ingress_expiry(params)?;
        let content = CallContent::from_params(params, ingress_expiry);
        let request_id = RequestId::of_call(&content);
        let envelope = self.sign_envelope(&content, &request_id)?;

        log::debug!(
            "agent(call): {} {} request_id={}",
            params.canister_id,
            params.method,
            request_id
        );
        let submitted = self.transport.call(&params.canister_id, envelope).await?;

        let (certificate, reply) = match submitted {
            SubmitResponse::Rejected { reject_code, reject_message } => {
                return Err(AgentError::Rejected { code: reject_code, message: reject_message });
            }
            SubmitResponse::Certified { certificate } => {
                match self.certified_status(&certificate, root_key, &params.canister_id, &request_id)? {
                    RequestStatus::Replied(reply) => (certificate, reply),
                    RequestStatus::Pending(status) => {
                        log::debug!("agent(call): synchronous status {status}, polling");
                        self.poll(root_key, &params.canister_id, &request_id).await?
                    }
                }
            }
            SubmitResponse::Accepted => self.poll(root_key, &params.canister_id, &request_id).await?,
        };

        Ok(CallOutcome {
            request_id,
            certificate,
            content_map: encode_call_content(&content)?,
            reply,
        })
    }

    fn ingress_expiry(&self, params: &CallCanisterParams) -> Result<u64, AgentError> {
        let now = self.clock.now_nanos();
        let proposed = now
            .saturating_add(u64::try_from(self.config.ingress_expiry.as_nanos()).unwrap_or(u64::MAX));
        let Some(hash) = call_hash(params) else {
            return Ok(proposed);
        };
        let mut cache = self.expiry_cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.resolve(hash, proposed, now)
    }

    fn sign_envelope<T: serde::Serialize>(
        &self,
        content: &T,
        request_id: &RequestId,
    ) -> Result<Vec<u8>, AgentError> {
        let envelope = SignedEnvelope {
            content,
            sender_pubkey: self.identity.public_key().map(ByteBuf::from),
            sender_sig: self.identity.sign(&request_id.signable()).map(ByteBuf::from),
        };
        encode_cbor(&envelope)
    }

    async fn poll(
        &self,
        root_key: &RootKey,
        canister_id: &Principal,
        request_id: &RequestId,
    ) -> Result<(Vec<u8>, Vec<u8>), AgentError> {
        let mut backoff = self.config.poll.backoff();
        loop {
            let Some(delay) = backoff.next_delay() else {
                return Err(AgentError::Timeout { request_id: request_id.to_hex() });
            };
            tokio::time::sleep(delay).await;

            let content = ReadStateContent {
                request_type: REQUEST_TYPE_READ_STATE.to_string(),
                sender: self.identity.sender().as_slice().to_vec(),
                ingress_expiry: self.clock.now_nanos().saturating_add(
                    u64::try_from(self.config.ingress_expiry.as_nanos()).unwrap_or(u64::MAX),
                ),
                paths: vec![vec![
                    ByteBuf::from(b"request_status".to_vec()),
                    ByteBuf::from(request_id.as_bytes().to_vec()),
                ]],
            };
            let read_id = RequestId::of_read_state(&content);
            let envelope = self.sign_envelope(&content, &read_id)?;
            let certificate = self.transport.read_state(canister_id, envelope).await?;

            match self.certified_status(&certificate, root_key, canister_id, request_id)? {
                RequestStatus::Replied(reply) => return Ok((certificate, reply)),
                RequestStatus::Pending(status) => {
                    log::trace!("agent(poll): request_id={request_id} status={status}");
                }
            }
        }
    }

    fn certified_status(
        &self,
        certificate: &[u8],
        root_key: &RootKey,
        canister_id: &Principal,
        request_id: &RequestId,
    ) -> Result<RequestStatus, AgentError> {
        let certificate = Certificate::from_cbor(certificate)?;
        certificate.verify(root_key, canister_id)?;
        certificate.verify_time(self.clock.now_nanos(), self.config.certificate_max_skew)?;
        request_status(&certificate, request_id)
    }
}

/// Reads `request_status/<id>` from an already verified certificate.
pub(crate) fn request_status(
    certificate: &Certificate,
    request_id: &RequestId,
) -> Result<RequestStatus, AgentError> {
    use crate::hash_tree::LookupResult;

    let id = request_id.as_bytes().as_slice();
    let path = |leaf: &'static [u8]| status_path(id, leaf);

    let status = match certificate.lookup(&path(b"status")) {
        LookupResult::Found(status) => String::from_utf8_lossy(status).into_owned(),
        LookupResult::Absent | LookupResult::Unknown => return Ok(RequestStatus::Pending("unknown".into())),
        LookupResult::Error => return Err(AgentError::InvalidStatus { status: "malformed".into() }),
    };

    match status.as_str() {
        "replied" => match certificate.lookup(&path(b"reply")) {
            LookupResult::Found(reply) if !reply.is_empty() => Ok(RequestStatus::Replied(reply.to_vec())),
            _ => Err(AgentError::InvalidReply),
        },
        "rejected" => {
            let code = match certificate.lookup(&path(b"reject_code")) {
                LookupResult::Found(raw) => leb128_decode(raw).unwrap_or_default(),
                _ => 0,
            };
            let message = match certificate.lookup(&path(b"reject_message")) {
                LookupResult::Found(raw) => String::from_utf8_lossy(raw).into_owned(),
                _ => String::new(),
            };
            Err(AgentError::Rejected { code, message })
        }
        "done" => Err(AgentError::InvalidStatus { status }),
        _ => Ok(RequestStatus::Pending(status)),
    }
}

fn status_path<'a>(request_id: &'a [u8], leaf: &'a [u8]) -> [&'a [u8]; 3] {
    [b"request_status", request_id, leaf]
}
