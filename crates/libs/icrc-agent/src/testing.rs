//! An in-process replica that certifies canned replies, for tests across the
//! workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use icrc_rpc::{Clock, Principal};
use serde::Deserialize;

use crate::certificate::{Certificate, RootKey};
use crate::content_map::{CallContent, ReadStateContent};
use crate::error::AgentError;
use crate::hash_tree::HashTree;
use crate::request_id::{leb128_encode, RequestId};
use crate::transport::{SubmitResponse, Transport};

#[derive(Debug, Clone)]
pub enum ReplicaBehavior {
    /// Certified reply in the synchronous response.
    Reply(Vec<u8>),
    /// HTTP 202, then `replied` after `pending_polls` read-state rounds.
    Accept { reply: Vec<u8>, pending_polls: usize },
    /// Certified `rejected` status.
    Reject { code: u64, message: String },
    /// Certified `replied` status without reply data.
    EmptyReply,
    /// The HTTP request itself fails.
    Fail(String),
}

#[derive(Deserialize)]
struct Incoming<T> {
    content: T,
}

struct PendingCall {
    reply: Vec<u8>,
    remaining_polls: usize,
}

pub struct TestReplica {
    signing_key: SigningKey,
    clock: Arc<dyn Clock>,
    behaviors: Mutex<HashMap<String, ReplicaBehavior>>,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    calls: Mutex<Vec<CallContent>>,
}

impl TestReplica {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&[42u8; 32]),
            clock,
            behaviors: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn root_key(&self) -> RootKey {
        RootKey::from_verifying_key(self.signing_key.verifying_key())
    }

    pub fn on(&self, method: &str, behavior: ReplicaBehavior) {
        self.behaviors.lock().expect("behaviors mutex poisoned").insert(method.to_string(), behavior);
    }

    /// Every call content submitted so far, in order.
    pub fn calls(&self) -> Vec<CallContent> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls().iter().filter(|call| call.method_name == method).count()
    }

    /// Signs `tree` with the replica root key.
    pub fn certify(&self, tree: HashTree) -> Vec<u8> {
        let mut message = b"\x0Dic-state-root".to_vec();
        message.extend_from_slice(&tree.digest());
        let signature = self.signing_key.sign(&message).to_bytes().to_vec();
        Certificate { tree, signature, delegation: None }.to_cbor()
    }

    /// A certificate stating `status` (and optionally `reply`) for `request_id`.
    pub fn status_certificate(&self, request_id: &RequestId, status: &str, reply: Option<&[u8]>) -> Vec<u8> {
        let mut entries = HashTree::labeled("status", HashTree::leaf(status.as_bytes().to_vec()));
        if let Some(reply) = reply {
            entries = HashTree::fork(HashTree::labeled("reply", HashTree::leaf(reply.to_vec())), entries);
        }
        self.certify(HashTree::fork(
            HashTree::labeled(
                "request_status",
                HashTree::labeled(request_id.as_bytes().to_vec(), entries),
            ),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(self.clock.now_nanos()))),
        ))
    }

    fn rejected_certificate(&self, request_id: &RequestId, code: u64, message: &str) -> Vec<u8> {
        let entries = HashTree::fork(
            HashTree::fork(
                HashTree::labeled("reject_code", HashTree::leaf(leb128_encode(code))),
                HashTree::labeled("reject_message", HashTree::leaf(message.as_bytes().to_vec())),
            ),
            HashTree::labeled("status", HashTree::leaf(b"rejected".to_vec())),
        );
        self.certify(HashTree::fork(
            HashTree::labeled(
                "request_status",
                HashTree::labeled(request_id.as_bytes().to_vec(), entries),
            ),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(self.clock.now_nanos()))),
        ))
    }
}

#[async_trait]
impl Transport for TestReplica {
    async fn call(
        &self,
        _canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<SubmitResponse, AgentError> {
        let incoming: Incoming<CallContent> =
            serde_cbor::from_slice(&envelope).map_err(AgentError::encoding)?;
        let content = incoming.content;
        let request_id = RequestId::of_call(&content);
        let behavior = self
            .behaviors
            .lock()
            .expect("behaviors mutex poisoned")
            .get(&content.method_name)
            .cloned()
            .unwrap_or(ReplicaBehavior::Fail(format!("no canned reply for {}", content.method_name)));
        self.calls.lock().expect("calls mutex poisoned").push(content);

        match behavior {
            ReplicaBehavior::Reply(reply) => Ok(SubmitResponse::Certified {
                certificate: self.status_certificate(&request_id, "replied", Some(&reply)),
            }),
            ReplicaBehavior::Accept { reply, pending_polls } => {
                self.pending
                    .lock()
                    .expect("pending mutex poisoned")
                    .insert(request_id, PendingCall { reply, remaining_polls: pending_polls });
                Ok(SubmitResponse::Accepted)
            }
            ReplicaBehavior::Reject { code, message } => Ok(SubmitResponse::Certified {
                certificate: self.rejected_certificate(&request_id, code, &message),
            }),
            ReplicaBehavior::EmptyReply => Ok(SubmitResponse::Certified {
                certificate: self.status_certificate(&request_id, "replied", None),
            }),
            ReplicaBehavior::Fail(message) => Err(AgentError::transport(message)),
        }
    }

    async fn read_state(
        &self,
        _canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<Vec<u8>, AgentError> {
        let incoming: Incoming<ReadStateContent> =
            serde_cbor::from_slice(&envelope).map_err(AgentError::encoding)?;
        let raw_id = incoming
            .content
            .paths
            .first()
            .and_then(|path| path.get(1))
            .ok_or_else(|| AgentError::transport("read_state without request id"))?;
        let id: [u8; 32] = raw_id
            .as_slice()
            .try_into()
            .map_err(|_| AgentError::transport("request id is not 32 bytes"))?;
        let request_id = RequestId(id);

        let mut pending = self.pending.lock().expect("pending mutex poisoned");
        let Some(call) = pending.get_mut(&request_id) else {
            return Ok(self.status_certificate(&request_id, "unknown", None));
        };
        if call.remaining_polls > 0 {
            call.remaining_polls -= 1;
            return Ok(self.status_certificate(&request_id, "processing", None));
        }
        let reply = call.reply.clone();
        Ok(self.status_certificate(&request_id, "replied", Some(&reply)))
    }
}
