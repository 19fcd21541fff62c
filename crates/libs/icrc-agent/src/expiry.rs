//! Nonce-keyed ingress expiry reuse.
//!
//! A call resubmitted with the same nonce must carry the same ingress expiry,
//! otherwise it would hash to a new request id and could execute twice. The
//! first expiry handed out for a call identity is remembered and reused until
//! it elapses; after that the identity is dead and further calls fail.

use std::collections::HashMap;

use icrc_rpc::CallCanisterParams;
use sha2::{Digest, Sha256};

use crate::error::AgentError;

pub type CallHash = [u8; 32];

/// Stable hash over (canister id, sender, method, arg, nonce). `None` when the
/// call carries no nonce and therefore takes the non-idempotent path.
pub fn call_hash(params: &CallCanisterParams) -> Option<CallHash> {
    let nonce = params.nonce.as_ref()?;
    let mut hasher = Sha256::new();
    for part in [
        params.canister_id.as_slice(),
        params.sender.as_slice(),
        params.method.as_bytes(),
        params.arg.as_slice(),
        nonce.as_slice(),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    Some(hasher.finalize().into())
}

#[derive(Debug, Default)]
pub struct ExpiryCache {
    entries: HashMap<CallHash, u64>,
}

impl ExpiryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the expiry the call must use: `proposed` on first sight, the
    /// recorded one afterwards. Fails once the recorded expiry is not in the
    /// future anymore.
    pub fn resolve(&mut self, hash: CallHash, proposed: u64, now_nanos: u64) -> Result<u64, AgentError> {
        match self.entries.get(&hash) {
            None => {
                self.entries.insert(hash, proposed);
                Ok(proposed)
            }
            Some(&recorded) if recorded <= now_nanos => Err(AgentError::ExpiredRequest),
            Some(&recorded) => Ok(recorded),
        }
    }

    pub fn get(&self, hash: &CallHash) -> Option<u64> {
        self.entries.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
