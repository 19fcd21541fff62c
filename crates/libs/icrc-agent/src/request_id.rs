//! Representation-independent hashing of request content.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::content_map::{CallContent, ReadStateContent};

/// Domain separator prefixed to the request id before signing.
pub const IC_REQUEST_DOMAIN_SEPARATOR: &[u8] = b"\x0Aic-request";

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The bytes an identity signs for this request.
    pub fn signable(&self) -> Vec<u8> {
        let mut message = IC_REQUEST_DOMAIN_SEPARATOR.to_vec();
        message.extend_from_slice(&self.0);
        message
    }

    pub fn of_call(content: &CallContent) -> Self {
        let mut fields = vec![
            field("request_type", text_hash(&content.request_type)),
            field("canister_id", blob_hash(&content.canister_id)),
            field("method_name", text_hash(&content.method_name)),
            field("arg", blob_hash(&content.arg)),
            field("sender", blob_hash(&content.sender)),
            field("ingress_expiry", nat_hash(content.ingress_expiry)),
        ];
        if let Some(nonce) = &content.nonce {
            fields.push(field("nonce", blob_hash(nonce)));
        }
        Self(hash_fields(fields))
    }

    pub fn of_read_state(content: &ReadStateContent) -> Self {
        let paths: Vec<u8> = content
            .paths
            .iter()
            .flat_map(|path| {
                let labels: Vec<u8> =
                    path.iter().flat_map(|label| blob_hash(label)).collect();
                Sha256::digest(labels).to_vec()
            })
            .collect();
        Self(hash_fields(vec![
            field("request_type", text_hash(&content.request_type)),
            field("sender", blob_hash(&content.sender)),
            field("ingress_expiry", nat_hash(content.ingress_expiry)),
            field("paths", Sha256::digest(paths).into()),
        ]))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.to_hex())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn field(key: &str, value_hash: [u8; 32]) -> [u8; 64] {
    let mut pair = [0u8; 64];
    pair[..32].copy_from_slice(&text_hash(key));
    pair[32..].copy_from_slice(&value_hash);
    pair
}

fn hash_fields(mut fields: Vec<[u8; 64]>) -> [u8; 32] {
    fields.sort_unstable();
    let mut hasher = Sha256::new();
    for pair in &fields {
        hasher.update(pair);
    }
    hasher.finalize().into()
}

fn text_hash(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

fn blob_hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn nat_hash(value: u64) -> [u8; 32] {
    Sha256::digest(leb128_encode(value)).into()
}

pub fn leb128_encode(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn leb128_decode(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    for (index, byte) in bytes.iter().enumerate() {
        let shift = u32::try_from(index * 7).ok()?;
        if shift >= 64 {
            return None;
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return (index + 1 == bytes.len()).then_some(value);
        }
    }
    None
}
