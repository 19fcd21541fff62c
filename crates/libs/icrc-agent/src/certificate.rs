//! Certificates: a hash tree signed by the platform root key, optionally
//! through a subnet delegation.

use std::collections::BTreeMap;
use std::time::Duration;

use ed25519_dalek::{Signature, VerifyingKey};
use icrc_rpc::Principal;
use serde_bytes::ByteBuf;
use serde_cbor::Value;

use crate::error::CertificateError;
use crate::hash_tree::{HashTree, LookupResult};
use crate::request_id::leb128_decode;

const STATE_ROOT_DOMAIN_SEPARATOR: &[u8] = b"\x0Dic-state-root";
const ED25519_DER_PREFIX: [u8; 12] =
    [0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00];

/// A public key trusted to sign certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootKey(VerifyingKey);

impl RootKey {
    /// Accepts a raw 32 byte Ed25519 key or its DER SubjectPublicKeyInfo.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let raw = match bytes.len() {
            32 => bytes,
            44 if bytes[..12] == ED25519_DER_PREFIX => &bytes[12..],
            len => {
                return Err(CertificateError::invalid_key(format!(
                    "expected 32 raw or 44 DER bytes, got {len}"
                )))
            }
        };
        let mut key = [0u8; 32];
        key.copy_from_slice(raw);
        VerifyingKey::from_bytes(&key).map(Self).map_err(CertificateError::invalid_key)
    }

    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self(key)
    }

    pub fn to_der(&self) -> Vec<u8> {
        der_encode_ed25519(&self.0)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CertificateError> {
        let signature =
            Signature::from_slice(signature).map_err(|_| CertificateError::InvalidSignature)?;
        self.0
            .verify_strict(message, &signature)
            .map_err(|_| CertificateError::InvalidSignature)
    }
}

pub(crate) fn der_encode_ed25519(key: &VerifyingKey) -> Vec<u8> {
    let mut der = ED25519_DER_PREFIX.to_vec();
    der.extend_from_slice(key.as_bytes());
    der
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub subnet_id: Vec<u8>,
    pub certificate: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub tree: HashTree,
    pub signature: Vec<u8>,
    pub delegation: Option<Delegation>,
}

impl Certificate {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CertificateError> {
        let value: Value = serde_cbor::from_slice(bytes).map_err(CertificateError::decode)?;
        let Value::Map(map) = value else {
            return Err(CertificateError::decode("certificate is not a map"));
        };
        let tree = HashTree::from_cbor(field(&map, "tree")?)?;
        let signature = bytes_field(&map, "signature")?;
        let delegation = match map.get(&Value::Text("delegation".into())) {
            None | Some(Value::Null) => None,
            Some(Value::Map(inner)) => Some(Delegation {
                subnet_id: bytes_field(inner, "subnet_id")?,
                certificate: bytes_field(inner, "certificate")?,
            }),
            Some(_) => return Err(CertificateError::decode("delegation is not a map")),
        };
        Ok(Self { tree, signature, delegation })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut map = BTreeMap::new();
        map.insert(Value::Text("tree".into()), self.tree.to_cbor());
        map.insert(Value::Text("signature".into()), Value::Bytes(self.signature.clone()));
        if let Some(delegation) = &self.delegation {
            let mut inner = BTreeMap::new();
            inner.insert(Value::Text("subnet_id".into()), Value::Bytes(delegation.subnet_id.clone()));
            inner.insert(
                Value::Text("certificate".into()),
                Value::Bytes(delegation.certificate.clone()),
            );
            map.insert(Value::Text("delegation".into()), Value::Map(inner));
        }
        serde_cbor::to_vec(&Value::Map(map)).unwrap_or_default()
    }

    pub fn lookup<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        self.tree.lookup_path(path)
    }

    /// Checks the signature chain up to `root_key` and that `canister_id` is
    /// served by the signing subnet.
    pub fn verify(&self, root_key: &RootKey, canister_id: &Principal) -> Result<(), CertificateError> {
        let key = match &self.delegation {
            None => root_key.clone(),
            Some(delegation) => delegation.signing_key(root_key, canister_id)?,
        };
        key.verify(&self.signed_message(), &self.signature)
    }

    /// Rejects certificates whose `/time` is further than `max_skew` from `now_nanos`.
    pub fn verify_time(&self, now_nanos: u64, max_skew: Duration) -> Result<(), CertificateError> {
        let certificate_time = self.time()?;
        let skew = u64::try_from(max_skew.as_nanos()).unwrap_or(u64::MAX);
        if certificate_time.abs_diff(now_nanos) > skew {
            return Err(CertificateError::TimeOutOfRange {
                certificate_time,
                now: now_nanos,
                max_skew_ms: u64::try_from(max_skew.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    pub fn time(&self) -> Result<u64, CertificateError> {
        match self.lookup(&["time"]) {
            LookupResult::Found(raw) => {
                leb128_decode(raw).ok_or_else(|| CertificateError::decode("time is not leb128"))
            }
            _ => Err(CertificateError::missing_path(&[b"time".as_slice()])),
        }
    }

    fn signed_message(&self) -> Vec<u8> {
        let mut message = STATE_ROOT_DOMAIN_SEPARATOR.to_vec();
        message.extend_from_slice(&self.tree.digest());
        message
    }
}

impl Delegation {
    fn signing_key(
        &self,
        root_key: &RootKey,
        canister_id: &Principal,
    ) -> Result<RootKey, CertificateError> {
        let parent = Certificate::from_cbor(&self.certificate)?;
        if parent.delegation.is_some() {
            return Err(CertificateError::NestedDelegation);
        }
        root_key.verify(&parent.signed_message(), &parent.signature)?;

        let ranges_path: [&[u8]; 3] = [b"subnet", &self.subnet_id, b"canister_ranges"];
        let LookupResult::Found(raw_ranges) = parent.lookup(&ranges_path) else {
            return Err(CertificateError::missing_path(&ranges_path));
        };
        let ranges: Vec<(ByteBuf, ByteBuf)> =
            serde_cbor::from_slice(raw_ranges).map_err(CertificateError::decode)?;
        let canister = canister_id.as_slice();
        let in_range = ranges
            .iter()
            .any(|(low, high)| low.as_slice() <= canister && canister <= high.as_slice());
        if !in_range {
            return Err(CertificateError::CanisterNotInRange { canister_id: canister_id.to_text() });
        }

        let key_path: [&[u8]; 3] = [b"subnet", &self.subnet_id, b"public_key"];
        let LookupResult::Found(public_key) = parent.lookup(&key_path) else {
            return Err(CertificateError::missing_path(&key_path));
        };
        RootKey::from_bytes(public_key)
    }
}

fn field<'a>(map: &'a BTreeMap<Value, Value>, name: &str) -> Result<&'a Value, CertificateError> {
    map.get(&Value::Text(name.to_string()))
        .ok_or_else(|| CertificateError::decode(format!("missing {name}")))
}

fn bytes_field(map: &BTreeMap<Value, Value>, name: &str) -> Result<Vec<u8>, CertificateError> {
    match field(map, name)? {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        _ => Err(CertificateError::decode(format!("{name} is not a byte string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer as _, SigningKey};

    fn sign(key: &SigningKey, tree: HashTree, delegation: Option<Delegation>) -> Certificate {
        let mut message = STATE_ROOT_DOMAIN_SEPARATOR.to_vec();
        message.extend_from_slice(&tree.digest());
        Certificate { tree, signature: key.sign(&message).to_bytes().to_vec(), delegation }
    }

    fn canister(last: u8) -> Principal {
        Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, last, 1, 1]).expect("principal")
    }

    fn delegated(root: &SigningKey, subnet: &SigningKey, nested: bool) -> Certificate {
        let ranges = serde_cbor::to_vec(&vec![(
            ByteBuf::from(canister(0).as_slice().to_vec()),
            ByteBuf::from(canister(9).as_slice().to_vec()),
        )])
        .expect("ranges");
        let subnet_tree = HashTree::labeled(
            "subnet",
            HashTree::labeled(
                b"subnet-1".to_vec(),
                HashTree::fork(
                    HashTree::labeled("canister_ranges", HashTree::leaf(ranges)),
                    HashTree::labeled(
                        "public_key",
                        HashTree::leaf(der_encode_ed25519(&subnet.verifying_key())),
                    ),
                ),
            ),
        );
        let inner_delegation = nested
            .then(|| Delegation { subnet_id: b"other".to_vec(), certificate: Vec::new() });
        let parent = sign(root, subnet_tree, inner_delegation);
        sign(
            subnet,
            HashTree::labeled("time", HashTree::leaf(vec![1])),
            Some(Delegation { subnet_id: b"subnet-1".to_vec(), certificate: parent.to_cbor() }),
        )
    }

    #[test]
    fn der_and_raw_keys_are_equivalent() {
        let key = SigningKey::from_bytes(&[1u8; 32]).verifying_key();
        let raw = RootKey::from_bytes(key.as_bytes()).expect("raw");
        let der = RootKey::from_bytes(&der_encode_ed25519(&key)).expect("der");
        assert_eq!(raw, der);
        assert!(RootKey::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn delegated_certificate_verifies_for_canisters_in_range() {
        let root = SigningKey::from_bytes(&[1u8; 32]);
        let subnet = SigningKey::from_bytes(&[2u8; 32]);
        let certificate = delegated(&root, &subnet, false);
        let decoded = Certificate::from_cbor(&certificate.to_cbor()).expect("decode");
        let root_key = RootKey::from_verifying_key(root.verifying_key());

        decoded.verify(&root_key, &canister(5)).expect("in range");
        assert_eq!(
            decoded.verify(&root_key, &canister(10)),
            Err(CertificateError::CanisterNotInRange { canister_id: canister(10).to_text() })
        );
    }

    #[test]
    fn nested_delegations_are_refused() {
        let root = SigningKey::from_bytes(&[1u8; 32]);
        let subnet = SigningKey::from_bytes(&[2u8; 32]);
        let certificate = delegated(&root, &subnet, true);
        let root_key = RootKey::from_verifying_key(root.verifying_key());
        assert_eq!(
            certificate.verify(&root_key, &canister(5)),
            Err(CertificateError::NestedDelegation)
        );
    }

    #[test]
    fn subnet_key_alone_is_not_trusted_as_root() {
        let root = SigningKey::from_bytes(&[1u8; 32]);
        let subnet = SigningKey::from_bytes(&[2u8; 32]);
        let certificate = delegated(&root, &subnet, false);
        let wrong_root = RootKey::from_verifying_key(subnet.verifying_key());
        assert_eq!(
            certificate.verify(&wrong_root, &canister(5)),
            Err(CertificateError::InvalidSignature)
        );
    }

    #[test]
    fn time_must_be_within_skew() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let now = 1_700_000_000_000_000_000u64;
        let certificate = sign(
            &key,
            HashTree::labeled("time", HashTree::leaf(crate::request_id::leb128_encode(now))),
            None,
        );
        let skew = Duration::from_secs(300);
        certificate.verify_time(now + 1_000, skew).expect("fresh");
        assert!(matches!(
            certificate.verify_time(now + 301_000_000_000, skew),
            Err(CertificateError::TimeOutOfRange { .. })
        ));
    }
}
