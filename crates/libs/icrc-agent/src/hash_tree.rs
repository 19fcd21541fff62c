//! Certified state hash trees.

use serde_cbor::Value;
use sha2::{Digest, Sha256};

use crate::error::CertificateError;

const DOMAIN_EMPTY: &[u8] = b"\x11ic-hashtree-empty";
const DOMAIN_FORK: &[u8] = b"\x10ic-hashtree-fork";
const DOMAIN_LABELED: &[u8] = b"\x13ic-hashtree-labeled";
const DOMAIN_LEAF: &[u8] = b"\x10ic-hashtree-leaf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<HashTree>, Box<HashTree>),
    Labeled(Vec<u8>, Box<HashTree>),
    Leaf(Vec<u8>),
    Pruned([u8; 32]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult<'a> {
    Found(&'a [u8]),
    /// Provably not in the tree.
    Absent,
    /// Hidden behind a pruned subtree.
    Unknown,
    /// The path ends on an inner node.
    Error,
}

impl HashTree {
    pub fn fork(left: HashTree, right: HashTree) -> Self {
        Self::Fork(Box::new(left), Box::new(right))
    }

    pub fn labeled(label: impl Into<Vec<u8>>, subtree: HashTree) -> Self {
        Self::Labeled(label.into(), Box::new(subtree))
    }

    pub fn leaf(value: impl Into<Vec<u8>>) -> Self {
        Self::Leaf(value.into())
    }

    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        match self {
            Self::Empty => hasher.update(DOMAIN_EMPTY),
            Self::Fork(left, right) => {
                hasher.update(DOMAIN_FORK);
                hasher.update(left.digest());
                hasher.update(right.digest());
            }
            Self::Labeled(label, subtree) => {
                hasher.update(DOMAIN_LABELED);
                hasher.update(label);
                hasher.update(subtree.digest());
            }
            Self::Leaf(value) => {
                hasher.update(DOMAIN_LEAF);
                hasher.update(value);
            }
            Self::Pruned(digest) => return *digest,
        }
        hasher.finalize().into()
    }

    pub fn lookup_path<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        let Some((label, rest)) = path.split_first() else {
            return match self {
                Self::Leaf(value) => LookupResult::Found(value),
                Self::Empty => LookupResult::Absent,
                Self::Pruned(_) => LookupResult::Unknown,
                Self::Labeled(..) | Self::Fork(..) => LookupResult::Error,
            };
        };

        let mut children = Vec::new();
        self.flatten_forks(&mut children);

        let mut saw_pruned = false;
        for child in children {
            match child {
                Self::Labeled(candidate, subtree) if candidate.as_slice() == label.as_ref() => {
                    return subtree.lookup_path(rest);
                }
                Self::Pruned(_) => saw_pruned = true,
                _ => {}
            }
        }
        if saw_pruned {
            LookupResult::Unknown
        } else {
            LookupResult::Absent
        }
    }

    fn flatten_forks<'a>(&'a self, out: &mut Vec<&'a HashTree>) {
        match self {
            Self::Fork(left, right) => {
                left.flatten_forks(out);
                right.flatten_forks(out);
            }
            Self::Empty => {}
            other => out.push(other),
        }
    }

    /// Decodes the `[tag, ...]` array form used inside certificates.
    pub fn from_cbor(value: &Value) -> Result<Self, CertificateError> {
        let Value::Array(items) = value else {
            return Err(CertificateError::invalid_tree("node is not an array"));
        };
        let tag = match items.first() {
            Some(Value::Integer(tag)) => *tag,
            _ => return Err(CertificateError::invalid_tree("node has no tag")),
        };
        match (tag, items.len()) {
            (0, 1) => Ok(Self::Empty),
            (1, 3) => Ok(Self::fork(Self::from_cbor(&items[1])?, Self::from_cbor(&items[2])?)),
            (2, 3) => Ok(Self::labeled(bytes(&items[1])?, Self::from_cbor(&items[2])?)),
            (3, 2) => Ok(Self::leaf(bytes(&items[1])?)),
            (4, 2) => {
                let digest: [u8; 32] = bytes(&items[1])?
                    .try_into()
                    .map_err(|_| CertificateError::invalid_tree("pruned digest is not 32 bytes"))?;
                Ok(Self::Pruned(digest))
            }
            (tag, len) => {
                Err(CertificateError::invalid_tree(format!("unknown node {tag} with {len} items")))
            }
        }
    }

    pub fn to_cbor(&self) -> Value {
        match self {
            Self::Empty => Value::Array(vec![Value::Integer(0)]),
            Self::Fork(left, right) => {
                Value::Array(vec![Value::Integer(1), left.to_cbor(), right.to_cbor()])
            }
            Self::Labeled(label, subtree) => Value::Array(vec![
                Value::Integer(2),
                Value::Bytes(label.clone()),
                subtree.to_cbor(),
            ]),
            Self::Leaf(value) => Value::Array(vec![Value::Integer(3), Value::Bytes(value.clone())]),
            Self::Pruned(digest) => {
                Value::Array(vec![Value::Integer(4), Value::Bytes(digest.to_vec())])
            }
        }
    }
}

fn bytes(value: &Value) -> Result<Vec<u8>, CertificateError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        _ => Err(CertificateError::invalid_tree("expected a byte string")),
    }
}
