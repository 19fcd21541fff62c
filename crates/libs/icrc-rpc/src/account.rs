use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::blob::Blob;
use crate::error::RpcError;
use crate::principal::{base32_encode, crc32, Principal};

pub const SUBACCOUNT_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Subaccount(pub [u8; SUBACCOUNT_LENGTH]);

impl Subaccount {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RpcError> {
        let array: [u8; SUBACCOUNT_LENGTH] = bytes.try_into().map_err(|_| {
            RpcError::invalid_blob(format!(
                "subaccount must be {SUBACCOUNT_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn is_default(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    pub fn as_bytes(&self) -> &[u8; SUBACCOUNT_LENGTH] {
        &self.0
    }
}

impl Serialize for Subaccount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Blob::from(&self.0[..]).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Subaccount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = Blob::deserialize(deserializer)?;
        Self::from_slice(&blob).map_err(serde::de::Error::custom)
    }
}

/// An ICRC-1 account: an owner plus an optional 32 byte subaccount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcrcAccount {
    pub owner: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<Subaccount>,
}

impl IcrcAccount {
    pub fn new(owner: Principal) -> Self {
        Self { owner, subaccount: None }
    }

    pub fn with_subaccount(owner: Principal, subaccount: Subaccount) -> Self {
        Self { owner, subaccount: Some(subaccount) }
    }

    /// ICRC-1 textual encoding: `owner` for the default subaccount, otherwise
    /// `owner-checksum.hex` with leading zero nibbles trimmed.
    pub fn to_text(&self) -> String {
        let Some(subaccount) = self.subaccount.filter(|sub| !sub.is_default()) else {
            return self.owner.to_text();
        };
        let mut checked = self.owner.as_slice().to_vec();
        checked.extend_from_slice(subaccount.as_bytes());
        let checksum = base32_encode(&crc32(&checked).to_be_bytes());
        let hex = hex::encode(subaccount.as_bytes());
        let trimmed = hex.trim_start_matches('0');
        format!("{}-{}.{}", self.owner.to_text(), checksum, trimmed)
    }
}

impl fmt::Display for IcrcAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
