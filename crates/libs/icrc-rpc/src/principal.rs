//! Principals: opaque byte identities with a checksummed textual form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha224};

use crate::error::RpcError;

const MAX_LENGTH: usize = 29;
const TAG_SELF_AUTHENTICATING: u8 = 0x02;
const TAG_ANONYMOUS: u8 = 0x04;
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(Vec<u8>);

impl Principal {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RpcError> {
        if bytes.len() > MAX_LENGTH {
            return Err(RpcError::invalid_principal(format!(
                "{} bytes exceeds the {MAX_LENGTH} byte limit",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// The management canister, `aaaaa-aa`.
    pub fn management() -> Self {
        Self(Vec::new())
    }

    pub fn anonymous() -> Self {
        Self(vec![TAG_ANONYMOUS])
    }

    /// Principal derived from a DER-encoded public key.
    pub fn self_authenticating(der_public_key: &[u8]) -> Self {
        let mut bytes = Sha224::digest(der_public_key).to_vec();
        bytes.push(TAG_SELF_AUTHENTICATING);
        Self(bytes)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == [TAG_ANONYMOUS]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        let mut payload = crc32(&self.0).to_be_bytes().to_vec();
        payload.extend_from_slice(&self.0);
        group(&base32_encode(&payload))
    }

    pub fn from_text(text: &str) -> Result<Self, RpcError> {
        let lowered = text.to_ascii_lowercase();
        let compact: String = lowered.chars().filter(|c| *c != '-').collect();
        let decoded = base32_decode(&compact)
            .ok_or_else(|| RpcError::invalid_principal(format!("{text} is not base32")))?;
        if decoded.len() < 4 {
            return Err(RpcError::invalid_principal(format!("{text} is too short")));
        }
        let (checksum, bytes) = decoded.split_at(4);
        let principal = Self::from_slice(bytes)?;
        if checksum != crc32(bytes).to_be_bytes() {
            return Err(RpcError::invalid_principal(format!("{text} has a bad checksum")));
        }
        if principal.to_text() != lowered {
            return Err(RpcError::invalid_principal(format!("{text} is not in canonical form")));
        }
        Ok(principal)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.to_text())
    }
}

impl FromStr for Principal {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

/// CRC-32 (IEEE, reflected), as used by principal and account checksums.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for c in text.bytes() {
        let value = BASE32_ALPHABET.iter().position(|candidate| *candidate == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Some(out)
}

fn group(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(5)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}
