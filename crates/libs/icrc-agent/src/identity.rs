use ed25519_dalek::{Signer as _, SigningKey};
use icrc_rpc::Principal;

use crate::certificate::der_encode_ed25519;

/// Whoever the agent signs requests as.
pub trait Identity: Send + Sync {
    fn sender(&self) -> Principal;

    /// DER-encoded public key, `None` for the anonymous identity.
    fn public_key(&self) -> Option<Vec<u8>>;

    fn sign(&self, message: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn sender(&self) -> Principal {
        Principal::anonymous()
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        None
    }

    fn sign(&self, _message: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

pub struct Ed25519Identity {
    signing_key: SigningKey,
    der_public_key: Vec<u8>,
}

impl Ed25519Identity {
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let der_public_key = der_encode_ed25519(&signing_key.verifying_key());
        Self { signing_key, der_public_key }
    }
}

impl Identity for Ed25519Identity {
    fn sender(&self) -> Principal {
        Principal::self_authenticating(&self.der_public_key)
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        Some(self.der_public_key.clone())
    }

    fn sign(&self, message: &[u8]) -> Option<Vec<u8>> {
        Some(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_authenticating_principal_ends_with_tag() {
        let identity = Ed25519Identity::from_secret([3u8; 32]);
        let sender = identity.sender();
        assert_eq!(sender.as_slice().len(), 29);
        assert_eq!(sender.as_slice().last(), Some(&0x02));
        assert_eq!(identity.public_key().map(|key| key.len()), Some(44));
    }
}
