//! # Ledger Key Management
//!
//! Ed25519 keypairs for ledger accounts. The secret seed is the thing the
//! vault exists to protect: it is only ever materialized for the duration
//! of a single signing operation, and ed25519-dalek zeroizes it on drop.
//!
//! Key bytes are never logged. `Debug` prints the address, nothing else.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH};
use crate::ledger::address::LedgerAddress;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: expected {SECRET_KEY_LENGTH} bytes of hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// A ledger account keypair.
///
/// Intentionally neither `Clone` nor `Serialize`: copying or persisting a
/// secret must be an explicit act through [`LedgerKeypair::secret_bytes`].
pub struct LedgerKeypair {
    signing_key: SigningKey,
}

impl LedgerKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from its 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild a keypair from a byte slice, checking the length.
    pub fn from_secret_slice(secret: &[u8]) -> Result<Self, KeyError> {
        let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> = Zeroizing::new(
            secret
                .try_into()
                .map_err(|_| KeyError::InvalidSecretKey)?,
        );
        Ok(Self::from_seed(&seed))
    }

    /// Rebuild a keypair from a hex-encoded seed.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?,
        );
        Self::from_secret_slice(&bytes)
    }

    /// The account address this keypair controls.
    pub fn address(&self) -> LedgerAddress {
        LedgerAddress::from_public_key(self.public_key_bytes())
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Last four bytes of the public key; lets the ledger pick the right
    /// signer without trying every key on the account.
    pub fn signature_hint(&self) -> [u8; 4] {
        let pk = self.public_key_bytes();
        [pk[28], pk[29], pk[30], pk[31]]
    }

    /// Deterministic Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Export the secret seed. The copy is zeroized when dropped.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for LedgerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerKeypair({})", self.address())
    }
}

/// Verify an Ed25519 signature made by the account behind `public_key`.
pub fn verify_signature(
    public_key: &[u8; PUBLIC_KEY_LENGTH],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    verifying_key
        .verify(message, &DalekSignature::from_bytes(&sig_bytes))
        .is_ok()
}
