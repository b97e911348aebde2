//! Transaction signing with ledger keypairs.
//!
//! Signing is a separate step from building: the secret is recovered from
//! the vault only once the transaction is fully assembled, and dropped as
//! soon as [`sign_transaction`] returns. The signature covers the
//! network-bound hash from [`LedgerTransaction::hash`], so a transaction
//! signed for one network never validates on another.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::builder::{BuildError, LedgerTransaction};
use crate::crypto::{verify_signature, LedgerKeypair};
use crate::storage::StorageError;

/// A signature tagged with the signer's key hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// A transaction plus the signatures that authorize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: LedgerTransaction,
    pub signatures: Vec<DecoratedSignature>,
    /// Hex hash under the network it was signed for.
    pub hash: String,
}

impl SignedTransaction {
    /// Base64 envelope handed to the ledger.
    pub fn to_envelope(&self) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    pub fn from_envelope(envelope: &str) -> Result<Self, StorageError> {
        let bytes = STANDARD
            .decode(envelope)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// True if a signature from the source account covers the hash for
    /// `network_passphrase`.
    pub fn verify(&self, network_passphrase: &str) -> bool {
        let hash = self.transaction.hash(network_passphrase);
        if hex::encode(hash) != self.hash {
            return false;
        }
        let source_key = self.transaction.source.public_key();
        let hint = [source_key[28], source_key[29], source_key[30], source_key[31]];
        self.signatures
            .iter()
            .filter(|s| s.hint == hint)
            .any(|s| verify_signature(source_key, &hash, &s.signature))
    }
}

/// Signs `tx` with the source account's keypair.
///
/// Fails if the keypair does not control `tx.source`.
pub fn sign_transaction(
    tx: LedgerTransaction,
    keypair: &LedgerKeypair,
    network_passphrase: &str,
) -> Result<SignedTransaction, BuildError> {
    let signer = keypair.address();
    if signer != tx.source {
        return Err(BuildError::SignerMismatch {
            expected: tx.source,
            signer,
        });
    }
    let hash = tx.hash(network_passphrase);
    let signature = DecoratedSignature {
        hint: keypair.signature_hint(),
        signature: keypair.sign(&hash).to_vec(),
    };
    Ok(SignedTransaction {
        transaction: tx,
        signatures: vec![signature],
        hash: hex::encode(hash),
    })
}

/// The signed sequence must be exactly one past the account's current
/// sequence. Anything else is rejected before submission.
pub fn check_sequence(account_sequence: i64, tx: &LedgerTransaction) -> Result<(), BuildError> {
    if account_sequence.checked_add(1) != Some(tx.sequence) {
        return Err(BuildError::SequenceMismatch {
            account: account_sequence,
            signed: tx.sequence,
        });
    }
    Ok(())
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
