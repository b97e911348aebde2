//! # Ledger Account Addresses
//!
//! A ledger address is the account's raw Ed25519 public key, Bech32-encoded
//! under the `lumen` human-readable prefix:
//!
//! ```text
//! public_key (32 bytes) -> Bech32("lumen", public_key) -> lumen1qx...
//! ```
//!
//! The raw key (not a hash of it) is encoded because the ledger verifies
//! signatures directly against the address. Bech32's checksum catches the
//! copy-paste typos that would otherwise send funds into the void, which
//! is what destination validation relies on.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ADDRESS_HRP, PUBLIC_KEY_LENGTH};

const HRP: Hrp = Hrp::parse_unchecked(ADDRESS_HRP);

/// Errors raised while parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("malformed address: {0}")]
    Malformed(String),

    #[error("wrong address prefix: expected '{expected}', got '{got}'")]
    WrongPrefix { expected: String, got: String },

    #[error("wrong address payload length: expected {PUBLIC_KEY_LENGTH} bytes, got {0}")]
    WrongLength(usize),
}

/// A ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerAddress {
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl LedgerAddress {
    /// Wrap a raw public key.
    pub fn from_public_key(public_key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { public_key }
    }

    /// Parse and validate an encoded address.
    pub fn parse(encoded: &str) -> Result<Self, AddressError> {
        let (hrp, data) = bech32::decode(encoded.trim())
            .map_err(|e| AddressError::Malformed(e.to_string()))?;
        if hrp != HRP {
            return Err(AddressError::WrongPrefix {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }
        let public_key: [u8; PUBLIC_KEY_LENGTH] = data
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::WrongLength(data.len()))?;
        Ok(Self { public_key })
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bech32::encode::<Bech32>(HRP, &self.public_key).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl fmt::Debug for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAddress({})", self)
    }
}

impl FromStr for LedgerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LedgerAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LedgerAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
