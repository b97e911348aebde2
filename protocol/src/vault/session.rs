//! Per-flow view of the vault.
//!
//! A [`VaultSession`] is read from the store once, at the start of a
//! transaction flow, and passed down explicitly. Nothing below it goes back
//! to storage for credentials or envelopes mid-flow.

use tracing::warn;
use zeroize::Zeroizing;

use super::credential::AuthenticatorCredential;
use super::envelope::EncryptedSecret;
use super::kek::KekParams;
use super::VaultError;
use crate::crypto::LedgerKeypair;
use crate::ledger::LedgerAddress;

/// Where a recovered secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Vault,
    /// Deprecated plaintext store of pre-vault wallets.
    Legacy,
}

/// A signing keypair recovered for exactly one operation.
#[derive(Debug)]
pub struct RecoveredSecret {
    pub keypair: LedgerKeypair,
    pub source: SecretSource,
}

/// Snapshot of everything the vault holds for one account.
#[derive(Debug, Clone)]
pub struct VaultSession {
    account: LedgerAddress,
    credential: Option<AuthenticatorCredential>,
    envelope: Option<EncryptedSecret>,
    legacy_secret: Option<Zeroizing<String>>,
}

impl VaultSession {
    pub fn new(
        account: LedgerAddress,
        credential: Option<AuthenticatorCredential>,
        envelope: Option<EncryptedSecret>,
        legacy_secret: Option<Zeroizing<String>>,
    ) -> Self {
        Self {
            account,
            credential,
            envelope,
            legacy_secret,
        }
    }

    pub fn account(&self) -> &LedgerAddress {
        &self.account
    }

    pub fn credential(&self) -> Option<&AuthenticatorCredential> {
        self.credential.as_ref()
    }

    pub fn envelope(&self) -> Option<&EncryptedSecret> {
        self.envelope.as_ref()
    }

    pub fn has_secret(&self) -> bool {
        self.envelope.is_some() || self.legacy_secret.is_some()
    }

    /// The credential, or [`VaultError::MissingCredential`].
    pub fn require_credential(&self) -> Result<&AuthenticatorCredential, VaultError> {
        self.credential.as_ref().ok_or(VaultError::MissingCredential)
    }

    /// KEK params for this account: the bound credential id, else the
    /// public key.
    pub fn kek_params(&self) -> KekParams {
        // An existing envelope records which secret sealed it.
        let credential_id = match &self.envelope {
            Some(env) => env.metadata.credential_id.as_deref(),
            None => self.credential.as_ref().map(|c| c.id.as_str()),
        };
        match credential_id {
            Some(id) => KekParams::for_credential(id, &self.account),
            None => KekParams::for_public_key(&self.account),
        }
    }

    /// Recover the signing keypair.
    ///
    /// A present envelope is authoritative: if it is corrupt or the KEK is
    /// wrong, that error is returned and the legacy store is not consulted.
    /// The legacy plaintext secret is only read when no envelope exists.
    pub fn recover_secret(&self) -> Result<RecoveredSecret, VaultError> {
        if let Some(envelope) = &self.envelope {
            let secret = envelope.open(&self.kek_params())?;
            let keypair = LedgerKeypair::from_secret_slice(&secret)
                .map_err(|_| VaultError::Corrupt("sealed secret is not an account seed".into()))?;
            return self.checked(keypair, SecretSource::Vault);
        }

        if let Some(legacy) = &self.legacy_secret {
            warn!(account = %self.account, "using deprecated plaintext secret; re-import into the vault");
            let keypair = LedgerKeypair::from_hex(legacy)
                .map_err(|_| VaultError::Corrupt("legacy secret is not a hex seed".into()))?;
            return self.checked(keypair, SecretSource::Legacy);
        }

        Err(VaultError::NoSecret)
    }

    fn checked(&self, keypair: LedgerKeypair, source: SecretSource) -> Result<RecoveredSecret, VaultError> {
        if keypair.address() != self.account {
            return Err(VaultError::Corrupt(
                "recovered secret belongs to a different account".into(),
            ));
        }
        Ok(RecoveredSecret { keypair, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vaulted(credential_id: &str) -> (LedgerKeypair, VaultSession) {
        let kp = LedgerKeypair::generate();
        let account = kp.address();
        let kek = KekParams::for_credential(credential_id, &account);
        let env = EncryptedSecret::seal(&kp.secret_bytes()[..], &account, Some(credential_id), &kek)
            .unwrap();
        let cred = AuthenticatorCredential::new(credential_id, vec![4u8; 65], "platform");
        (kp, VaultSession::new(account, Some(cred), Some(env), None))
    }

    #[test]
    fn recovers_from_vault() {
        let (kp, session) = vaulted("cred");
        let recovered = session.recover_secret().unwrap();
        assert_eq!(recovered.source, SecretSource::Vault);
        assert_eq!(recovered.keypair.address(), kp.address());
    }

    #[test]
    fn corrupt_vault_does_not_fall_back_to_legacy() {
        let (kp, session) = vaulted("cred");
        let mut envelope = session.envelope().cloned().unwrap();
        envelope.wrap_iv.clear();
        let legacy = Zeroizing::new(hex::encode(&kp.secret_bytes()[..]));
        let session = VaultSession::new(kp.address(), None, Some(envelope), Some(legacy));
        assert!(matches!(session.recover_secret(), Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn legacy_used_only_when_vault_absent() {
        let kp = LedgerKeypair::generate();
        let legacy = Zeroizing::new(hex::encode(&kp.secret_bytes()[..]));
        let session = VaultSession::new(kp.address(), None, None, Some(legacy));
        let recovered = session.recover_secret().unwrap();
        assert_eq!(recovered.source, SecretSource::Legacy);
    }

    #[test]
    fn no_secret_at_all() {
        let session = VaultSession::new(LedgerAddress::from_public_key([1u8; 32]), None, None, None);
        assert!(matches!(session.recover_secret(), Err(VaultError::NoSecret)));
        assert!(matches!(session.require_credential(), Err(VaultError::MissingCredential)));
    }

    #[test]
    fn legacy_secret_for_other_account_rejected() {
        let kp = LedgerKeypair::generate();
        let other = LedgerKeypair::generate();
        let legacy = Zeroizing::new(hex::encode(&other.secret_bytes()[..]));
        let session = VaultSession::new(kp.address(), None, None, Some(legacy));
        assert!(matches!(session.recover_secret(), Err(VaultError::Corrupt(_))));
    }
}
