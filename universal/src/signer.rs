//! The signing seam. Keys are owned by whatever implements [MessageSigner]; this crate only ever sees signatures.

use std::{fmt, sync::Arc};

use alloy::primitives::{Address, keccak256};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::rand_core::CryptoRngCore,
};
use tracing::warn;

use crate::account::{EIP155_NAMESPACE, UniversalAccount};

/// Something which can sign an arbitrary byte string, such as a browser wallet or a hardware device. Implementations
/// may prompt a user and may fail for any reason, including the user declining.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// The signer failed or declined to produce a signature. This is never retried, since a retry would mean prompting the
/// user again without their knowledge.
#[derive(thiserror::Error, Debug)]
#[error("{account} failed to sign: {source}")]
pub struct SigningError {
    pub account: UniversalAccount,
    #[source]
    pub source: anyhow::Error,
}

/// Binds a [MessageSigner] to the account it signs for.
#[derive(Clone)]
pub struct SignerAdapter {
    account: UniversalAccount,
    signer: Arc<dyn MessageSigner>,
}

impl fmt::Debug for SignerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerAdapter")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SignerAdapter {
    pub fn new(account: UniversalAccount, signer: Arc<dyn MessageSigner>) -> Self {
        SignerAdapter { account, signer }
    }

    pub fn account(&self) -> &UniversalAccount {
        &self.account
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        self.signer.sign_message(payload).await.map_err(|e| {
            warn!(account = %self.account, error = %e, "signing failed");
            SigningError {
                account: self.account.clone(),
                source: e,
            }
        })
    }
}

/// A [MessageSigner] holding a secp256k1 key in memory. Messages are hashed with keccak256 and signed with
/// recoverable ECDSA, producing 65 byte `r || s || v` signatures with `v` in `{27, 28}`.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(LocalSigner {
            key: SigningKey::from_slice(bytes)?,
        })
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
    }

    pub fn random<R: CryptoRngCore>(rng: &mut R) -> Self {
        LocalSigner {
            key: SigningKey::random(rng),
        }
    }

    pub fn address(&self) -> Address {
        public_key_to_address(self.key.verifying_key())
    }

    /// This key's account on the EVM chain with the given chain ID.
    pub fn account(&self, chain_id: u64) -> UniversalAccount {
        UniversalAccount::new(
            EIP155_NAMESPACE,
            chain_id.to_string(),
            self.address().to_checksum(None),
        )
    }

    /// Wrap this signer for use as the EVM account with the given chain ID.
    pub fn into_adapter(self, chain_id: u64) -> SignerAdapter {
        SignerAdapter::new(self.account(chain_id), Arc::new(self))
    }
}

#[async_trait]
impl MessageSigner for LocalSigner {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        let hash = keccak256(message);
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(hash.as_slice())?;
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        Ok(bytes)
    }
}

fn public_key_to_address(key: &VerifyingKey) -> Address {
    // Remove the first byte before hashing - The first byte specifies the encoding tag.
    let bytes = key.to_encoded_point(false).as_bytes()[1..].to_owned();
    Address::from_slice(&keccak256(bytes)[12..])
}

/// Recover the address which produced a [LocalSigner] signature over `message`.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<Address> {
    let [rs @ .., v] = signature else {
        return Err(anyhow!("empty signature"));
    };
    if rs.len() != 64 {
        return Err(anyhow!("expected a 65 byte signature, got {}", signature.len()));
    }
    let recovery_id = RecoveryId::from_byte(v.wrapping_sub(27))
        .ok_or_else(|| anyhow!("invalid recovery id {v}"))?;
    let signature = Signature::from_slice(rs)?;
    let key =
        VerifyingKey::recover_from_prehash(keccak256(message).as_slice(), &signature, recovery_id)?;
    Ok(public_key_to_address(&key))
}
