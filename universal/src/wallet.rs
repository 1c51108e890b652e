//! Deterministic derivation of the target chain smart-account address owned by an external account.
//!
//! The address of a wallet is computed with the CREATE2 scheme:
//!
//! ```text
//! salt    = keccak256(canonical CAIP-10 form of the owner)
//! address = keccak256(0xff ++ factory ++ salt ++ bytecode_hash)[12..]
//! ```
//!
//! The result depends only on the owner, the factory and the wallet bytecode hash, so a wallet can be funded and
//! referenced before it is deployed.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, keccak256};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    account::{ChainId, UniversalAccount},
    address::{AddressCodec, EncodingError},
    cache::BoundedCache,
    cfg::Config,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("cannot derive a wallet for `{owner}`: {source}")]
    InvalidOwner {
        owner: String,
        #[source]
        source: EncodingError,
    },
    #[error("invalid factory reference `{reference}`: {source}")]
    InvalidFactory {
        reference: String,
        #[source]
        source: EncodingError,
    },
    #[error("invalid bytecode hash `{0}`: expected 32 bytes of hex")]
    InvalidBytecodeHash(String),
}

/// The counterfactual wallet of `owner` on the target chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedWallet {
    pub owner: UniversalAccount,
    /// EIP-55 checksummed hex.
    pub target_address: String,
    pub factory_ref: String,
    pub bytecode_hash: String,
}

impl DerivedWallet {
    /// The wallet as an account on `chain`.
    pub fn target_account(&self, chain: &ChainId) -> UniversalAccount {
        chain.account(self.target_address.clone())
    }
}

/// Computes the CREATE2 address of a contract deployed by `factory` with `salt` and init code hashing to
/// `bytecode_hash`.
pub fn derive_address(factory: Address, salt: B256, bytecode_hash: B256) -> Address {
    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(0xff);
    preimage.extend_from_slice(factory.as_slice());
    preimage.extend_from_slice(salt.as_slice());
    preimage.extend_from_slice(bytecode_hash.as_slice());
    Address::from_slice(&keccak256(&preimage)[12..])
}

/// The deployment salt of `owner`'s wallet.
pub fn owner_salt(owner: &UniversalAccount) -> B256 {
    keccak256(owner.canonical().as_bytes())
}

/// Resolves external accounts to their wallets, memoizing the results.
#[derive(Debug, Clone)]
pub struct WalletDeriver {
    codec: AddressCodec,
    cache: Arc<BoundedCache<String, DerivedWallet>>,
    ttl: Option<Duration>,
    factory_ref: String,
    bytecode_hash: String,
}

impl WalletDeriver {
    pub fn new(config: &Config, codec: AddressCodec) -> Self {
        Self::with_cache(
            config,
            codec,
            Arc::new(BoundedCache::new(config.wallet_cache_size)),
        )
    }

    /// Create a deriver which shares `cache` with other users.
    pub fn with_cache(
        config: &Config,
        codec: AddressCodec,
        cache: Arc<BoundedCache<String, DerivedWallet>>,
    ) -> Self {
        WalletDeriver {
            codec,
            cache,
            ttl: config.wallet_cache_ttl,
            factory_ref: config.factory_address.clone(),
            bytecode_hash: config.wallet_bytecode_hash.clone(),
        }
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn cache(&self) -> &Arc<BoundedCache<String, DerivedWallet>> {
        &self.cache
    }

    /// Resolve `owner` using the configured factory and wallet bytecode.
    pub fn resolve_owner(
        &self,
        owner: &UniversalAccount,
    ) -> Result<DerivedWallet, DerivationError> {
        self.resolve(owner, &self.factory_ref, &self.bytecode_hash)
    }

    pub fn resolve(
        &self,
        owner: &UniversalAccount,
        factory_ref: &str,
        bytecode_hash: &str,
    ) -> Result<DerivedWallet, DerivationError> {
        self.codec
            .validate_account(owner)
            .map_err(|source| DerivationError::InvalidOwner {
                owner: owner.to_string(),
                source,
            })?;
        let factory = self.codec.parse_target_address(factory_ref).map_err(|source| {
            DerivationError::InvalidFactory {
                reference: factory_ref.to_owned(),
                source,
            }
        })?;
        let hash = parse_hash(bytecode_hash)
            .ok_or_else(|| DerivationError::InvalidBytecodeHash(bytecode_hash.to_owned()))?;

        let factory_ref = factory.to_checksum(None);
        let bytecode_hash = format!("0x{}", hex::encode(hash));
        let key = format!("{}|{}|{}", owner.canonical(), factory_ref, bytecode_hash);

        if let Some(wallet) = self.cache.get(&key) {
            trace!(%owner, "wallet cache hit");
            return Ok(wallet);
        }

        let address = derive_address(factory, owner_salt(owner), hash);
        let wallet = DerivedWallet {
            owner: owner.clone(),
            target_address: address.to_checksum(None),
            factory_ref,
            bytecode_hash,
        };
        debug!(%owner, target = %wallet.target_address, "derived wallet");
        self.cache.set(key, wallet.clone(), self.ttl);

        Ok(wallet)
    }
}

fn parse_hash(s: &str) -> Option<B256> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() != 64 {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    Some(B256::from_slice(&bytes))
}
