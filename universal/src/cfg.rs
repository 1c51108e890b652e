use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    account::ChainId,
    address::AddressCodec,
    cache::DEFAULT_MAX_SIZE,
    schema::validate_category,
};

/// Configuration shared by every component. Construct one (usually with `..Default::default()`) and pass it to the
/// constructors which need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// CAIP-2 namespace of the target chain.
    #[serde(default = "chain_namespace_default")]
    pub chain_namespace: String,
    /// CAIP-2 reference of the target chain.
    #[serde(default = "chain_reference_default")]
    pub chain_reference: String,
    /// Human-readable prefix of the target chain's bech32 address encoding.
    #[serde(default = "bech32_hrp_default")]
    pub bech32_hrp: String,
    /// The factory which deploys wallets, in either address encoding.
    #[serde(default = "factory_address_default")]
    pub factory_address: String,
    /// Hash of the wallet bytecode deployed by the factory, as 32 bytes of hex.
    #[serde(default = "wallet_bytecode_hash_default")]
    pub wallet_bytecode_hash: String,
    /// Maximum number of derived wallets to keep in memory. Defaults to 100.
    #[serde(default = "wallet_cache_size_default")]
    pub wallet_cache_size: usize,
    /// How long a derived wallet stays cached. If not set, entries only leave the cache when evicted. Defaults to 24
    /// hours.
    #[serde(default = "wallet_cache_ttl_default")]
    pub wallet_cache_ttl: Option<Duration>,
    /// Envelope category of transactions which don't carry an application message.
    #[serde(default = "default_category_default")]
    pub default_category: String,
    /// The largest page size accepted by queries. Defaults to 100.
    #[serde(default = "max_query_limit_default")]
    pub max_query_limit: u32,
    /// JSON-RPC endpoint of a target chain node.
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain_namespace: chain_namespace_default(),
            chain_reference: chain_reference_default(),
            bech32_hrp: bech32_hrp_default(),
            factory_address: factory_address_default(),
            wallet_bytecode_hash: wallet_bytecode_hash_default(),
            wallet_cache_size: wallet_cache_size_default(),
            wallet_cache_ttl: wallet_cache_ttl_default(),
            default_category: default_category_default(),
            max_query_limit: max_query_limit_default(),
            rpc_url: None,
        }
    }
}

impl Config {
    pub fn chain(&self) -> ChainId {
        ChainId::new(self.chain_namespace.clone(), self.chain_reference.clone())
    }

    pub fn address_codec(&self) -> Result<AddressCodec> {
        Ok(AddressCodec::new(self.chain(), &self.bech32_hrp)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_namespace.is_empty() || self.chain_namespace.contains(':') {
            return Err(anyhow!(
                "invalid chain namespace: {:?}",
                self.chain_namespace
            ));
        }
        if self.chain_reference.contains(':') {
            return Err(anyhow!(
                "invalid chain reference: {:?}",
                self.chain_reference
            ));
        }
        let codec = self.address_codec()?;
        codec
            .parse_target_address(&self.factory_address)
            .map_err(|e| anyhow!("invalid factory address: {e}"))?;
        let hash = self
            .wallet_bytecode_hash
            .strip_prefix("0x")
            .unwrap_or(&self.wallet_bytecode_hash);
        if hash.len() != 64 || hex::decode(hash).is_err() {
            return Err(anyhow!(
                "wallet bytecode hash must be 32 bytes of hex, got {:?}",
                self.wallet_bytecode_hash
            ));
        }
        validate_category(&self.default_category)?;
        if self.wallet_cache_size == 0 {
            return Err(anyhow!("wallet cache size must be non-zero"));
        }
        if self.max_query_limit == 0 {
            return Err(anyhow!("max query limit must be non-zero"));
        }
        Ok(())
    }
}

pub fn chain_namespace_default() -> String {
    "push".to_owned()
}

pub fn chain_reference_default() -> String {
    "42101".to_owned()
}

pub fn bech32_hrp_default() -> String {
    "push".to_owned()
}

pub fn factory_address_default() -> String {
    "0x00000000000000000000000000000000000000eA".to_owned()
}

pub fn wallet_bytecode_hash_default() -> String {
    // keccak256 of the empty string. Real deployments must override this with the hash of the wallet bytecode.
    "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470".to_owned()
}

pub fn wallet_cache_size_default() -> usize {
    DEFAULT_MAX_SIZE
}

pub fn wallet_cache_ttl_default() -> Option<Duration> {
    Some(Duration::from_secs(24 * 60 * 60))
}

pub fn default_category_default() -> String {
    "UNIVERSAL:EXECUTE".to_owned()
}

pub fn max_query_limit_default() -> u32 {
    100
}
