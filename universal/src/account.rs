use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::address;

/// The CAIP-2 namespace used by EVM chains.
pub const EIP155_NAMESPACE: &str = "eip155";
/// The CAIP-2 namespace used by Solana clusters.
pub const SOLANA_NAMESPACE: &str = "solana";

/// A chain-agnostic identity: an account on some chain, identified by the chain's namespace and reference and the
/// account's address in that chain's native encoding.
///
/// Construct one with [address::parse] from a CAIP-10 string, or directly. The [Display] and [FromStr]
/// implementations use the CAIP-10 textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalAccount {
    pub chain_namespace: String,
    pub chain_reference: String,
    pub address: String,
}

impl UniversalAccount {
    pub fn new(
        chain_namespace: impl Into<String>,
        chain_reference: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        UniversalAccount {
            chain_namespace: chain_namespace.into(),
            chain_reference: chain_reference.into(),
            address: address.into(),
        }
    }

    pub fn chain(&self) -> ChainId {
        ChainId {
            namespace: self.chain_namespace.clone(),
            reference: self.chain_reference.clone(),
        }
    }

    pub fn is_on(&self, chain: &ChainId) -> bool {
        self.chain_namespace == chain.namespace && self.chain_reference == chain.reference
    }

    /// The CAIP-10 form of this account with chain-specific case folding applied, so that equivalent spellings of the
    /// same account produce the same string. EVM addresses are case-insensitive, so they are lowercased.
    pub fn canonical(&self) -> String {
        if self.chain_namespace == EIP155_NAMESPACE {
            address::format(&UniversalAccount {
                address: self.address.to_ascii_lowercase(),
                ..self.clone()
            })
        } else {
            address::format(self)
        }
    }
}

impl Display for UniversalAccount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&address::format(self))
    }
}

impl FromStr for UniversalAccount {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(address::parse(s))
    }
}

/// A CAIP-2 chain identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId {
    pub namespace: String,
    pub reference: String,
}

impl ChainId {
    pub fn new(namespace: impl Into<String>, reference: impl Into<String>) -> Self {
        ChainId {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// An account on this chain.
    pub fn account(&self, address: impl Into<String>) -> UniversalAccount {
        UniversalAccount::new(self.namespace.clone(), self.reference.clone(), address)
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}
