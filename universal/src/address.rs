//! Conversions between textual account identifiers and [UniversalAccount]s, and between the target chain's two native
//! address encodings.
//!
//! Every other component consumes accounts only in their parsed form. [parse] is deliberately lenient: input which
//! doesn't look like a CAIP-10 identifier is treated as a bare address rather than rejected, because callers commonly
//! pass bare addresses.

use std::fmt::{self, Display, Formatter};

use alloy::primitives::Address;
use bech32::{Bech32, Hrp, primitives::decode::CheckedHrpstring};
use serde::{Deserialize, Serialize};

use crate::account::{ChainId, EIP155_NAMESPACE, SOLANA_NAMESPACE, UniversalAccount};

/// Parse a CAIP-10 style identifier. This never fails:
/// * `namespace:reference:address` yields all three parts.
/// * `namespace:address` yields an empty reference.
/// * Anything else is treated as a bare address. This includes input with no `:`, and input whose namespace or
///   (in the three segment form) reference is empty, such as `::addr` or `ns::addr`.
///
/// `format(&parse(id)) == id` holds for every `id`.
pub fn parse(id: &str) -> UniversalAccount {
    let segments: Vec<&str> = id.split(':').collect();
    match segments.as_slice() {
        [namespace, reference, address] if !namespace.is_empty() && !reference.is_empty() => {
            UniversalAccount::new(*namespace, *reference, *address)
        }
        [namespace, address] if !namespace.is_empty() => {
            UniversalAccount::new(*namespace, "", *address)
        }
        _ => UniversalAccount::new("", "", id),
    }
}

/// The inverse of [parse].
pub fn format(account: &UniversalAccount) -> String {
    match (
        account.chain_namespace.is_empty(),
        account.chain_reference.is_empty(),
    ) {
        (false, false) => format!(
            "{}:{}:{}",
            account.chain_namespace, account.chain_reference, account.address
        ),
        (false, true) => format!("{}:{}", account.chain_namespace, account.address),
        (true, _) => account.address.clone(),
    }
}

/// The two encodings of a target chain address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `0x` followed by 40 hex digits. Mixed-case input must carry a valid EIP-55 checksum.
    Hex,
    /// Bech32 with the chain's human-readable prefix.
    Bech32,
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Hex => f.write_str("hex"),
            Encoding::Bech32 => f.write_str("bech32"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid hex address `{0}`: expected 0x followed by 40 hex digits")]
    InvalidHex(String),
    #[error("address `{0}` has an invalid EIP-55 checksum")]
    InvalidChecksum(String),
    #[error("invalid bech32 address `{address}`: {reason}")]
    InvalidBech32 { address: String, reason: String },
    #[error("bech32 address `{address}` has prefix `{found}`, expected `{expected}`")]
    WrongPrefix {
        address: String,
        found: String,
        expected: String,
    },
    #[error("invalid bech32 prefix `{0}`")]
    InvalidPrefix(String),
    #[error("invalid {namespace} address `{address}`")]
    InvalidAccount { namespace: String, address: String },
    #[error("account `{0}` has no chain namespace")]
    MissingNamespace(String),
}

/// Converts and validates addresses for a single target chain.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    chain: ChainId,
    hrp: Hrp,
}

impl AddressCodec {
    pub fn new(chain: ChainId, hrp: &str) -> Result<Self, EncodingError> {
        let hrp = Hrp::parse(hrp).map_err(|_| EncodingError::InvalidPrefix(hrp.to_owned()))?;
        Ok(AddressCodec { chain, hrp })
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    /// Decode `address`, which must be in the `encoding` form.
    pub fn decode(&self, address: &str, encoding: Encoding) -> Result<Address, EncodingError> {
        match encoding {
            Encoding::Hex => decode_hex(address),
            Encoding::Bech32 => self.decode_bech32(address),
        }
    }

    /// Encode `address` in the `encoding` form. Hex addresses are always EIP-55 checksummed.
    pub fn encode(&self, address: Address, encoding: Encoding) -> Result<String, EncodingError> {
        match encoding {
            Encoding::Hex => Ok(address.to_checksum(None)),
            Encoding::Bech32 => bech32::encode::<Bech32>(self.hrp, address.as_slice()).map_err(
                |e| EncodingError::InvalidBech32 {
                    address: address.to_string(),
                    reason: e.to_string(),
                },
            ),
        }
    }

    /// Convert `address` from one encoding of the target chain to the other. Fails if `address` isn't a valid
    /// `from` encoding.
    pub fn to_native_encoding(
        &self,
        address: &str,
        from: Encoding,
        to: Encoding,
    ) -> Result<String, EncodingError> {
        let decoded = self.decode(address, from)?;
        self.encode(decoded, to)
    }

    /// Decode a target chain address given in either encoding.
    pub fn parse_target_address(&self, address: &str) -> Result<Address, EncodingError> {
        if address.starts_with("0x") || address.starts_with("0X") {
            decode_hex(address)
        } else {
            self.decode_bech32(address)
        }
    }

    /// Check that `account.address` is valid for the account's namespace.
    pub fn validate_account(&self, account: &UniversalAccount) -> Result<(), EncodingError> {
        let namespace = account.chain_namespace.as_str();
        let invalid = || EncodingError::InvalidAccount {
            namespace: namespace.to_owned(),
            address: account.address.clone(),
        };

        if namespace.is_empty() {
            return Err(EncodingError::MissingNamespace(account.address.clone()));
        }

        if namespace == self.chain.namespace {
            self.parse_target_address(&account.address)?;
        } else if namespace == EIP155_NAMESPACE {
            decode_hex(&account.address)?;
        } else if namespace == SOLANA_NAMESPACE {
            let key = bs58::decode(&account.address)
                .into_vec()
                .map_err(|_| invalid())?;
            if key.len() != 32 {
                return Err(invalid());
            }
        } else if account.address.is_empty()
            || account
                .address
                .chars()
                .any(|c| c == ':' || c.is_whitespace())
        {
            return Err(invalid());
        }

        Ok(())
    }

    fn decode_bech32(&self, address: &str) -> Result<Address, EncodingError> {
        // Only the original Bech32 checksum is accepted, so each address has exactly one valid spelling.
        let checked = CheckedHrpstring::new::<Bech32>(address).map_err(|e| {
            EncodingError::InvalidBech32 {
                address: address.to_owned(),
                reason: e.to_string(),
            }
        })?;
        let hrp = checked.hrp();
        let data: Vec<u8> = checked.byte_iter().collect();
        if hrp.to_lowercase() != self.hrp.to_lowercase() {
            return Err(EncodingError::WrongPrefix {
                address: address.to_owned(),
                found: hrp.to_lowercase(),
                expected: self.hrp.to_lowercase(),
            });
        }
        if data.len() != 20 {
            return Err(EncodingError::InvalidBech32 {
                address: address.to_owned(),
                reason: format!("expected 20 bytes of data, got {}", data.len()),
            });
        }
        Ok(Address::from_slice(&data))
    }
}

fn decode_hex(address: &str) -> Result<Address, EncodingError> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .filter(|d| d.len() == 40 && d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| EncodingError::InvalidHex(address.to_owned()))?;

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{digits}"), None)
            .map_err(|_| EncodingError::InvalidChecksum(address.to_owned()));
    }

    let bytes = hex::decode(digits).map_err(|_| EncodingError::InvalidHex(address.to_owned()))?;
    Ok(Address::from_slice(&bytes))
}
