//! Token amount conversions.
//!
//! Rates are integer `numerator / denominator` pairs and amounts are arbitrary precision integers. Conversions truncate
//! towards zero.

use std::fmt::{self, Display, Formatter};

use alloy::primitives::U256;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Computes `amount * numerator / denominator`, rounding down. Fails if `denominator` is zero.
pub fn convert(
    amount: &BigUint,
    numerator: &BigUint,
    denominator: &BigUint,
) -> Result<BigUint, Error> {
    if *denominator == BigUint::from(0u8) {
        return Err(Error::Validation(
            "conversion rate denominator must be non-zero".to_owned(),
        ));
    }
    Ok(amount * numerator / denominator)
}

/// An exchange rate between two tokens, expressed as an integer fraction. For example, a rate of `3 / 2` converts
/// 100 units of the source token to 150 units of the destination token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRate {
    pub numerator: BigUint,
    pub denominator: BigUint,
}

impl TokenRate {
    pub fn new(
        numerator: impl Into<BigUint>,
        denominator: impl Into<BigUint>,
    ) -> Result<Self, Error> {
        let rate = TokenRate {
            numerator: numerator.into(),
            denominator: denominator.into(),
        };
        if rate.denominator == BigUint::from(0u8) {
            return Err(Error::Validation(
                "conversion rate denominator must be non-zero".to_owned(),
            ));
        }
        Ok(rate)
    }

    pub fn convert(&self, amount: &BigUint) -> Result<BigUint, Error> {
        convert(amount, &self.numerator, &self.denominator)
    }

    /// Convert an on-chain amount. Fails if the result does not fit in 256 bits.
    pub fn convert_u256(&self, amount: U256) -> Result<U256, Error> {
        let converted = self.convert(&to_biguint(amount))?;
        from_biguint(&converted).ok_or_else(|| {
            Error::Validation(format!("converted amount {converted} exceeds 256 bits"))
        })
    }
}

impl Display for TokenRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

pub fn to_biguint(value: U256) -> BigUint {
    BigUint::from_bytes_be(&value.to_be_bytes::<32>())
}

pub fn from_biguint(value: &BigUint) -> Option<U256> {
    let bytes = value.to_bytes_be();
    (bytes.len() <= 32).then(|| U256::from_be_slice(&bytes))
}
