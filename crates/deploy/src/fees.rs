//! Fee and resource-bound configuration attached to every submission.

use serde::{Deserialize, Serialize};

/// Upper bound for a single resource of a v3 transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBound {
    #[serde(deserialize_with = "deserialize_u64_quantity")]
    pub max_amount: u64,
    #[serde(deserialize_with = "deserialize_u128_quantity")]
    pub max_price_per_unit: u128,
}

impl ResourceBound {
    pub const fn new(max_amount: u64, max_price_per_unit: u128) -> Self {
        Self {
            max_amount,
            max_price_per_unit,
        }
    }
}

/// Fee parameters for a transaction.
///
/// Passed through to the ledger client untouched; the orchestrator never
/// computes or adjusts fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FeeConfig {
    /// Let the ledger SDK estimate fees.
    Estimated,
    /// Flat maximum fee, for legacy transaction versions.
    MaxFee {
        #[serde(deserialize_with = "deserialize_u128_quantity")]
        max_fee: u128,
    },
    /// Explicit v3 resource bounds.
    ResourceBounds {
        l1_gas: ResourceBound,
        l2_gas: ResourceBound,
        l1_data_gas: ResourceBound,
    },
}

impl FeeConfig {
    /// Resource bounds generous enough for declaring large Sierra classes.
    pub const fn default_resource_bounds() -> Self {
        Self::ResourceBounds {
            l1_gas: ResourceBound::new(0, 0),
            l2_gas: ResourceBound::new(0x3D0900, 0x2540BE400),
            l1_data_gas: ResourceBound::new(0x30D40, 0x2540BE400),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self::default_resource_bounds()
    }
}

/// A quantity written either as a TOML/JSON integer or as a `0x` hex string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Int(u64),
    Str(String),
}

impl Quantity {
    fn into_u128(self) -> Result<u128, String> {
        match self {
            Quantity::Int(v) => Ok(v as u128),
            Quantity::Str(s) => match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => s.parse::<u128>().map_err(|e| e.to_string()),
            },
        }
    }
}

fn deserialize_u128_quantity<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Quantity::deserialize(deserializer)?
        .into_u128()
        .map_err(serde::de::Error::custom)
}

fn deserialize_u64_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = deserialize_u128_quantity(deserializer)?;
    u64::try_from(value).map_err(serde::de::Error::custom)
}
