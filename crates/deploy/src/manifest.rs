//! Deployment manifest: the contracts to declare and deploy, and how their
//! constructor arguments are built.

use std::collections::HashMap;

use derive_more::Deref;
use serde::Deserialize;
use starknet::core::types::Felt;

use crate::{
    error::ConfigError,
    felt::{deserialize_felt, deserialize_opt_felt},
    fees::FeeConfig,
};

/// A 256-bit literal, sent as two felts (low 128 bits first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256Literal {
    pub low: u128,
    pub high: u128,
}

impl U256Literal {
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        match value.strip_prefix("0x") {
            Some(hex) => {
                if hex.is_empty() || hex.len() > 64 {
                    return Err(format!("`{}` is not a valid u256", value));
                }
                let split = hex.len().saturating_sub(32);
                let (high, low) = hex.split_at(split);
                let parse = |s: &str| {
                    if s.is_empty() {
                        Ok(0)
                    } else {
                        u128::from_str_radix(s, 16)
                            .map_err(|_| format!("`{}` is not a valid u256", value))
                    }
                };
                Ok(Self {
                    low: parse(low)?,
                    high: parse(high)?,
                })
            }
            None => Self::parse_decimal(value)
                .ok_or_else(|| format!("`{}` is not a valid u256", value)),
        }
    }

    /// Accumulate decimal digits into the two 128-bit limbs, failing on
    /// overflow past 2^256 - 1.
    fn parse_decimal(digits: &str) -> Option<Self> {
        const LOW_MASK: u128 = u64::MAX as u128;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let (mut low, mut high) = (0u128, 0u128);
        for digit in digits.bytes().map(|b| u128::from(b - b'0')) {
            // low * 10 + digit, split on 64-bit halves to catch the carry.
            let lower = (low & LOW_MASK) * 10 + digit;
            let upper = (low >> 64) * 10 + (lower >> 64);
            low = ((upper & LOW_MASK) << 64) | (lower & LOW_MASK);
            high = high.checked_mul(10)?.checked_add(upper >> 64)?;
        }

        Some(Self { low, high })
    }
}

fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256Literal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    U256Literal::parse(&s).map_err(serde::de::Error::custom)
}

/// A single constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDescriptor {
    /// A literal felt.
    #[serde(deserialize_with = "deserialize_felt")]
    Literal(Felt),
    /// A literal `u256`, expanded to two felts.
    #[serde(deserialize_with = "deserialize_u256")]
    U256(U256Literal),
    /// The class hash resolved for another contract of the manifest.
    ClassHashOf(String),
    /// The address of another contract of the manifest, once deployed.
    AddressOf(String),
    /// The address of the account running the deployment.
    DeployerAddress,
}

impl ArgDescriptor {
    /// The manifest contract this argument depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::ClassHashOf(name) | Self::AddressOf(name) => Some(name),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One contract of the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractSpec {
    /// Unique instance name.
    pub name: String,
    /// Artifact class name. Defaults to `name`.
    #[serde(default)]
    pub class: Option<String>,
    /// Artifact file prefix. Defaults to the artifacts section's package.
    #[serde(default)]
    pub package: Option<String>,
    /// When `false`, the class is declared but no instance is deployed.
    #[serde(default = "default_true")]
    pub deploy: bool,
    #[serde(default)]
    pub constructor: Vec<ArgDescriptor>,
    /// Last-resort class hash for the already-declared recovery path.
    #[serde(default, deserialize_with = "deserialize_opt_felt")]
    pub fallback_class_hash: Option<Felt>,
    /// Overrides the compiled class hash computed from the CASM artifact.
    #[serde(default, deserialize_with = "deserialize_opt_felt")]
    pub compiled_class_hash: Option<Felt>,
    #[serde(default, deserialize_with = "deserialize_opt_felt")]
    pub salt: Option<Felt>,
    /// Per-contract fee override.
    #[serde(default)]
    pub fees: Option<FeeConfig>,
}

impl ContractSpec {
    /// A deployable contract with no constructor arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: None,
            package: None,
            deploy: true,
            constructor: Vec::new(),
            fallback_class_hash: None,
            compiled_class_hash: None,
            salt: None,
            fees: None,
        }
    }

    pub fn arg(mut self, arg: ArgDescriptor) -> Self {
        self.constructor.push(arg);
        self
    }

    pub fn declare_only(mut self) -> Self {
        self.deploy = false;
        self
    }

    pub fn class_name(&self) -> &str {
        self.class.as_deref().unwrap_or(&self.name)
    }

    /// Names of the manifest contracts referenced by the constructor, in
    /// argument order, without duplicates.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for dep in self.constructor.iter().filter_map(ArgDescriptor::reference) {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }
}

/// A validated, ordered list of contracts.
#[derive(Debug, Clone, Deref)]
pub struct Manifest {
    #[deref]
    contracts: Vec<ContractSpec>,
}

impl Manifest {
    /// Validate the contracts and build a manifest.
    ///
    /// Checks for an empty list, duplicate names, references to unknown
    /// contracts and address references to declare-only contracts. Cycles are
    /// reported by the sequencer.
    pub fn new(contracts: Vec<ContractSpec>) -> Result<Self, ConfigError> {
        if contracts.is_empty() {
            return Err(ConfigError::EmptyManifest);
        }

        let mut by_name: HashMap<&str, &ContractSpec> = HashMap::new();
        for spec in &contracts {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::MissingField("contracts.name"));
            }
            if by_name.insert(&spec.name, spec).is_some() {
                return Err(ConfigError::DuplicateContract(spec.name.clone()));
            }
        }

        for spec in &contracts {
            for arg in &spec.constructor {
                let Some(reference) = arg.reference() else {
                    continue;
                };
                let Some(target) = by_name.get(reference) else {
                    return Err(ConfigError::UnknownReference {
                        contract: spec.name.clone(),
                        reference: reference.to_string(),
                    });
                };
                if matches!(arg, ArgDescriptor::AddressOf(_)) && !target.deploy {
                    return Err(ConfigError::AddressOfDeclareOnly {
                        contract: spec.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Ok(Self { contracts })
    }
}
