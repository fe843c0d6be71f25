//! Helpers for reading and printing field elements.

use serde::Deserialize;
use starknet::core::types::Felt;

/// Parse a field element written as `0x`-prefixed hex or as a decimal string.
pub fn parse_felt(value: &str) -> Result<Felt, String> {
    let value = value.trim();
    let parsed = if value.starts_with("0x") || value.starts_with("0X") {
        Felt::from_hex(value)
    } else {
        Felt::from_dec_str(value)
    };
    parsed.map_err(|_| format!("`{}` is not a valid field element", value))
}

/// Format a field element as `0x`-prefixed lowercase hex.
pub fn to_hex(felt: &Felt) -> String {
    felt.to_hex_string()
}

/// A felt as written in configuration: a string, or a bare integer when it
/// comes from an environment variable.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeltRepr {
    Int(u64),
    Str(String),
}

impl FeltRepr {
    fn into_felt(self) -> Result<Felt, String> {
        match self {
            FeltRepr::Int(v) => Ok(Felt::from(v)),
            FeltRepr::Str(s) => parse_felt(&s),
        }
    }
}

pub(crate) fn deserialize_felt<'de, D>(deserializer: D) -> Result<Felt, D::Error>
where
    D: serde::Deserializer<'de>,
{
    FeltRepr::deserialize(deserializer)?
        .into_felt()
        .map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_opt_felt<'de, D>(deserializer: D) -> Result<Option<Felt>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<FeltRepr>::deserialize(deserializer)?
        .map(|repr| repr.into_felt().map_err(serde::de::Error::custom))
        .transpose()
}

pub(crate) mod hex_serde {
    use serde::Serializer;
    use starknet::core::types::Felt;

    pub fn serialize<S: Serializer>(felt: &Felt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(felt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Felt, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        super::deserialize_felt(deserializer)
    }

    pub mod option {
        use serde::Serializer;
        use starknet::core::types::Felt;

        pub fn serialize<S: Serializer>(
            felt: &Option<Felt>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match felt {
                Some(felt) => serializer.serialize_some(&super::super::to_hex(felt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Felt>, D::Error> {
            super::super::deserialize_opt_felt(deserializer)
        }
    }
}
