//! Serde helpers and small formatting utilities

/// Serializes a `u128` chain quantity as a decimal string
pub mod u128_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(D::Error::custom)
    }
}

/// Same as [`u128_string`] for optional fields
pub mod option_u128_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| raw.parse::<u128>().map_err(D::Error::custom))
            .transpose()
    }
}

/// Block numbers stored as strings
pub mod option_u64_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| raw.parse::<u64>().map_err(D::Error::custom))
            .transpose()
    }
}

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Formats a wei amount as an ether decimal string without trailing zeros
pub fn format_wei_as_eth(wei: u128) -> String {
    let whole = wei / WEI_PER_ETH;
    let fraction = wei % WEI_PER_ETH;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:018}", fraction);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Accepts plain non-negative decimals such as `1000` or `12.5`
pub fn is_decimal_amount(raw: &str) -> bool {
    let mut parts = raw.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    match fraction {
        None => digits(whole),
        Some(fraction) => digits(whole) && digits(fraction),
    }
}
