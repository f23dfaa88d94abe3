//! Helpers for parsing linear and dB gain values.

use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Convert a dB value to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain to dB.
pub fn linear_to_db(value: f32) -> f32 {
    let v = value.max(f32::MIN_POSITIVE);
    20.0 * v.log10()
}

/// Deserialize a linear gain value that may be expressed in dB.
pub fn deserialize_linear_gain<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    struct GainVisitor;

    impl<'de> Visitor<'de> for GainVisitor {
        type Value = f32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or a string like \"26db\"")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(value as f32)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(value as f32)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(value as f32)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            parse_linear_gain(value)
                .ok_or_else(|| DeError::custom(format!("invalid gain value \"{}\"", value)))
        }
    }

    deserializer.deserialize_any(GainVisitor)
}

/// Deserialize an optional linear gain; `null` or a missing field yields `None`.
pub fn deserialize_optional_linear_gain<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Gain(#[serde(deserialize_with = "deserialize_linear_gain")] f32);

    Option::<Gain>::deserialize(deserializer).map(|gain| gain.map(|Gain(value)| value))
}

/// Parse `"2.5"` or `"6db"` into a linear gain.
pub fn parse_linear_gain(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if let Some(db_part) = lower.strip_suffix("db") {
        return db_part.trim().parse::<f32>().ok().map(db_to_linear);
    }
    trimmed.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_db_values() {
        assert_eq!(parse_linear_gain("2.5"), Some(2.5));
        let six_db = parse_linear_gain(" 6dB ").expect("db value");
        assert!((six_db - db_to_linear(6.0)).abs() < 1e-6);
        assert_eq!(parse_linear_gain("loud"), None);
        assert_eq!(parse_linear_gain(""), None);
    }

    #[test]
    fn db_conversions_are_inverse() {
        let linear = db_to_linear(-12.0);
        assert!((linear_to_db(linear) + 12.0).abs() < 1e-4);
    }
}
