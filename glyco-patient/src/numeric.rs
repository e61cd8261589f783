//! Lenient numeric fields.
//!
//! Patient documents are often hand-edited, so numbers may arrive as JSON
//! numbers or as numeric strings (`"12.5"`). These helpers accept both.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn into_f64<E: Error>(self) -> Result<f64, E> {
        match self {
            Self::Number(value) => Ok(value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("`{text}` is not a number"))),
        }
    }
}

/// Deserializes an `f64` from a number or a numeric string.
pub(crate) fn float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer)?.into_f64()
}

/// Deserializes a non-negative whole number from a number or a numeric string.
///
/// Fractional values are rejected rather than truncated.
pub(crate) fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Numeric::deserialize(deserializer)?.into_f64::<D::Error>()?;
    if value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = value as u32;
        Ok(count)
    } else {
        Err(D::Error::custom(format!(
            "expected a non-negative whole number, got {value}"
        )))
    }
}

/// Deserializes a `name → f64` map whose values may be numeric strings.
pub(crate) fn float_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Numeric>::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for (name, value) in raw {
        let value = value.into_f64::<D::Error>()?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "float")]
        rate: f64,
        #[serde(deserialize_with = "count")]
        slots: u32,
        #[serde(deserialize_with = "float_map")]
        params: BTreeMap<String, f64>,
    }

    #[test]
    fn numbers_and_numeric_strings_are_accepted() {
        let sample: Sample = serde_json::from_str(
            r#"{"rate": "0.25", "slots": 12, "params": {"p1": 0.03, "Gb": "81"}}"#,
        )
        .unwrap();

        assert_eq!(sample.rate, 0.25);
        assert_eq!(sample.slots, 12);
        assert_eq!(sample.params["p1"], 0.03);
        assert_eq!(sample.params["Gb"], 81.0);
    }

    #[test]
    fn counts_accept_whole_floats_and_strings() {
        let sample: Sample =
            serde_json::from_str(r#"{"rate": 1, "slots": "5", "params": {}}"#).unwrap();
        assert_eq!(sample.slots, 5);

        let sample: Sample =
            serde_json::from_str(r#"{"rate": 1, "slots": 5.0, "params": {}}"#).unwrap();
        assert_eq!(sample.slots, 5);
    }

    #[test]
    fn garbage_is_rejected() {
        for text in [
            r#"{"rate": "fast", "slots": 1, "params": {}}"#,
            r#"{"rate": 1, "slots": 2.5, "params": {}}"#,
            r#"{"rate": 1, "slots": -1, "params": {}}"#,
            r#"{"rate": true, "slots": 1, "params": {}}"#,
        ] {
            assert!(serde_json::from_str::<Sample>(text).is_err(), "{text}");
        }
    }
}
