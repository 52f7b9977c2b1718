//! Shared serde helper functions used across multiple modules.

use crate::version::unquoted_version_message;
use serde::de::{self, Visitor};
use serde::Deserializer;
use std::fmt;

/// Serde default function that returns `true`.
pub fn default_true() -> bool {
    true
}

/// Accept a YAML string or bare integer as a string, so `cherry_pick: [2, 3]`
/// works without quoting. Bare decimals are rejected because the float has
/// already dropped trailing zeros (`2.10` reads as `2.1`).
pub fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct ScalarVisitor;

    impl Visitor<'_> for ScalarVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Err(E::custom(unquoted_version_message(v)))
        }
    }

    deserializer.deserialize_any(ScalarVisitor)
}
