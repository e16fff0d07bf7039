//! The value type that crosses every data-module boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Either a single printable string or an ordered sequence of printable
/// strings (an array-valued read).
///
/// All values cross the module boundary in this printable form; semantic
/// typing (int/float/bool) lives one layer up, in scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    /// A scalar read or write result.
    Single(String),
    /// An array-valued read result, e.g. a Modbus register block.
    Multiple(Vec<String>),
}

impl PointValue {
    /// Returns this value collapsed to its own display string, joining
    /// multi-valued results with a comma for contexts (style-rule matching,
    /// scheme rendering) that only ever operate on one string.
    #[must_use]
    pub fn as_display(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::Multiple(values) => values.join(","),
        }
    }

    /// Collapses a values vector to [`PointValue::Single`] when it holds
    /// exactly one element, otherwise returns [`PointValue::Multiple`].
    ///
    /// This mirrors the collapse rule used by the Modbus and BACnet
    /// adapters: a `count == 1` read is a bare string, not a one-element
    /// array.
    #[must_use]
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multiple(values)
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<String> for PointValue {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<&str> for PointValue {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_from_values_collapses_single() {
        let value = PointValue::from_values(vec!["42".to_string()]);
        assert_eq!(value, PointValue::Single("42".to_string()));
    }

    #[rstest]
    fn test_from_values_keeps_multiple() {
        let value = PointValue::from_values(vec!["1".to_string(), "2".to_string()]);
        assert_eq!(
            value,
            PointValue::Multiple(vec!["1".to_string(), "2".to_string()])
        );
    }

    #[rstest]
    fn test_as_display_joins_multiple() {
        let value = PointValue::Multiple(vec!["1".to_string(), "2".to_string()]);
        assert_eq!(value.as_display(), "1,2");
    }

    #[rstest]
    fn test_serde_roundtrip_single() {
        let value = PointValue::Single("7".to_string());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"7\"");
        let back: PointValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[rstest]
    fn test_serde_roundtrip_multiple() {
        let value = PointValue::Multiple(vec!["1".to_string(), "2".to_string()]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "[\"1\",\"2\"]");
        let back: PointValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
