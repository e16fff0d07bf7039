//! Small parsing helpers shared by more than one point-id syntax.
//!
//! Each adapter owns the syntax of its own point identifiers, but
//! they all split on `::` as the outer separator, so the splitting and
//! error-wrapping boilerplate lives here once.

use crate::error::GatewayError;

/// Splits `id` on `::` and returns the resulting parts, failing with
/// [`GatewayError::InvalidId`] if fewer than `min_parts` parts result.
pub fn split_id<'a>(
    id: &'a str,
    min_parts: usize,
) -> Result<Vec<&'a str>, GatewayError> {
    let parts: Vec<&str> = id.split("::").collect();
    if parts.len() < min_parts || parts.iter().any(|p| p.is_empty()) {
        return Err(GatewayError::InvalidId {
            id: id.to_string(),
            reason: format!("expected at least {min_parts} non-empty '::'-separated parts"),
        });
    }
    Ok(parts)
}

/// Parses `s` as a value of type `T`, wrapping any failure as
/// [`GatewayError::InvalidId`] attributed to `id`.
pub fn parse_id_component<T: std::str::FromStr>(
    id: &str,
    s: &str,
    what: &str,
) -> Result<T, GatewayError> {
    s.parse::<T>().map_err(|_| GatewayError::InvalidId {
        id: id.to_string(),
        reason: format!("'{s}' is not a valid {what}"),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_split_id_ok() {
        let parts = split_id("gw::1::hr:10", 3).unwrap();
        assert_eq!(parts, vec!["gw", "1", "hr:10"]);
    }

    #[rstest]
    fn test_split_id_too_few_parts() {
        assert!(split_id("gw::1", 3).is_err());
    }

    #[rstest]
    fn test_split_id_rejects_empty_part() {
        assert!(split_id("gw::::1", 3).is_err());
    }

    #[rstest]
    fn test_parse_id_component_ok() {
        let n: u32 = parse_id_component("gw::1", "1", "slave id").unwrap();
        assert_eq!(n, 1);
    }

    #[rstest]
    fn test_parse_id_component_err() {
        let result: Result<u32, _> = parse_id_component("gw::x", "x", "slave id");
        assert!(result.is_err());
    }
}
