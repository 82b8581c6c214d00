//! Statistics snapshot reported by the native resolver

use serde::{Deserialize, Serialize};

/// Counters the native side exposes as a JSON object.
///
/// Missing fields default to zero; anything that fails to parse as a whole
/// degrades to the zeroed snapshot instead of surfacing an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverStats {
    /// Blockchain height known to the resolver
    pub blocks: u64,
    /// Connected P2P peers
    pub peers: u64,
    /// DNS queries received (UDP + TCP)
    pub queries: u64,
    /// DNS responses sent
    pub responses: u64,
}

impl ResolverStats {
    /// Parse a raw snapshot, falling back to zeros on malformed input.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        // serde would also accept a positional array for the struct
        let object = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            Ok(other) => {
                tracing::warn!("Resolver stats are not a JSON object ({}), reporting zeros", other);
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Malformed resolver stats ({}), reporting zeros", e);
                return Self::default();
            }
        };

        match serde_json::from_value::<Self>(object) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Malformed resolver stats ({}), reporting zeros", e);
                Self::default()
            }
        }
    }

    /// True when every counter is zero
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native_format() {
        let stats =
            ResolverStats::parse(r#"{"blocks": 1520, "peers": 4, "queries": 37, "responses": 37}"#);
        assert_eq!(stats.blocks, 1520);
        assert_eq!(stats.peers, 4);
        assert_eq!(stats.queries, 37);
        assert_eq!(stats.responses, 37);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let stats = ResolverStats::parse(r#"{"blocks": 12}"#);
        assert_eq!(stats.blocks, 12);
        assert_eq!(stats.peers, 0);
        assert_eq!(stats.responses, 0);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let stats = ResolverStats::parse(r#"{"blocks": 3, "uptime": 99, "peers": 1}"#);
        assert_eq!(stats.blocks, 3);
        assert_eq!(stats.peers, 1);
    }

    #[test]
    fn test_malformed_degrades_to_zero() {
        assert!(ResolverStats::parse("not json").is_zero());
        assert!(ResolverStats::parse(r#"{"blocks": -4}"#).is_zero());
        assert!(ResolverStats::parse(r#"{"blocks": "many"}"#).is_zero());
        assert!(ResolverStats::parse("[1, 2, 3]").is_zero());
    }

    #[test]
    fn test_positional_array_is_not_counters() {
        assert_eq!(ResolverStats::parse("[1, 2, 3]"), ResolverStats::default());
        assert_eq!(ResolverStats::parse("[1, 2, 3, 4]"), ResolverStats::default());
        assert!(ResolverStats::parse("42").is_zero());
        assert!(ResolverStats::parse("null").is_zero());
    }

    #[test]
    fn test_empty_is_zero() {
        assert!(ResolverStats::parse("").is_zero());
        assert!(ResolverStats::parse("   \n").is_zero());
    }
}
