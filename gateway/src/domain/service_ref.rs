//! Enigma2 service reference normalization.
//!
//! serviceRef: a 10-field colon-delimited id. Normalization = uppercase +
//! namespace field (index 6) zeroed + first 10 fields + trailing `:`.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ServiceRef(String);

impl ServiceRef {
    /// Normalize a raw service ref per spec.md GLOSSARY.
    ///
    /// Returns `None` if the ref does not have at least 10 colon-separated
    /// fields.
    pub fn normalize(raw: &str) -> Option<Self> {
        let upper = raw.to_uppercase();
        let fields: Vec<&str> = upper.split(':').collect();
        if fields.len() < 10 {
            return None;
        }
        let mut first10: Vec<String> = fields[..10].iter().map(|s| s.to_string()).collect();
        // namespace field is index 6
        first10[6] = "0".to_string();
        Some(Self(format!("{}:", first10.join(":"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lease key for this normalized service ref.
    pub fn lease_key(&self) -> String {
        format!("service:{}", self.0)
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_namespace() {
        let raw = "1:0:19:132f:3ef:1:c00000:0:0:0:";
        let norm = ServiceRef::normalize(raw).unwrap();
        assert_eq!(norm.as_str(), "1:0:19:132F:3EF:1:0:0:0:0:");
    }

    #[test]
    fn keeps_only_first_ten_fields() {
        let raw = "1:0:19:132F:3EF:1:C00000:0:0:0:EXTRA:MORE";
        let norm = ServiceRef::normalize(raw).unwrap();
        assert_eq!(norm.as_str(), "1:0:19:132F:3EF:1:0:0:0:0:");
    }

    #[test]
    fn rejects_short_refs() {
        assert!(ServiceRef::normalize("1:0:19").is_none());
    }

    #[test]
    fn lease_key_is_namespaced() {
        let norm = ServiceRef::normalize("1:0:19:132F:3EF:1:C00000:0:0:0:").unwrap();
        assert_eq!(norm.lease_key(), "service:1:0:19:132F:3EF:1:0:0:0:0:");
    }
}
