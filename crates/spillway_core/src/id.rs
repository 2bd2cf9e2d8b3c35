//! Unique identifiers for SPILLWAY calls.
//!
//! A `CallId` is the sole correlation key between a published request and
//! its eventual response. It is caller-assigned, random, and never reused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Call identifier - correlates a request to its eventual response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Create a new random CallId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call_{}", self.0)
    }
}

impl std::str::FromStr for CallId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("call_").unwrap_or(s);
        Ok(Self(Uuid::parse_str(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_unique() {
        let id1 = CallId::new();
        let id2 = CallId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_call_id_from_bytes() {
        let bytes = [7u8; 16];
        let id = CallId::from_bytes(bytes);
        assert_eq!(id.as_bytes(), &bytes);
    }

    #[test]
    fn test_call_id_display() {
        let id = CallId::new();
        let s = format!("{}", id);
        assert!(s.starts_with("call_"));
    }

    #[test]
    fn test_call_id_parse_round_trip() {
        let id = CallId::new();
        let parsed: CallId = format!("{}", id).parse().unwrap();
        assert_eq!(id, parsed);

        let bare: CallId = id.as_uuid().to_string().parse().unwrap();
        assert_eq!(id, bare);
    }

    #[test]
    fn test_call_id_parse_invalid() {
        let result: Result<CallId, _> = "not-a-uuid".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_call_id_serde() {
        let id = CallId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: CallId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
