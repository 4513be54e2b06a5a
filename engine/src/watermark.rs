//! Last-update watermark for staleness decisions.
//!
//! The watermark records the timestamp of the most recent remote state this
//! client has incorporated. Remote notifications are accepted only when
//! their timestamp strictly exceeds it, which also suppresses the echo of
//! the client's own writes once the watermark has advanced past the write
//! stamp.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// The per-client staleness watermark.
///
/// Acceptance rules:
/// 1. A timestamp strictly greater than the watermark is accepted
/// 2. Equal timestamps are treated as already applied and ignored
///
/// The value never regresses, so acceptance decisions are monotone over the
/// lifetime of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    last_update: Timestamp,
}

impl Watermark {
    /// Create a watermark that accepts any positive timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a watermark at a specific timestamp.
    pub fn at(last_update: Timestamp) -> Self {
        Self { last_update }
    }

    /// The most recent incorporated timestamp.
    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    /// Whether a remote timestamp supersedes local state.
    pub fn accepts(&self, timestamp: Timestamp) -> bool {
        timestamp > self.last_update
    }

    /// Advance to a timestamp. Never regresses.
    pub fn advance(&mut self, timestamp: Timestamp) {
        self.last_update = self.last_update.max(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_watermark_starts_at_zero() {
        let watermark = Watermark::new();
        assert_eq!(watermark.last_update(), 0);
    }

    #[test]
    fn accepts_strictly_greater_only() {
        let watermark = Watermark::at(1000);
        assert!(watermark.accepts(1001));
        assert!(!watermark.accepts(1000)); // equal = already applied
        assert!(!watermark.accepts(999));
    }

    #[test]
    fn advance_moves_forward() {
        let mut watermark = Watermark::new();
        watermark.advance(500);
        assert_eq!(watermark.last_update(), 500);
        watermark.advance(1500);
        assert_eq!(watermark.last_update(), 1500);
    }

    #[test]
    fn advance_never_regresses() {
        let mut watermark = Watermark::at(2000);
        watermark.advance(100);
        assert_eq!(watermark.last_update(), 2000);
    }

    #[test]
    fn serialization_roundtrip() {
        let watermark = Watermark::at(1706745600000);
        let json = serde_json::to_string(&watermark).unwrap();
        let parsed: Watermark = serde_json::from_str(&json).unwrap();
        assert_eq!(watermark, parsed);
    }

    #[test]
    fn serialization_format() {
        let watermark = Watermark::at(42);
        let json = serde_json::to_string(&watermark).unwrap();
        assert!(json.contains("lastUpdate")); // camelCase
    }
}
