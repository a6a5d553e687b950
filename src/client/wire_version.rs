//! Wire version negotiation
//!
//! The client speaks a fixed range of protocol revisions. Each server reports
//! its own range during the handshake; the two must overlap for the
//! connection to be usable, and individual features are gated on the
//! revisions both sides understand.

use std::fmt;

/// Inclusive range of wire protocol revisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WireVersionRange {
    /// Lowest supported revision
    pub min: u32,
    /// Highest supported revision
    pub max: u32,
}

impl WireVersionRange {
    /// Create a range
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Whether `version` lies inside this range
    pub fn contains(&self, version: u32) -> bool {
        self.min <= version && version <= self.max
    }
}

impl fmt::Display for WireVersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Revisions this client knows how to speak
pub const CLIENT_WIRE_VERSIONS: WireVersionRange = WireVersionRange::new(0, 3);

/// Numbered wire features
pub mod features {
    /// Legacy opcodes only
    pub const BASELINE: u32 = 0;

    /// Aggregation returns cursors
    pub const AGGREGATION_CURSORS: u32 = 1;

    /// Insert/update/delete as write commands with batch limits
    pub const WRITE_COMMANDS: u32 = 2;

    /// Collection and index listing commands
    pub const LIST_COMMANDS: u32 = 3;
}

/// Whether the client and server ranges overlap
pub fn compatible(client: WireVersionRange, server: WireVersionRange) -> bool {
    client.min <= server.max && client.max >= server.min
}

/// Whether `feature` may be used against a server reporting `server`
///
/// A feature newer than the client's own maximum is never available, even
/// when the server supports it.
pub fn feature_available(client: WireVersionRange, server: WireVersionRange, feature: u32) -> bool {
    client.min <= feature && feature <= server.max && feature <= client.max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_ranges_compatible() {
        let range = WireVersionRange::new(0, 3);
        assert!(compatible(range, range));
    }

    #[test]
    fn test_disjoint_ranges_incompatible() {
        assert!(!compatible(
            WireVersionRange::new(0, 3),
            WireVersionRange::new(4, 5)
        ));
        assert!(!compatible(
            WireVersionRange::new(4, 5),
            WireVersionRange::new(0, 3)
        ));
    }

    #[test]
    fn test_boundary_touch_compatible() {
        assert!(compatible(
            WireVersionRange::new(1, 3),
            WireVersionRange::new(0, 1)
        ));
    }

    #[test]
    fn test_feature_beyond_client_max_unavailable() {
        let client = WireVersionRange::new(0, 3);
        let server = WireVersionRange::new(0, 5);
        assert!(!feature_available(client, server, 4));
        assert!(feature_available(client, server, 3));
    }

    #[test]
    fn test_feature_beyond_server_max_unavailable() {
        let client = WireVersionRange::new(0, 3);
        let server = WireVersionRange::new(0, 1);
        assert!(feature_available(client, server, features::AGGREGATION_CURSORS));
        assert!(!feature_available(client, server, features::WRITE_COMMANDS));
    }

    #[test]
    fn test_feature_below_client_min_unavailable() {
        let client = WireVersionRange::new(2, 3);
        let server = WireVersionRange::new(0, 3);
        assert!(!feature_available(client, server, features::BASELINE));
    }

    #[test]
    fn test_display() {
        assert_eq!(WireVersionRange::new(0, 3).to_string(), "[0, 3]");
    }
}
