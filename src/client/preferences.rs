//! Read preference and write concern resolution

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default acceptable latency window for read member selection
pub const DEFAULT_ACCEPTABLE_LATENCY_MS: u64 = 15;

/// Read mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Reads go to the primary only
    #[default]
    Primary,
    /// Reads prefer a secondary, falling back to the primary
    SecondaryPreferred,
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::SecondaryPreferred => write!(f, "secondary_preferred"),
        }
    }
}

impl std::str::FromStr for ReadMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary_preferred" | "secondaryPreferred" => Ok(Self::SecondaryPreferred),
            _ => Err(Error::Config(format!(
                "invalid read mode '{}': expected primary or secondary_preferred",
                s
            ))),
        }
    }
}

/// Tag set filter: every key/value must match a member's tags
pub type TagSet = BTreeMap<String, String>;

/// Immutable read preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPreference {
    mode: ReadMode,
    tag_sets: Vec<TagSet>,
    acceptable_latency_ms: u64,
}

impl ReadPreference {
    /// Read mode
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Ordered tag set filters
    pub fn tag_sets(&self) -> &[TagSet] {
        &self.tag_sets
    }

    /// Acceptable latency window in milliseconds
    pub fn acceptable_latency_ms(&self) -> u64 {
        self.acceptable_latency_ms
    }

    /// Whether reads may be served by a non-primary node
    pub fn slave_ok(&self) -> bool {
        self.mode != ReadMode::Primary
    }
}

impl Default for ReadPreference {
    fn default() -> Self {
        resolve_read_preference(None, None, None, false)
    }
}

/// Resolve a read preference
///
/// The legacy `slave_ok` flag wins over an explicit mode; without either
/// the mode is primary-only.
pub fn resolve_read_preference(
    explicit_mode: Option<ReadMode>,
    tag_sets: Option<Vec<TagSet>>,
    acceptable_latency_ms: Option<u64>,
    legacy_slave_ok: bool,
) -> ReadPreference {
    let mode = if legacy_slave_ok {
        ReadMode::SecondaryPreferred
    } else {
        explicit_mode.unwrap_or_default()
    };

    ReadPreference {
        mode,
        tag_sets: tag_sets.unwrap_or_default(),
        acceptable_latency_ms: acceptable_latency_ms.unwrap_or(DEFAULT_ACCEPTABLE_LATENCY_MS),
    }
}

/// Acknowledgement width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Number of nodes (0 = unacknowledged)
    Nodes(u32),
    /// A majority of voting nodes
    Majority,
    /// A named server-side tag set
    Tag(String),
}

impl std::str::FromStr for Acknowledgement {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u32>() {
            return Ok(Self::Nodes(n));
        }
        match s {
            "" => Err(Error::Config("write concern 'w' must not be empty".into())),
            "majority" => Ok(Self::Majority),
            tag => Ok(Self::Tag(tag.to_string())),
        }
    }
}

impl std::fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nodes(n) => write!(f, "{}", n),
            Self::Majority => write!(f, "majority"),
            Self::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

/// Immutable write concern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcern {
    /// Acknowledgement width
    pub w: Acknowledgement,
    /// Wait for the journal commit
    pub j: bool,
    /// Wait for a data file flush
    pub fsync: bool,
    /// How long the server may wait for the acknowledgement
    pub wtimeout: Option<Duration>,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self {
            w: Acknowledgement::Nodes(1),
            j: false,
            fsync: false,
            wtimeout: None,
        }
    }
}

impl WriteConcern {
    /// Whether the server acknowledges writes under this concern
    pub fn acknowledged(&self) -> bool {
        self.w != Acknowledgement::Nodes(0) || self.j || self.fsync
    }

    /// Whether both journal and fsync were requested
    ///
    /// The combination is accepted; journaling already implies durability so
    /// the fsync flag adds nothing.
    pub fn redundant_durability(&self) -> bool {
        self.j && self.fsync
    }
}

/// Per-call write concern overrides; unset fields inherit the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteConcernOptions {
    /// Acknowledgement width
    pub w: Option<Acknowledgement>,
    /// Journal flag
    pub j: Option<bool>,
    /// Fsync flag
    pub fsync: Option<bool>,
    /// Acknowledgement timeout
    pub wtimeout: Option<Duration>,
}

/// Merge per-call options over client defaults, field by field
pub fn resolve_write_concern(
    options: &WriteConcernOptions,
    defaults: &WriteConcern,
) -> WriteConcern {
    let concern = WriteConcern {
        w: options.w.clone().unwrap_or_else(|| defaults.w.clone()),
        j: options.j.unwrap_or(defaults.j),
        fsync: options.fsync.unwrap_or(defaults.fsync),
        wtimeout: options.wtimeout.or(defaults.wtimeout),
    };

    if concern.redundant_durability() {
        tracing::debug!("write concern requests both j and fsync; journal semantics apply");
    }

    concern
}

/// Parse tag sets of the form `dc:ny,rack:1;dc:sf`
///
/// Sets are separated by `;`, pairs by `,`, keys from values by `:`.
pub fn parse_tag_sets(s: &str) -> Result<Vec<TagSet>> {
    let mut sets = Vec::new();
    for raw_set in s.split(';').map(str::trim).filter(|set| !set.is_empty()) {
        let mut set = TagSet::new();
        for pair in raw_set.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once(':').ok_or_else(|| {
                Error::Config(format!("invalid tag '{}': expected key:value", pair))
            })?;
            set.insert(key.trim().to_string(), value.trim().to_string());
        }
        sets.push(set);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_preference_defaults() {
        let pref = ReadPreference::default();
        assert_eq!(pref.mode(), ReadMode::Primary);
        assert!(pref.tag_sets().is_empty());
        assert_eq!(pref.acceptable_latency_ms(), 15);
        assert!(!pref.slave_ok());
    }

    #[test]
    fn test_slave_ok_overrides_explicit_mode() {
        let pref = resolve_read_preference(Some(ReadMode::Primary), None, None, true);
        assert_eq!(pref.mode(), ReadMode::SecondaryPreferred);
        assert!(pref.slave_ok());
    }

    #[test]
    fn test_explicit_mode_used_without_slave_ok() {
        let pref =
            resolve_read_preference(Some(ReadMode::SecondaryPreferred), None, Some(40), false);
        assert_eq!(pref.mode(), ReadMode::SecondaryPreferred);
        assert_eq!(pref.acceptable_latency_ms(), 40);
    }

    #[test]
    fn test_read_mode_from_str() {
        assert_eq!("primary".parse::<ReadMode>().unwrap(), ReadMode::Primary);
        assert_eq!(
            "secondary_preferred".parse::<ReadMode>().unwrap(),
            ReadMode::SecondaryPreferred
        );
        assert!("nearest".parse::<ReadMode>().is_err());
    }

    #[test]
    fn test_write_concern_field_by_field_override() {
        let defaults = WriteConcern {
            w: Acknowledgement::Majority,
            j: true,
            fsync: false,
            wtimeout: Some(Duration::from_millis(500)),
        };
        let options = WriteConcernOptions {
            w: Some(Acknowledgement::Nodes(2)),
            ..Default::default()
        };

        let concern = resolve_write_concern(&options, &defaults);
        assert_eq!(concern.w, Acknowledgement::Nodes(2));
        assert!(concern.j);
        assert_eq!(concern.wtimeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_journal_and_fsync_accepted_together() {
        let options = WriteConcernOptions {
            j: Some(true),
            fsync: Some(true),
            ..Default::default()
        };
        let concern = resolve_write_concern(&options, &WriteConcern::default());
        assert!(concern.j);
        assert!(concern.fsync);
        assert!(concern.redundant_durability());
    }

    #[test]
    fn test_acknowledged() {
        assert!(WriteConcern::default().acknowledged());

        let unacknowledged = WriteConcern {
            w: Acknowledgement::Nodes(0),
            ..Default::default()
        };
        assert!(!unacknowledged.acknowledged());

        let journaled = WriteConcern {
            w: Acknowledgement::Nodes(0),
            j: true,
            ..Default::default()
        };
        assert!(journaled.acknowledged());
    }

    #[test]
    fn test_acknowledgement_from_str() {
        assert_eq!("0".parse::<Acknowledgement>().unwrap(), Acknowledgement::Nodes(0));
        assert_eq!(
            "majority".parse::<Acknowledgement>().unwrap(),
            Acknowledgement::Majority
        );
        assert_eq!(
            "dc_east".parse::<Acknowledgement>().unwrap(),
            Acknowledgement::Tag("dc_east".into())
        );
        assert!("".parse::<Acknowledgement>().is_err());
    }

    #[test]
    fn test_parse_tag_sets() {
        let sets = parse_tag_sets("dc:ny, rack:1; dc:sf").unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].get("dc"), Some(&"ny".to_string()));
        assert_eq!(sets[0].get("rack"), Some(&"1".to_string()));
        assert_eq!(sets[1].get("dc"), Some(&"sf".to_string()));
    }

    #[test]
    fn test_parse_tag_sets_invalid_pair() {
        assert!(parse_tag_sets("dc=ny").is_err());
    }
}
