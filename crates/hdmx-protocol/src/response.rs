//! Reply parsing
//!
//! Device replies are free-form text with no length prefix, no terminator and
//! no stable schema. Every parser here is total: malformed, partial or empty
//! input yields an empty snapshot, [`PowerState::Unknown`] or `None`.
//!
//! Ambiguities are resolved deterministically:
//! - a routing reply that lists the same output twice keeps the *last* line
//! - a power reply that mentions both `power on` and `power off` reads as on

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)input\s*(\d+)\s*(?:->|=>)\s*output\s*(\d+)").expect("valid route pattern")
});

static POWER_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)power\s*on").expect("valid power-on pattern"));

static POWER_OFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)power\s*off").expect("valid power-off pattern"));

/// Decode raw reply bytes to text
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_reply(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Output → input mapping observed in one routing table reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoutingSnapshot {
    routes: BTreeMap<u32, u32>,
}

impl RoutingSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `output` shows `input`, replacing any earlier entry
    pub fn insert(&mut self, output: u32, input: u32) {
        self.routes.insert(output, input);
    }

    /// Input currently routed to `output`, if the reply mentioned it
    pub fn input_for(&self, output: u32) -> Option<u32> {
        self.routes.get(&output).copied()
    }

    /// Iterate over `(output, input)` pairs in output order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.routes.iter().map(|(&output, &input)| (output, input))
    }

    /// Number of outputs in the snapshot
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes were observed
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Highest input number observed
    pub fn max_input(&self) -> Option<u32> {
        self.routes.values().copied().max()
    }

    /// Highest output number observed
    pub fn max_output(&self) -> Option<u32> {
        self.routes.keys().next_back().copied()
    }
}

impl FromIterator<(u32, u32)> for RoutingSnapshot {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (output, input) in iter {
            snapshot.insert(output, input);
        }
        snapshot
    }
}

/// Power state of the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerState {
    /// Device reported or was commanded on
    On,
    /// Device reported or was commanded off
    Off,
    /// Nothing known yet
    #[default]
    Unknown,
}

impl PowerState {
    /// `Some(true)` for on, `Some(false)` for off, `None` when unknown
    pub fn is_on(&self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Unknown => None,
        }
    }

    /// Returns true unless the state is unknown
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Lowercase display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Unknown => "unknown",
        }
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Parse a routing table reply
///
/// Every line is scanned for `input N -> output M`. Lines without a match,
/// and matches naming port 0 or a number too large to represent, are ignored.
pub fn parse_routing(text: &str) -> RoutingSnapshot {
    let mut snapshot = RoutingSnapshot::new();

    for line in text.lines() {
        for caps in ROUTE_RE.captures_iter(line) {
            let input = caps[1].parse::<u32>().ok().filter(|&n| n > 0);
            let output = caps[2].parse::<u32>().ok().filter(|&n| n > 0);
            match (input, output) {
                (Some(input), Some(output)) => snapshot.insert(output, input),
                _ => trace!("Ignoring route with invalid port in {:?}", line),
            }
        }
    }

    snapshot
}

/// Parse a power reply
///
/// `power on` is looked for before `power off`, so a reply containing both
/// reads as on.
pub fn parse_power(text: &str) -> PowerState {
    if POWER_ON_RE.is_match(text) {
        PowerState::On
    } else if POWER_OFF_RE.is_match(text) {
        PowerState::Off
    } else {
        PowerState::Unknown
    }
}

/// Parse a model identity reply: the first non-blank line, trimmed
pub fn parse_model_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
