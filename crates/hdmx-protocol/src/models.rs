//! Device capability model
//!
//! Matrices do not advertise their size. The input and output counts are
//! inferred from the highest port numbers seen in a routing table reply and
//! then clamped, so that a confused or hostile reply can never make a host
//! allocate hundreds of entities.

use crate::response::RoutingSnapshot;

/// Default TCP control port
pub const DEFAULT_PORT: u16 = 8000;

/// Lowest input/output count a capability set may report
pub const MIN_CHANNELS: u32 = 1;

/// Highest input/output count a capability set may report
pub const MAX_CHANNELS: u32 = 32;

/// Count assumed when a probe observes no routes at all
pub const DEFAULT_CHANNEL_COUNT: u32 = 8;

/// Discovered (or defaulted) capabilities of one matrix
///
/// Both counts are always within `MIN_CHANNELS..=MAX_CHANNELS`, including
/// after deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawCapabilitySet"))]
pub struct CapabilitySet {
    /// Model name reported by the device, if any
    pub model: Option<String>,
    inputs: u32,
    outputs: u32,
}

/// Unchecked wire form of [`CapabilitySet`]
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawCapabilitySet {
    #[serde(default)]
    model: Option<String>,
    inputs: u32,
    outputs: u32,
}

#[cfg(feature = "serde")]
impl From<RawCapabilitySet> for CapabilitySet {
    fn from(raw: RawCapabilitySet) -> Self {
        Self::new(raw.model, raw.inputs, raw.outputs)
    }
}

impl CapabilitySet {
    /// Create a capability set, clamping both counts
    pub fn new(model: Option<String>, inputs: u32, outputs: u32) -> Self {
        Self {
            model,
            inputs: clamp_channels(inputs),
            outputs: clamp_channels(outputs),
        }
    }

    /// Derive capabilities from a routing snapshot
    ///
    /// Each count is the highest port number seen, or [`DEFAULT_CHANNEL_COUNT`]
    /// if the snapshot is empty.
    pub fn from_snapshot(model: Option<String>, snapshot: &RoutingSnapshot) -> Self {
        Self::new(
            model,
            snapshot.max_input().unwrap_or(DEFAULT_CHANNEL_COUNT),
            snapshot.max_output().unwrap_or(DEFAULT_CHANNEL_COUNT),
        )
    }

    /// Number of inputs
    pub fn inputs(&self) -> u32 {
        self.inputs
    }

    /// Number of outputs
    pub fn outputs(&self) -> u32 {
        self.outputs
    }

    /// Capabilities used when nothing at all could be learned
    pub fn fallback() -> Self {
        Self::new(None, DEFAULT_CHANNEL_COUNT, DEFAULT_CHANNEL_COUNT)
    }

    /// Selectable option labels, one per input: `Input 1`, `Input 2`, ...
    pub fn input_options(&self) -> Vec<String> {
        (1..=self.inputs).map(input_label).collect()
    }

    /// Returns true if `input` is a valid input number for this device
    pub fn has_input(&self, input: u32) -> bool {
        (1..=self.inputs).contains(&input)
    }

    /// Returns true if `output` is a valid output number for this device
    pub fn has_output(&self, output: u32) -> bool {
        (1..=self.outputs).contains(&output)
    }

    /// Human-readable size, e.g. `8x4`
    pub fn dimensions(&self) -> String {
        format!("{}x{}", self.inputs, self.outputs)
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Label shown for an input option
pub fn input_label(input: u32) -> String {
    format!("Input {}", input)
}

/// Parse an input option label back to its number
///
/// Accepts `Input N` in any case; anything else yields `None`.
pub fn parse_input_label(label: &str) -> Option<u32> {
    let mut parts = label.split_whitespace();
    let word = parts.next()?;
    let number = parts.next()?;
    if !word.eq_ignore_ascii_case("input") || parts.next().is_some() {
        return None;
    }
    number.parse().ok()
}

fn clamp_channels(count: u32) -> u32 {
    count.clamp(MIN_CHANNELS, MAX_CHANNELS)
}
