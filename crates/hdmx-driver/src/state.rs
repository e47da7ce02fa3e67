//! Cached device state
//!
//! The cache is advisory. The device can be power-cycled or switched from its
//! front panel at any time, so every value here is only "last observed" and is
//! reconciled on the next query.

use std::time::Instant;

use hdmx_protocol::{CapabilitySet, PowerState, RoutingSnapshot};

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverPhase {
    /// Capabilities not yet known
    #[default]
    Uninitialized,
    /// Capabilities known (probed or restored from configuration)
    Probed,
    /// Entities have been built from the capabilities
    Operational,
}

impl DriverPhase {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Probed => "Probed",
            Self::Operational => "Operational",
        }
    }
}

/// Last known state of one matrix
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    /// Last known input per output
    routes: RoutingSnapshot,
    /// Last known power state
    power: PowerState,
    /// Capabilities in use
    capabilities: Option<CapabilitySet>,
    /// Lifecycle phase
    phase: DriverPhase,
    /// Last time a query returned usable data
    last_refresh: Option<Instant>,
}

impl StateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Input last seen on `output`
    pub fn input_for(&self, output: u32) -> Option<u32> {
        self.routes.input_for(output)
    }

    /// All known routes
    pub fn routes(&self) -> &RoutingSnapshot {
        &self.routes
    }

    /// Last known power state
    pub fn power(&self) -> PowerState {
        self.power
    }

    /// Capabilities in use
    pub fn capabilities(&self) -> Option<&CapabilitySet> {
        self.capabilities.as_ref()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Last time a query returned usable data
    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Record a single route. Returns true if the cached value changed.
    pub fn apply_route(&mut self, output: u32, input: u32) -> bool {
        if self.routes.input_for(output) == Some(input) {
            return false;
        }
        self.routes.insert(output, input);
        true
    }

    /// Merge a freshly parsed snapshot
    ///
    /// Outputs present in the snapshot are overwritten; outputs missing from
    /// it keep their previous value. Once capabilities are known, pairs
    /// outside them are dropped. Returns the `(output, input)` pairs that
    /// changed.
    pub fn merge_snapshot(&mut self, snapshot: &RoutingSnapshot) -> Vec<(u32, u32)> {
        if !snapshot.is_empty() {
            self.touch();
        }
        let known = self.capabilities.clone();
        snapshot
            .iter()
            .filter(|&(output, input)| match &known {
                Some(caps) => caps.has_output(output) && caps.has_input(input),
                None => true,
            })
            .filter(|&(output, input)| self.apply_route(output, input))
            .collect()
    }

    /// Record a commanded power state. Returns true if it changed.
    pub fn set_power(&mut self, state: PowerState) -> bool {
        let changed = self.power != state;
        self.power = state;
        changed
    }

    /// Merge a parsed power reply
    ///
    /// An unknown reply never erases a known state. Returns true if the
    /// cached value changed.
    pub fn merge_power(&mut self, state: PowerState) -> bool {
        if !state.is_known() {
            return false;
        }
        self.touch();
        self.set_power(state)
    }

    /// Install capabilities, advancing `Uninitialized` to `Probed`
    pub fn set_capabilities(&mut self, capabilities: CapabilitySet) {
        self.capabilities = Some(capabilities);
        if self.phase == DriverPhase::Uninitialized {
            self.phase = DriverPhase::Probed;
        }
    }

    /// Advance `Probed` to `Operational`. Returns true on the transition.
    pub fn mark_operational(&mut self) -> bool {
        if self.phase == DriverPhase::Probed {
            self.phase = DriverPhase::Operational;
            return true;
        }
        false
    }

    fn touch(&mut self) {
        self.last_refresh = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdmx_protocol::parse_routing;

    #[test]
    fn test_merge_keeps_missing_outputs() {
        let mut cache = StateCache::new();
        cache.merge_snapshot(&parse_routing("input 1 -> output 1\ninput 4 -> output 2\n"));

        let changed = cache.merge_snapshot(&parse_routing("input 3 -> output 1\n"));
        assert_eq!(changed, vec![(1, 3)]);
        assert_eq!(cache.input_for(1), Some(3));
        assert_eq!(cache.input_for(2), Some(4));
    }

    #[test]
    fn test_merge_reports_only_changes() {
        let mut cache = StateCache::new();
        let snapshot = parse_routing("input 2 -> output 1\ninput 5 -> output 3\n");
        assert_eq!(cache.merge_snapshot(&snapshot), vec![(1, 2), (3, 5)]);
        assert!(cache.merge_snapshot(&snapshot).is_empty());
        assert!(cache.last_refresh().is_some());
    }

    #[test]
    fn test_merge_drops_routes_outside_capabilities() {
        let mut cache = StateCache::new();
        cache.set_capabilities(CapabilitySet::new(None, 8, 8));

        let changed = cache.merge_snapshot(&parse_routing(
            "input 40 -> output 1\ninput 3 -> output 12\ninput 9 -> output 2\ninput 5 -> output 3\n",
        ));
        assert_eq!(changed, vec![(3, 5)]);
        assert_eq!(cache.input_for(1), None);
        assert_eq!(cache.input_for(12), None);
        assert_eq!(cache.input_for(2), None);
    }

    #[test]
    fn test_empty_snapshot_does_not_touch() {
        let mut cache = StateCache::new();
        assert!(cache.merge_snapshot(&RoutingSnapshot::new()).is_empty());
        assert!(cache.last_refresh().is_none());
    }

    #[test]
    fn test_unknown_power_never_erases() {
        let mut cache = StateCache::new();
        assert!(cache.merge_power(PowerState::On));
        assert!(!cache.merge_power(PowerState::Unknown));
        assert_eq!(cache.power(), PowerState::On);
        assert!(cache.merge_power(PowerState::Off));
        assert_eq!(cache.power(), PowerState::Off);
    }

    #[test]
    fn test_phase_transitions() {
        let mut cache = StateCache::new();
        assert_eq!(cache.phase(), DriverPhase::Uninitialized);
        assert!(!cache.mark_operational());

        cache.set_capabilities(CapabilitySet::fallback());
        assert_eq!(cache.phase(), DriverPhase::Probed);

        assert!(cache.mark_operational());
        assert_eq!(cache.phase(), DriverPhase::Operational);

        // Re-probing never moves the driver backwards
        cache.set_capabilities(CapabilitySet::new(None, 4, 4));
        assert_eq!(cache.phase(), DriverPhase::Operational);
        assert_eq!(cache.capabilities().map(|c| c.inputs()), Some(4));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn snapshot(pairs: &[(u32, u32)]) -> RoutingSnapshot {
            pairs.iter().copied().collect()
        }

        proptest! {
            #[test]
            fn merge_never_loses_outputs(
                first in prop::collection::vec((1u32..=16, 1u32..=16), 0..16),
                second in prop::collection::vec((1u32..=16, 1u32..=16), 0..16),
            ) {
                let first = snapshot(&first);
                let second = snapshot(&second);

                let mut cache = StateCache::new();
                cache.merge_snapshot(&first);
                cache.merge_snapshot(&second);

                for (output, input) in first.iter() {
                    let expected = second.input_for(output).unwrap_or(input);
                    prop_assert_eq!(cache.input_for(output), Some(expected));
                }
                for (output, input) in second.iter() {
                    prop_assert_eq!(cache.input_for(output), Some(input));
                }
            }
        }
    }
}
