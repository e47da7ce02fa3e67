//! State-change notifications
//!
//! The driver broadcasts a [`DriverEvent`] whenever its cache actually
//! changes, so hosts can push updates to their UI without diffing state
//! themselves.

use hdmx_protocol::{CapabilitySet, PowerState};

/// Capacity of the per-driver broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something observable about a device changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Capabilities were probed or re-probed
    Probed {
        /// New capabilities
        capabilities: CapabilitySet,
    },

    /// An output now shows a different input
    RouteChanged {
        /// Output number
        output: u32,
        /// Input now routed to it
        input: u32,
    },

    /// Power state changed
    PowerChanged {
        /// New power state
        state: PowerState,
    },
}
