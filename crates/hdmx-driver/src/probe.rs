//! Capability probing
//!
//! This module asks a matrix for its model name and full routing table and
//! derives how many inputs and outputs it has. Probing runs during onboarding
//! and must never fail: any step that gets no answer simply contributes
//! nothing, and the result falls back to default counts.

use hdmx_protocol::{
    decode_reply, parse_model_name, parse_routing, CapabilitySet, MatrixCommand, RoutingSnapshot,
};
use tracing::{debug, info, trace};

use crate::transport::Transport;

/// Result of probing a matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Derived capabilities (always clamped)
    pub capabilities: CapabilitySet,
    /// Routing table observed while probing
    pub snapshot: RoutingSnapshot,
    /// Whether the device answered anything at all
    pub responded: bool,
}

/// Matrix capability prober
#[derive(Debug, Clone, Default)]
pub struct CapabilityProber;

impl CapabilityProber {
    /// Create a new prober
    pub fn new() -> Self {
        Self
    }

    /// Probe the device behind `transport`
    pub async fn probe<T: Transport>(&self, transport: &T) -> ProbeResult {
        let endpoint = transport.endpoint();
        debug!("Probing {}...", endpoint);

        let mut responded = false;

        let model = match transport.send(&MatrixCommand::QueryModel.encode()).await {
            Some(bytes) => {
                responded |= !bytes.is_empty();
                let text = decode_reply(&bytes);
                trace!("Model response: {:?}", text);
                parse_model_name(&text)
            }
            None => {
                debug!("No model response from {}", endpoint);
                None
            }
        };

        let snapshot = match transport.send(&MatrixCommand::QueryRouting.encode()).await {
            Some(bytes) => {
                responded |= !bytes.is_empty();
                let text = decode_reply(&bytes);
                trace!("Routing response: {:?}", text);
                parse_routing(&text)
            }
            None => {
                debug!("No routing response from {}", endpoint);
                RoutingSnapshot::new()
            }
        };

        let capabilities = CapabilitySet::from_snapshot(model, &snapshot);
        info!(
            "Probed {}: {} ({})",
            endpoint,
            capabilities.model.as_deref().unwrap_or("unknown model"),
            capabilities.dimensions()
        );

        ProbeResult {
            capabilities,
            snapshot,
            responded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[tokio::test]
    async fn test_probe_derives_counts_from_routing() {
        let transport = ScriptedTransport::new()
            .reply("r type!", "UHD-64\r\n")
            .reply(
                "r av out 0!",
                "input 6 -> output 1\r\ninput 2 -> output 2\r\ninput 1 -> output 4\r\n",
            );

        let result = CapabilityProber::new().probe(&transport).await;
        assert_eq!(result.capabilities.model.as_deref(), Some("UHD-64"));
        assert_eq!(result.capabilities.inputs(), 6);
        assert_eq!(result.capabilities.outputs(), 4);
        assert_eq!(result.snapshot.len(), 3);
        assert!(result.responded);
    }

    #[tokio::test]
    async fn test_probe_clamps_absurd_counts() {
        let transport = ScriptedTransport::new().reply("r av out 0!", "input 40 -> output 99\r\n");

        let result = CapabilityProber::new().probe(&transport).await;
        assert_eq!(result.capabilities.inputs(), 32);
        assert_eq!(result.capabilities.outputs(), 32);
    }

    #[tokio::test]
    async fn test_probe_falls_back_when_unreachable() {
        let transport = ScriptedTransport::unreachable();

        let result = CapabilityProber::new().probe(&transport).await;
        assert_eq!(result.capabilities, CapabilitySet::fallback());
        assert!(result.snapshot.is_empty());
        assert!(!result.responded);
    }

    #[tokio::test]
    async fn test_probe_keeps_model_when_routing_is_silent() {
        let transport = ScriptedTransport::new().reply("r type!", "\r\nMX-0808\r\n");

        let result = CapabilityProber::new().probe(&transport).await;
        assert_eq!(result.capabilities.model.as_deref(), Some("MX-0808"));
        assert_eq!(result.capabilities.inputs(), 8);
        assert_eq!(result.capabilities.outputs(), 8);
    }
}
