//! Persisted device configuration
//!
//! What a host stores per device so that a restart can rebuild the driver
//! without probing again. Records written before capability tracking existed
//! have no counts; those are re-probed on setup.

use hdmx_protocol::{CapabilitySet, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::transport::DeviceEndpoint;

/// Stored configuration of one matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Hostname or IP address
    pub host: String,
    /// TCP control port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Model name from the last probe
    #[serde(default)]
    pub model: Option<String>,
    /// Input count from the last probe
    #[serde(default)]
    pub inputs: Option<u32>,
    /// Output count from the last probe
    #[serde(default)]
    pub outputs: Option<u32>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DeviceConfig {
    /// Create a configuration with no probed capabilities
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            model: None,
            inputs: None,
            outputs: None,
        }
    }

    /// Create a configuration from an endpoint and probed capabilities
    pub fn from_probe(endpoint: &DeviceEndpoint, capabilities: &CapabilitySet) -> Self {
        Self::new(endpoint.host.clone(), endpoint.port).with_capabilities(capabilities)
    }

    /// Record probed capabilities
    pub fn with_capabilities(mut self, capabilities: &CapabilitySet) -> Self {
        self.model = capabilities.model.clone();
        self.inputs = Some(capabilities.inputs());
        self.outputs = Some(capabilities.outputs());
        self
    }

    /// TCP target
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.host.clone(), self.port)
    }

    /// Stored capabilities, or `None` if the record predates probing
    ///
    /// Stored counts are clamped again on the way in.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        match (self.inputs, self.outputs) {
            (Some(inputs), Some(outputs)) if inputs > 0 && outputs > 0 => {
                Some(CapabilitySet::new(self.model.clone(), inputs, outputs))
            }
            _ => None,
        }
    }

    /// Display title: the model name, or a name derived from the host
    pub fn title(&self) -> String {
        match &self.model {
            Some(model) => model.clone(),
            None => format!("HDMI Matrix {}", self.host),
        }
    }

    /// Reject configurations that can never connect
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.host.trim().is_empty() {
            return Err(DriverError::Config("host is empty".into()));
        }
        if self.port == 0 {
            return Err(DriverError::Config("port must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_record_has_no_capabilities() {
        let config: DeviceConfig = serde_json::from_str(r#"{"host": "10.0.0.9"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.capabilities(), None);
        assert_eq!(config.title(), "HDMI Matrix 10.0.0.9");
    }

    #[test]
    fn test_capabilities_round_trip_through_json() {
        let caps = CapabilitySet::new(Some("UHD-88".into()), 8, 8);
        let config = DeviceConfig::from_probe(&DeviceEndpoint::new("matrix.lan", 23), &caps);

        let json = serde_json::to_string(&config).unwrap();
        let restored: DeviceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.capabilities(), Some(caps));
        assert_eq!(restored.title(), "UHD-88");
        assert_eq!(restored.endpoint(), DeviceEndpoint::new("matrix.lan", 23));
    }

    #[test]
    fn test_stored_counts_are_clamped() {
        let mut config = DeviceConfig::new("matrix", 8000);
        config.inputs = Some(500);
        config.outputs = Some(0);
        assert_eq!(config.capabilities(), None);

        config.outputs = Some(4);
        let caps = config.capabilities().unwrap();
        assert_eq!(caps.inputs(), 32);
        assert_eq!(caps.outputs(), 4);
    }

    #[test]
    fn test_validate() {
        assert!(DeviceConfig::new("matrix", 8000).validate().is_ok());
        assert!(DeviceConfig::new(" ", 8000).validate().is_err());
        assert!(DeviceConfig::new("matrix", 0).validate().is_err());
    }
}
