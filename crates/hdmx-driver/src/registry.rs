//! Per-device context owned by the host
//!
//! The registry maps a host-chosen device id to everything that exists for
//! that device while it is set up: the driver, its capabilities and its
//! entities. Contexts are created by [`DeviceRegistry::setup`] and dropped by
//! [`DeviceRegistry::teardown`]; nothing is global.

use std::collections::HashMap;
use std::sync::Arc;

use hdmx_protocol::{CapabilitySet, PowerState, RoutingSnapshot};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::DeviceConfig;
use crate::driver::MatrixDriver;
use crate::entity::{build_entities, MatrixEntities};
use crate::error::DriverError;
use crate::transport::{DeviceEndpoint, TransportConfig};

/// Everything that exists for one set-up device
pub struct DeviceContext {
    /// Protocol driver
    pub driver: Arc<MatrixDriver>,
    /// Entities built from the capabilities
    pub entities: MatrixEntities,
    capabilities: CapabilitySet,
}

impl DeviceContext {
    /// Capabilities the entities were built from
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Configuration a host should persist for this device
    pub fn config(&self) -> DeviceConfig {
        DeviceConfig::from_probe(self.driver.endpoint(), &self.capabilities)
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Snapshot parsed from the routing reply
    pub routing: RoutingSnapshot,
    /// Power state parsed from the power reply
    pub power: PowerState,
}

impl RefreshReport {
    /// Returns true if neither query produced usable data
    pub fn is_empty(&self) -> bool {
        self.routing.is_empty() && !self.power.is_known()
    }
}

/// Reachability check followed by a best-effort probe
///
/// Fails only if the device cannot be connected to at all. A reachable device
/// that answers nothing useful still onboards with default capabilities.
pub async fn onboard(
    endpoint: DeviceEndpoint,
    transport_config: TransportConfig,
) -> Result<DeviceConfig, DriverError> {
    let driver = MatrixDriver::with_config(endpoint.clone(), transport_config);

    if !driver.check_reachable().await {
        warn!("Onboarding {} failed: cannot connect", endpoint);
        return Err(DriverError::CannotConnect { endpoint });
    }

    let capabilities = driver.probe().await;
    let config = DeviceConfig::from_probe(&endpoint, &capabilities);
    info!("Onboarded {} as {:?}", endpoint, config.title());
    Ok(config)
}

/// All devices a host has set up
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceContext>,
    transport_config: TransportConfig,
}

impl DeviceRegistry {
    /// Create an empty registry with default transport timing
    pub fn new() -> Self {
        Self::with_transport_config(TransportConfig::default())
    }

    /// Create an empty registry with custom transport timing
    pub fn with_transport_config(transport_config: TransportConfig) -> Self {
        Self {
            devices: HashMap::new(),
            transport_config,
        }
    }

    /// Set up a device from its stored configuration
    ///
    /// Stored capabilities are reused; a record without them is probed again.
    pub async fn setup(
        &mut self,
        id: impl Into<String>,
        config: &DeviceConfig,
    ) -> Result<&DeviceContext, DriverError> {
        let id = id.into();
        if self.devices.contains_key(&id) {
            return Err(DriverError::DeviceExists(id));
        }
        config.validate()?;

        let driver = Arc::new(MatrixDriver::with_config(
            config.endpoint(),
            self.transport_config.clone(),
        ));

        let capabilities = match config.capabilities() {
            Some(capabilities) => {
                driver.set_capabilities(capabilities.clone());
                capabilities
            }
            None => {
                info!("{} has no stored capabilities, probing", id);
                driver.probe().await
            }
        };

        let entities = build_entities(&driver)?;
        info!(
            "Set up {} ({}, {} outputs)",
            id,
            config.endpoint(),
            entities.selectors.len()
        );

        let context = DeviceContext {
            driver,
            entities,
            capabilities,
        };
        let context: &DeviceContext = self.devices.entry(id).or_insert(context);
        Ok(context)
    }

    /// Tear down a device. Returns false if it was not set up.
    pub fn teardown(&mut self, id: &str) -> bool {
        let removed = self.devices.remove(id).is_some();
        if removed {
            info!("Tore down {}", id);
        }
        removed
    }

    /// Context of a set-up device
    pub fn get(&self, id: &str) -> Option<&DeviceContext> {
        self.devices.get(id)
    }

    /// Ids of all set-up devices
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Number of set-up devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no devices are set up
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Run one reconciliation pass against a device
    pub async fn refresh(&self, id: &str) -> Result<RefreshReport, DriverError> {
        let context = self
            .get(id)
            .ok_or_else(|| DriverError::DeviceNotFound(id.to_string()))?;
        Ok(refresh_driver(&context.driver).await)
    }

    /// Reconcile every device, devices in parallel
    pub async fn refresh_all(&self) -> Vec<(String, RefreshReport)> {
        let mut tasks = JoinSet::new();
        for (id, context) in &self.devices {
            let id = id.clone();
            let driver = Arc::clone(&context.driver);
            tasks.spawn(async move { (id, refresh_driver(&driver).await) });
        }

        let mut reports = Vec::with_capacity(self.devices.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Refresh task failed: {}", e),
            }
        }
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        reports
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn refresh_driver(driver: &MatrixDriver) -> RefreshReport {
    let routing = driver.query_routing().await;
    let power = driver.query_power().await;
    RefreshReport { routing, power }
}
