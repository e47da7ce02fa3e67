//! Host-facing entities
//!
//! A matrix is presented to a host as one input selector per output plus a
//! single power switch. All of them are built by [`build_entities`] from the
//! driver's capability set, so a 4x2 matrix gets two selectors with four
//! options each and a 16x16 matrix gets sixteen with sixteen.
//!
//! Entities hold no state of their own; they read through to the driver's
//! cache and issue commands through the driver, which serializes them.

use std::sync::Arc;

use hdmx_protocol::{input_label, parse_input_label, CapabilitySet, PowerState};

use crate::driver::MatrixDriver;
use crate::error::DriverError;
use crate::transport::{TcpTransport, Transport};

/// Input selector for one output
pub struct OutputSelector<T = TcpTransport> {
    driver: Arc<MatrixDriver<T>>,
    output: u32,
    options: Vec<String>,
    name: String,
}

impl<T: Transport> OutputSelector<T> {
    /// Create a selector for `output` offering the inputs in `capabilities`
    pub fn new(driver: Arc<MatrixDriver<T>>, output: u32, capabilities: &CapabilitySet) -> Self {
        Self {
            driver,
            output,
            options: capabilities.input_options(),
            name: format!("Output {} Input", output),
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output this selector controls
    pub fn output(&self) -> u32 {
        self.output
    }

    /// Selectable options: `Input 1` .. `Input N`
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Input last seen on this output
    pub fn current_input(&self) -> Option<u32> {
        self.driver.cached_input(self.output)
    }

    /// Option label of the input last seen on this output
    pub fn current_option(&self) -> Option<String> {
        self.current_input().map(input_label)
    }

    /// Route the input named by `option` to this output
    ///
    /// Only labels from [`options`](Self::options) are accepted.
    pub async fn select_option(&self, option: &str) -> Result<(), DriverError> {
        let input = parse_input_label(option)
            .filter(|&input| self.options.contains(&input_label(input)))
            .ok_or_else(|| DriverError::InvalidOption(option.to_string()))?;
        self.driver.route(input, self.output).await
    }

    /// Refresh from the device and return the input now on this output
    pub async fn update(&self) -> Option<u32> {
        self.driver.query_routing().await;
        self.current_input()
    }
}

/// Power switch for the whole matrix
pub struct PowerSwitch<T = TcpTransport> {
    driver: Arc<MatrixDriver<T>>,
}

impl<T: Transport> PowerSwitch<T> {
    /// Create a power switch
    pub fn new(driver: Arc<MatrixDriver<T>>) -> Self {
        Self { driver }
    }

    /// Display name
    pub fn name(&self) -> &str {
        "Power"
    }

    /// Last known power state
    pub fn state(&self) -> PowerState {
        self.driver.cached_power()
    }

    /// `None` until the power state has been observed
    pub fn is_on(&self) -> Option<bool> {
        self.state().is_on()
    }

    /// Turn the matrix on
    pub async fn turn_on(&self) -> Result<(), DriverError> {
        self.driver.power_on().await
    }

    /// Turn the matrix off
    pub async fn turn_off(&self) -> Result<(), DriverError> {
        self.driver.power_off().await
    }

    /// Refresh from the device and return the last known state
    pub async fn update(&self) -> PowerState {
        self.driver.query_power().await;
        self.state()
    }
}

/// Every entity of one matrix
pub struct MatrixEntities<T = TcpTransport> {
    /// One selector per output, in output order
    pub selectors: Vec<OutputSelector<T>>,
    /// The power switch
    pub power: PowerSwitch<T>,
}

impl<T: Transport> MatrixEntities<T> {
    /// Selector for `output`, if the matrix has that output
    pub fn selector(&self, output: u32) -> Option<&OutputSelector<T>> {
        self.selectors.iter().find(|s| s.output() == output)
    }
}

/// Build the entities for a driver whose capabilities are known
///
/// Moves the driver to `Operational`.
pub fn build_entities<T: Transport>(
    driver: &Arc<MatrixDriver<T>>,
) -> Result<MatrixEntities<T>, DriverError> {
    let capabilities = driver.capabilities().ok_or(DriverError::NotProbed)?;

    let selectors = (1..=capabilities.outputs())
        .map(|output| OutputSelector::new(Arc::clone(driver), output, &capabilities))
        .collect();
    let power = PowerSwitch::new(Arc::clone(driver));

    driver.mark_operational();
    Ok(MatrixEntities { selectors, power })
}
