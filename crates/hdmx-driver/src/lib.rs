//! HDMI Matrix Driver
//!
//! This crate provides the control-plane driver for HDMI crosspoint matrix
//! switches: connection handling, capability probing, routing and power
//! commands, and reconciliation of a local state cache against the device.
//!
//! # Architecture
//!
//! - **Transport**: opens a fresh TCP connection per command, writes it,
//!   waits a settle delay and reads whatever arrives within a timeout
//! - **Prober**: derives model name and input/output counts on first contact
//! - **Driver**: the public operations, serialized per device, updating the
//!   advisory [`StateCache`] and broadcasting [`DriverEvent`]s on change
//! - **Entities**: one input selector per output plus a power switch, built
//!   from the capability set
//! - **Registry**: the host's per-device context, created on setup and
//!   dropped on teardown
//!
//! The device is always the source of truth. Transport and parse failures
//! never surface as errors from queries; they produce "no new information"
//! and the cache stays as it was.
//!
//! # Example
//!
//! ```rust,no_run
//! use hdmx_driver::MatrixDriver;
//!
//! # async fn run() -> Result<(), hdmx_driver::DriverError> {
//! let driver = MatrixDriver::new("192.168.1.50", 8000);
//!
//! let caps = driver.probe().await;
//! println!("{} inputs, {} outputs", caps.inputs(), caps.outputs());
//!
//! driver.route(3, 2).await?;
//! let snapshot = driver.query_routing().await;
//! println!("output 2 shows {:?}", snapshot.input_for(2));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod events;
pub mod probe;
pub mod registry;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::DeviceConfig;
pub use driver::MatrixDriver;
pub use entity::{build_entities, MatrixEntities, OutputSelector, PowerSwitch};
pub use error::DriverError;
pub use events::DriverEvent;
pub use probe::{CapabilityProber, ProbeResult};
pub use registry::{onboard, DeviceContext, DeviceRegistry, RefreshReport};
pub use state::{DriverPhase, StateCache};
pub use transport::{DeviceEndpoint, TcpTransport, Transport, TransportConfig};

// Re-export the protocol types that appear in this crate's API
pub use hdmx_protocol::{CapabilitySet, PowerState, RoutingSnapshot};
