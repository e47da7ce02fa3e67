//! Error types for the matrix driver

use thiserror::Error;

use crate::transport::DeviceEndpoint;

/// Errors that can occur in the driver
///
/// Queries never produce these; a silent or offline device yields empty
/// results instead. Only commands that must be delivered, onboarding and
/// registry bookkeeping can fail.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Onboarding reachability check failed
    #[error("cannot connect to {endpoint}")]
    CannotConnect {
        /// Device that could not be reached
        endpoint: DeviceEndpoint,
    },

    /// A set command could not be delivered
    #[error("device {endpoint} is unreachable")]
    Unreachable {
        /// Device that could not be reached
        endpoint: DeviceEndpoint,
    },

    /// Input or output port 0
    #[error("invalid route: input {input} -> output {output}")]
    InvalidRoute {
        /// Requested input
        input: u32,
        /// Requested output
        output: u32,
    },

    /// Selector option that does not name an input
    #[error("invalid option: {0:?}")]
    InvalidOption(String),

    /// Entities requested before capabilities are known
    #[error("device capabilities not yet probed")]
    NotProbed,

    /// Device not found in the registry
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Device already set up in the registry
    #[error("device already exists: {0}")]
    DeviceExists(String),

    /// Invalid persisted configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
