//! HDMI Matrix Simulation Library
//!
//! This crate provides a simulation layer for exercising matrix drivers
//! without physical hardware. It includes:
//!
//! - **VirtualMatrix**: An in-memory crosspoint matrix that answers the wire
//!   protocol with device-like reply text
//! - **VirtualMatrixServer**: A loopback TCP server exposing a `VirtualMatrix`
//!
//! # Example
//!
//! ```rust
//! use hdmx_sim::VirtualMatrix;
//! use hdmx_protocol::MatrixCommand;
//!
//! let mut matrix = VirtualMatrix::new("UHD-44", 4, 4);
//! matrix.handle(&MatrixCommand::Route { input: 3, output: 2 });
//!
//! let reply = matrix.handle(&MatrixCommand::QueryRouting);
//! assert!(reply.contains("input 3 -> output 2"));
//! ```

pub mod matrix;
pub mod server;

pub use matrix::{VirtualMatrix, VirtualMatrixConfig};
pub use server::VirtualMatrixServer;
