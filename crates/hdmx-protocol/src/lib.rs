//! HDMI Matrix Protocol Library
//!
//! This crate provides command encoding and response parsing for HDMI
//! crosspoint matrix switches that speak a plaintext, `!`-terminated ASCII
//! protocol over TCP.
//!
//! # Wire format
//!
//! | Command | Meaning |
//! |---|---|
//! | `r type!` | query model identity |
//! | `r av out 0!` | query the full routing table |
//! | `s in N av out M!` | route input N to output M |
//! | `s power 1!` / `s power 0!` | power on / off |
//! | `r power!` | query power |
//!
//! Replies carry no framing at all. They are free-form text such as
//! `input 2 -> output 1` or `Power ON`, and their exact shape varies between
//! firmware revisions. The parsers in [`response`] therefore never fail:
//! unrecognized text degrades to an empty snapshot, an unknown power state, or
//! no model name.
//!
//! # Example
//!
//! ```rust
//! use hdmx_protocol::{parse_power, parse_routing, MatrixCommand, PowerState};
//!
//! assert_eq!(MatrixCommand::Route { input: 3, output: 2 }.encode(), b"s in 3 av out 2!");
//!
//! let snapshot = parse_routing("input 2 -> output 1\ninput 5 -> output 3\n");
//! assert_eq!(snapshot.input_for(1), Some(2));
//! assert_eq!(snapshot.input_for(3), Some(5));
//!
//! assert_eq!(parse_power("Power ON\r\n"), PowerState::On);
//! ```

pub mod command;
pub mod error;
pub mod models;
pub mod response;

pub use command::{CommandCodec, MatrixCommand};
pub use error::ParseError;
pub use models::{
    input_label, parse_input_label, CapabilitySet, DEFAULT_CHANNEL_COUNT, DEFAULT_PORT,
    MAX_CHANNELS, MIN_CHANNELS,
};
pub use response::{
    decode_reply, parse_model_name, parse_power, parse_routing, PowerState, RoutingSnapshot,
};
