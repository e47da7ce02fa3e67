//! Error types for matrix command parsing
//!
//! Only the command direction (host → device) can fail to parse. Device
//! replies are parsed leniently and never produce an error.

use thiserror::Error;

/// Errors that can occur while parsing a wire command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Command text was empty after trimming the terminator
    #[error("empty command")]
    Empty,

    /// Unknown or unsupported command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A numeric argument was missing or not a valid number
    #[error("invalid number in command: {0}")]
    InvalidNumber(String),

    /// Command exceeded the maximum length without a terminator
    #[error("command too long: {len} bytes")]
    TooLong { len: usize },
}
