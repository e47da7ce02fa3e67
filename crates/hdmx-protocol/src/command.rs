//! Wire commands sent to the matrix
//!
//! Every command is a short lowercase ASCII phrase terminated by `!`. There is
//! no other framing, no sequence number and no checksum.

use tracing::debug;

use crate::error::ParseError;

/// Command terminator
pub const TERMINATOR: u8 = b'!';

/// Maximum command length (reasonable limit to prevent unbounded buffering)
const MAX_COMMAND_LEN: usize = 64;

/// A single matrix command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MatrixCommand {
    /// Query model identity: `r type!`
    QueryModel,
    /// Query the full routing table: `r av out 0!`
    QueryRouting,
    /// Query the route of a single output: `r av out N!`
    QueryOutput { output: u32 },
    /// Route an input to an output: `s in N av out M!`
    Route { input: u32, output: u32 },
    /// Power on/off: `s power 1!` or `s power 0!`
    SetPower { on: bool },
    /// Query power: `r power!`
    QueryPower,
}

impl MatrixCommand {
    /// Encode this command to its wire format
    pub fn encode(&self) -> Vec<u8> {
        let text = match self {
            Self::QueryModel => "r type!".to_string(),
            Self::QueryRouting => "r av out 0!".to_string(),
            Self::QueryOutput { output } => format!("r av out {}!", output),
            Self::Route { input, output } => format!("s in {} av out {}!", input, output),
            Self::SetPower { on } => format!("s power {}!", u8::from(*on)),
            Self::QueryPower => "r power!".to_string(),
        };
        text.into_bytes()
    }

    /// Parse a single command
    ///
    /// The trailing `!` is optional. Matching is case-insensitive and any run
    /// of whitespace separates tokens.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        if text.len() > MAX_COMMAND_LEN {
            return Err(ParseError::TooLong { len: text.len() });
        }
        let text = text.strip_suffix('!').unwrap_or(text).to_ascii_lowercase();
        let tokens: Vec<&str> = text.split_whitespace().collect();

        match tokens.as_slice() {
            [] => Err(ParseError::Empty),
            ["r", "type"] => Ok(Self::QueryModel),
            ["r", "power"] => Ok(Self::QueryPower),
            ["r", "av", "out", n] => match parse_number(n)? {
                0 => Ok(Self::QueryRouting),
                output => Ok(Self::QueryOutput { output }),
            },
            ["s", "in", n, "av", "out", m] => Ok(Self::Route {
                input: parse_number(n)?,
                output: parse_number(m)?,
            }),
            ["s", "power", "1"] => Ok(Self::SetPower { on: true }),
            ["s", "power", "0"] => Ok(Self::SetPower { on: false }),
            _ => Err(ParseError::UnknownCommand(text.clone())),
        }
    }
}

fn parse_number(token: &str) -> Result<u32, ParseError> {
    token
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidNumber(token.to_string()))
}

/// Streaming splitter for `!`-terminated commands
///
/// Used on the device side of a connection, where commands may arrive split
/// across reads or several to a segment.
pub struct CommandCodec {
    buffer: Vec<u8>,
}

impl CommandCodec {
    /// Create a new command codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_COMMAND_LEN),
        }
    }

    /// Push raw bytes into the codec's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete command, skipping any that fail to parse
    pub fn next_command(&mut self) -> Option<MatrixCommand> {
        self.next_command_with_bytes().map(|(cmd, _)| cmd)
    }

    /// Extract the next complete command along with its raw bytes
    pub fn next_command_with_bytes(&mut self) -> Option<(MatrixCommand, Vec<u8>)> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == TERMINATOR) else {
                if self.buffer.len() > MAX_COMMAND_LEN {
                    let err = ParseError::TooLong {
                        len: self.buffer.len(),
                    };
                    debug!("Discarding unterminated input: {}", err);
                    self.buffer.clear();
                }
                return None;
            };

            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw);
            match MatrixCommand::parse(&text) {
                Ok(cmd) => return Some((cmd, raw)),
                Err(e) => debug!("Skipping unparseable command {:?}: {}", text.trim(), e),
            }
        }
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_wire_table() {
        assert_eq!(MatrixCommand::QueryModel.encode(), b"r type!");
        assert_eq!(MatrixCommand::QueryRouting.encode(), b"r av out 0!");
        assert_eq!(
            MatrixCommand::Route { input: 3, output: 2 }.encode(),
            b"s in 3 av out 2!"
        );
        assert_eq!(MatrixCommand::SetPower { on: true }.encode(), b"s power 1!");
        assert_eq!(MatrixCommand::SetPower { on: false }.encode(), b"s power 0!");
        assert_eq!(MatrixCommand::QueryPower.encode(), b"r power!");
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_spacing() {
        assert_eq!(
            MatrixCommand::parse("S IN 4  av OUT 1!"),
            Ok(MatrixCommand::Route { input: 4, output: 1 })
        );
        assert_eq!(MatrixCommand::parse("r power"), Ok(MatrixCommand::QueryPower));
        assert_eq!(
            MatrixCommand::parse("\r\nr av out 0!"),
            Ok(MatrixCommand::QueryRouting)
        );
        assert_eq!(
            MatrixCommand::parse("r av out 3!"),
            Ok(MatrixCommand::QueryOutput { output: 3 })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(MatrixCommand::parse("!"), Err(ParseError::Empty));
        assert!(matches!(
            MatrixCommand::parse("s power 2!"),
            Err(ParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            MatrixCommand::parse("s in x av out 1!"),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_parse_rejects_oversized_command() {
        let text = format!("s in 1 av out 2{}!", "0".repeat(60));
        assert_eq!(
            MatrixCommand::parse(&text),
            Err(ParseError::TooLong { len: text.len() })
        );
    }

    #[test]
    fn test_codec_skips_oversized_terminated_command() {
        let mut codec = CommandCodec::new();
        let mut bytes = b"s in 1 av out ".to_vec();
        bytes.extend_from_slice(&[b'0'; 60]);
        bytes.extend_from_slice(b"2!r power!");
        codec.push_bytes(&bytes);
        assert_eq!(codec.next_command(), Some(MatrixCommand::QueryPower));
    }

    #[test]
    fn test_codec_handles_split_and_batched_commands() {
        let mut codec = CommandCodec::new();
        codec.push_bytes(b"r ty");
        assert_eq!(codec.next_command(), None);

        codec.push_bytes(b"pe!r power!s in 1 av");
        assert_eq!(codec.next_command(), Some(MatrixCommand::QueryModel));
        assert_eq!(codec.next_command(), Some(MatrixCommand::QueryPower));
        assert_eq!(codec.next_command(), None);

        codec.push_bytes(b" out 2!");
        let (cmd, raw) = codec.next_command_with_bytes().unwrap();
        assert_eq!(cmd, MatrixCommand::Route { input: 1, output: 2 });
        assert_eq!(raw, b"s in 1 av out 2!");
    }

    #[test]
    fn test_codec_skips_invalid_commands() {
        let mut codec = CommandCodec::new();
        codec.push_bytes(b"hello!r power!");
        assert_eq!(codec.next_command(), Some(MatrixCommand::QueryPower));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_codec_discards_runaway_input() {
        let mut codec = CommandCodec::new();
        codec.push_bytes(&[b'x'; 100]);
        assert_eq!(codec.next_command(), None);
        assert_eq!(codec.buffered(), 0);
    }
}
