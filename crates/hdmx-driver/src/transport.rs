//! TCP transport
//!
//! One command per connection: connect, write, wait for the settle delay,
//! read whatever arrives, close. The protocol has no session and no reply
//! terminator, so nothing is reused between commands and the end of a reply
//! is detected by silence.
//!
//! Failures never escape this layer as errors. A command that could not be
//! delivered yields `None`; a delivered command whose reply never came yields
//! `Some` with an empty buffer.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use hdmx_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

/// TCP target of one matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl DeviceEndpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create an endpoint on the default control port
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Timing and size limits for one exchange
///
/// The worst-case latency of a single command is
/// `connect_timeout + settle_delay + read_timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Bound on establishing the TCP connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Pause between writing a command and reading its reply
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Bound on collecting the reply
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Maximum reply size kept
    pub max_response_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(100),
            read_timeout: Duration::from_secs(1),
            max_response_len: 4096,
        }
    }
}

impl TransportConfig {
    /// Worst-case duration of one exchange
    pub fn worst_case_latency(&self) -> Duration {
        self.connect_timeout + self.settle_delay + self.read_timeout
    }
}

/// Durations as human-readable text such as `"100ms"` or `"3s"`
///
/// Bare integers are read as milliseconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(Duration::from_millis(ms)),
            Repr::Text(text) => {
                humantime::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// A way of delivering one command to a device and collecting its reply
pub trait Transport: Send + Sync {
    /// Device this transport talks to
    fn endpoint(&self) -> &DeviceEndpoint;

    /// Deliver `command` and return the raw reply
    ///
    /// `None` means the command was not delivered. `Some(empty)` means it was
    /// delivered but nothing came back in time.
    fn send(&self, command: &[u8]) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Returns true if a connection can be established at all
    fn check_reachable(&self) -> impl Future<Output = bool> + Send;
}

/// Connection-per-command TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransport {
    endpoint: DeviceEndpoint,
    config: TransportConfig,
}

impl TcpTransport {
    /// Create a transport with default timing
    pub fn new(endpoint: DeviceEndpoint) -> Self {
        Self::with_config(endpoint, TransportConfig::default())
    }

    /// Create a transport with custom timing
    pub fn with_config(endpoint: DeviceEndpoint, config: TransportConfig) -> Self {
        Self { endpoint, config }
    }

    /// Timing in use
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn connect(&self) -> Option<TcpStream> {
        let target = (self.endpoint.host.as_str(), self.endpoint.port);
        match timeout(self.config.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                warn!("Failed to connect to {}: {}", self.endpoint, e);
                None
            }
            Err(_) => {
                warn!(
                    "Connect to {} timed out after {:?}",
                    self.endpoint, self.config.connect_timeout
                );
                None
            }
        }
    }
}

impl Transport for TcpTransport {
    fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    async fn send(&self, command: &[u8]) -> Option<Vec<u8>> {
        let mut stream = self.connect().await?;

        trace!(
            "-> {}: {:?}",
            self.endpoint,
            String::from_utf8_lossy(command)
        );
        if let Err(e) = stream.write_all(command).await {
            warn!("Failed to write to {}: {}", self.endpoint, e);
            return None;
        }
        if let Err(e) = stream.flush().await {
            warn!("Failed to flush to {}: {}", self.endpoint, e);
            return None;
        }

        tokio::time::sleep(self.config.settle_delay).await;

        let reply = read_reply(&mut stream, &self.config).await;
        trace!("<- {}: {:?}", self.endpoint, String::from_utf8_lossy(&reply));

        if let Err(e) = stream.shutdown().await {
            trace!("Shutdown of {} failed: {}", self.endpoint, e);
        }

        Some(reply)
    }

    async fn check_reachable(&self) -> bool {
        match self.connect().await {
            Some(mut stream) => {
                let _ = stream.shutdown().await;
                debug!("{} is reachable", self.endpoint);
                true
            }
            None => false,
        }
    }
}

/// Collect a reply with no terminator
///
/// Waits up to `read_timeout` for the first bytes. Once something has
/// arrived, further chunks are accepted as long as each follows the previous
/// one within `settle_delay`; the overall deadline still applies.
pub(crate) async fn read_reply<R>(stream: &mut R, config: &TransportConfig) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + config.read_timeout;
    let mut reply = Vec::new();
    let mut buf = [0u8; 1024];

    while reply.len() < config.max_response_len {
        let wait_until = if reply.is_empty() {
            deadline
        } else {
            deadline.min(Instant::now() + config.settle_delay)
        };
        let room = (config.max_response_len - reply.len()).min(buf.len());

        match timeout_at(wait_until, stream.read(&mut buf[..room])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => reply.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => {
                debug!("Read error: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    reply
}
