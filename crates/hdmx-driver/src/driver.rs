//! Matrix command driver
//!
//! [`MatrixDriver`] is the public façade over one device. Every operation is
//! one connection-per-command exchange. Exchanges on the same driver are
//! serialized: the protocol has no correlation IDs, so two overlapping replies
//! could not be told apart. Drivers for different devices share nothing and
//! may run fully in parallel.
//!
//! Queries never fail. A device that is offline, slow or printing something
//! unexpected yields an empty snapshot or [`PowerState::Unknown`], and the
//! cached state is left as it was.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hdmx_protocol::{
    decode_reply, parse_power, parse_routing, CapabilitySet, MatrixCommand, PowerState,
    RoutingSnapshot,
};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use crate::probe::{CapabilityProber, ProbeResult};
use crate::state::{DriverPhase, StateCache};
use crate::transport::{DeviceEndpoint, TcpTransport, Transport, TransportConfig};

/// Protocol driver for one matrix
pub struct MatrixDriver<T = TcpTransport> {
    transport: T,
    /// Held for the whole of each exchange
    exchange: AsyncMutex<()>,
    /// Never held across an await
    cache: Mutex<StateCache>,
    events: broadcast::Sender<DriverEvent>,
}

impl MatrixDriver<TcpTransport> {
    /// Create a driver for `host:port` with default timing
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_transport(TcpTransport::new(DeviceEndpoint::new(host, port)))
    }

    /// Create a driver with custom timing
    pub fn with_config(endpoint: DeviceEndpoint, config: TransportConfig) -> Self {
        Self::with_transport(TcpTransport::with_config(endpoint, config))
    }
}

impl<T: Transport> MatrixDriver<T> {
    /// Create a driver over any transport
    pub fn with_transport(transport: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            exchange: AsyncMutex::new(()),
            cache: Mutex::new(StateCache::new()),
            events,
        }
    }

    /// Device this driver talks to
    pub fn endpoint(&self) -> &DeviceEndpoint {
        self.transport.endpoint()
    }

    /// Subscribe to state-change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    /// Install capabilities known from a previous probe
    pub fn set_capabilities(&self, capabilities: CapabilitySet) {
        self.cache().set_capabilities(capabilities);
    }

    /// Capabilities in use, if known
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.cache().capabilities().cloned()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> DriverPhase {
        self.cache().phase()
    }

    /// Advance to `Operational` once entities exist
    pub fn mark_operational(&self) {
        if self.cache().mark_operational() {
            debug!("{} is operational", self.endpoint());
        }
    }

    /// Input last seen on `output`
    pub fn cached_input(&self, output: u32) -> Option<u32> {
        self.cache().input_for(output)
    }

    /// All last known routes
    pub fn cached_routes(&self) -> RoutingSnapshot {
        self.cache().routes().clone()
    }

    /// Last known power state
    pub fn cached_power(&self) -> PowerState {
        self.cache().power()
    }

    /// When a query last returned usable data
    pub fn last_refresh(&self) -> Option<Instant> {
        self.cache().last_refresh()
    }

    /// Returns true if a TCP connection to the device can be established
    ///
    /// This is the only check whose failure should stop onboarding.
    pub async fn check_reachable(&self) -> bool {
        let _exchange = self.exchange.lock().await;
        self.transport.check_reachable().await
    }

    /// Discover model name and input/output counts
    ///
    /// Never fails; unanswered steps fall back to defaults. The routing table
    /// seen while probing seeds the cache.
    pub async fn probe(&self) -> CapabilitySet {
        let _exchange = self.exchange.lock().await;
        let ProbeResult {
            capabilities,
            snapshot,
            responded,
        } = CapabilityProber::new().probe(&self.transport).await;

        if !responded {
            warn!(
                "{} did not answer the probe, using defaults",
                self.endpoint()
            );
        }

        let changed = {
            let mut cache = self.cache();
            cache.set_capabilities(capabilities.clone());
            cache.merge_snapshot(&snapshot)
        };

        self.emit(DriverEvent::Probed {
            capabilities: capabilities.clone(),
        });
        self.emit_routes(changed);
        capabilities
    }

    /// Route `input` to `output`
    ///
    /// Fire-and-forget: once the command is delivered the cache is updated
    /// without reading back the device state. If it cannot be delivered the
    /// cache is left untouched.
    pub async fn route(&self, input: u32, output: u32) -> Result<(), DriverError> {
        self.validate_route(input, output)?;

        let _exchange = self.exchange.lock().await;
        self.deliver(MatrixCommand::Route { input, output }).await?;
        info!("{}: input {} -> output {}", self.endpoint(), input, output);

        if self.cache().apply_route(output, input) {
            self.emit(DriverEvent::RouteChanged { output, input });
        }
        Ok(())
    }

    /// Query the full routing table and reconcile the cache
    ///
    /// Returns the snapshot parsed from this reply. Outputs missing from it
    /// keep their cached value.
    pub async fn query_routing(&self) -> RoutingSnapshot {
        let _exchange = self.exchange.lock().await;
        let Some(text) = self.exchange_text(MatrixCommand::QueryRouting).await else {
            return RoutingSnapshot::new();
        };

        let snapshot = parse_routing(&text);
        if snapshot.is_empty() {
            debug!("{}: no routes in reply", self.endpoint());
            return snapshot;
        }

        let changed = self.cache().merge_snapshot(&snapshot);
        self.emit_routes(changed);
        snapshot
    }

    /// Turn the matrix on
    pub async fn power_on(&self) -> Result<(), DriverError> {
        self.set_power(true).await
    }

    /// Turn the matrix off
    pub async fn power_off(&self) -> Result<(), DriverError> {
        self.set_power(false).await
    }

    /// Query power and reconcile the cache
    ///
    /// An unknown reply is returned as-is but never overwrites a known
    /// cached state.
    pub async fn query_power(&self) -> PowerState {
        let _exchange = self.exchange.lock().await;
        let Some(text) = self.exchange_text(MatrixCommand::QueryPower).await else {
            return PowerState::Unknown;
        };

        let state = parse_power(&text);
        if self.cache().merge_power(state) {
            self.emit(DriverEvent::PowerChanged { state });
        }
        state
    }

    async fn set_power(&self, on: bool) -> Result<(), DriverError> {
        let _exchange = self.exchange.lock().await;
        self.deliver(MatrixCommand::SetPower { on }).await?;

        let state = PowerState::from(on);
        info!("{}: power {}", self.endpoint(), state.name());
        if self.cache().set_power(state) {
            self.emit(DriverEvent::PowerChanged { state });
        }
        Ok(())
    }

    /// Ports are 1-based. Upper bounds are left to the device, since probed
    /// counts can understate it.
    fn validate_route(&self, input: u32, output: u32) -> Result<(), DriverError> {
        if input == 0 || output == 0 {
            return Err(DriverError::InvalidRoute { input, output });
        }
        Ok(())
    }

    /// Deliver a set command. The caller holds the exchange lock.
    async fn deliver(&self, command: MatrixCommand) -> Result<(), DriverError> {
        match self.transport.send(&command.encode()).await {
            Some(_) => Ok(()),
            None => {
                warn!("{}: {:?} not delivered", self.endpoint(), command);
                Err(DriverError::Unreachable {
                    endpoint: self.endpoint().clone(),
                })
            }
        }
    }

    /// Send a query and decode its reply. The caller holds the exchange lock.
    async fn exchange_text(&self, command: MatrixCommand) -> Option<String> {
        match self.transport.send(&command.encode()).await {
            Some(bytes) => Some(decode_reply(&bytes)),
            None => {
                debug!("{}: {:?} got no answer", self.endpoint(), command);
                None
            }
        }
    }

    fn cache(&self) -> MutexGuard<'_, StateCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DriverEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_routes(&self, changed: Vec<(u32, u32)>) {
        for (output, input) in changed {
            self.emit(DriverEvent::RouteChanged { output, input });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn driver(transport: ScriptedTransport) -> MatrixDriver<ScriptedTransport> {
        MatrixDriver::with_transport(transport)
    }

    #[tokio::test]
    async fn test_query_routing_merges_and_keeps_missing() {
        let transport =
            ScriptedTransport::new().reply("r av out 0!", "input 2 -> output 1\ninput 5 -> output 3\n");
        let driver = driver(transport);

        let snapshot = driver.query_routing().await;
        assert_eq!(snapshot.iter().collect::<Vec<_>>(), vec![(1, 2), (3, 5)]);

        driver
            .transport
            .set_reply("r av out 0!", "input 4 -> output 3\n");
        driver.query_routing().await;
        assert_eq!(driver.cached_input(1), Some(2));
        assert_eq!(driver.cached_input(3), Some(4));
    }

    #[tokio::test]
    async fn test_query_routing_is_idempotent() {
        let transport = ScriptedTransport::new().reply("r av out 0!", "input 1 -> output 2\n");
        let driver = driver(transport);

        let first = driver.query_routing().await;
        let second = driver.query_routing().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_last_refresh_tracks_usable_replies() {
        let driver = driver(ScriptedTransport::new());
        driver.query_routing().await;
        assert_eq!(driver.last_refresh(), None);

        driver
            .transport
            .set_reply("r av out 0!", "input 1 -> output 2
");
        driver.query_routing().await;
        assert!(driver.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_route_updates_cache_and_sends_wire_command() {
        let driver = driver(ScriptedTransport::new());
        let mut events = driver.subscribe();

        driver.route(3, 2).await.unwrap();
        assert_eq!(driver.cached_input(2), Some(3));
        assert_eq!(driver.transport.sent(), vec!["s in 3 av out 2!"]);
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::RouteChanged { output: 2, input: 3 }
        );
    }

    #[tokio::test]
    async fn test_route_while_unreachable_leaves_cache() {
        let transport = ScriptedTransport::new().reply("r av out 0!", "input 1 -> output 2\n");
        let driver = driver(transport);
        driver.query_routing().await;

        driver.transport.set_reachable(false);
        let result = driver.route(3, 2).await;
        assert!(matches!(result, Err(DriverError::Unreachable { .. })));
        assert_eq!(driver.cached_input(2), Some(1));
    }

    #[tokio::test]
    async fn test_route_validation() {
        let driver = driver(ScriptedTransport::new());
        assert!(matches!(
            driver.route(0, 1).await,
            Err(DriverError::InvalidRoute { .. })
        ));

        assert!(matches!(
            driver.route(1, 0).await,
            Err(DriverError::InvalidRoute { input: 1, output: 0 })
        ));
        assert!(driver.transport.sent().is_empty());

        driver.set_capabilities(CapabilitySet::new(None, 4, 2));
        driver.route(4, 2).await.unwrap();
        driver.route(6, 1).await.unwrap();
        assert_eq!(driver.cached_input(1), Some(6));
        assert_eq!(driver.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_power_commands_are_optimistic() {
        let driver = driver(ScriptedTransport::new());
        assert_eq!(driver.cached_power(), PowerState::Unknown);

        driver.power_on().await.unwrap();
        assert_eq!(driver.cached_power(), PowerState::On);

        driver.power_off().await.unwrap();
        assert_eq!(driver.cached_power(), PowerState::Off);
        assert_eq!(driver.transport.sent(), vec!["s power 1!", "s power 0!"]);
    }

    #[tokio::test]
    async fn test_power_command_while_unreachable() {
        let driver = driver(ScriptedTransport::unreachable());
        assert!(driver.power_on().await.is_err());
        assert_eq!(driver.cached_power(), PowerState::Unknown);
    }

    #[tokio::test]
    async fn test_query_power_ignores_unknown() {
        let transport = ScriptedTransport::new().reply("r power!", "Power ON\r\n");
        let driver = driver(transport);
        assert_eq!(driver.query_power().await, PowerState::On);

        driver.transport.set_reply("r power!", "garbled");
        assert_eq!(driver.query_power().await, PowerState::Unknown);
        assert_eq!(driver.cached_power(), PowerState::On);

        driver.transport.set_reachable(false);
        assert_eq!(driver.query_power().await, PowerState::Unknown);
        assert_eq!(driver.cached_power(), PowerState::On);
    }

    #[tokio::test]
    async fn test_probe_installs_capabilities_and_seeds_cache() {
        let transport = ScriptedTransport::new()
            .reply("r type!", "UHD-44\r\n")
            .reply("r av out 0!", "input 3 -> output 1\ninput 4 -> output 4\n");
        let driver = driver(transport);
        let mut events = driver.subscribe();
        assert_eq!(driver.phase(), DriverPhase::Uninitialized);

        let caps = driver.probe().await;
        assert_eq!(caps.dimensions(), "4x4");
        assert_eq!(driver.phase(), DriverPhase::Probed);
        assert_eq!(driver.capabilities(), Some(caps.clone()));
        assert_eq!(driver.cached_input(1), Some(3));

        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::Probed { capabilities: caps }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::RouteChanged { output: 1, input: 3 }
        );
    }

    #[tokio::test]
    async fn test_concurrent_operations_are_serialized() {
        use std::sync::Arc;
        use std::time::Duration;

        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_millis(10))
            .reply("r av out 0!", "input 1 -> output 1\n")
            .reply("r power!", "power on\n");
        let driver = Arc::new(driver(transport));
        driver.set_capabilities(CapabilitySet::new(None, 4, 4));

        let mut tasks = tokio::task::JoinSet::new();
        for output in 1..=4 {
            let driver = Arc::clone(&driver);
            tasks.spawn(async move {
                driver.query_routing().await;
                driver.route(output, output).await.unwrap();
                driver.query_power().await;
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert_eq!(driver.transport.sent().len(), 12);
        assert_eq!(driver.transport.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_state_emits_nothing() {
        let transport = ScriptedTransport::new()
            .reply("r av out 0!", "input 1 -> output 1\n")
            .reply("r power!", "power on\n");
        let driver = driver(transport);
        driver.query_routing().await;
        driver.query_power().await;

        let mut events = driver.subscribe();
        driver.query_routing().await;
        driver.query_power().await;
        assert!(events.try_recv().is_err());
    }
}
