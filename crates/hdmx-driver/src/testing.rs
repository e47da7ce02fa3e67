//! In-memory transport for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::transport::{DeviceEndpoint, Transport};

/// Transport that answers from a table of canned replies
pub(crate) struct ScriptedTransport {
    endpoint: DeviceEndpoint,
    replies: Mutex<HashMap<String, String>>,
    reachable: AtomicBool,
    sent: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            endpoint: DeviceEndpoint::new("scripted", 8000),
            replies: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every exchange take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of exchanges that overlapped
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn unreachable() -> Self {
        let transport = Self::new();
        transport.set_reachable(false);
        transport
    }

    pub fn reply(self, command: &str, text: &str) -> Self {
        self.set_reply(command, text);
        self
    }

    pub fn set_reply(&self, command: &str, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), text.to_string());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    async fn send(&self, command: &[u8]) -> Option<Vec<u8>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return None;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let command = String::from_utf8_lossy(command).into_owned();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or_default();
        self.sent.lock().unwrap().push(command);
        Some(reply.into_bytes())
    }

    async fn check_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
