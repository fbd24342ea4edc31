// SPDX-License-Identifier: MIT

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::ProxelError;
use crate::utils::Mutexed;

use super::port::{PortRef, PortStatus};

/// A proxel's named ports.
pub type PortMap = BTreeMap<String, PortRef>;

/// Coarse processing state reported by a proxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxelState {
    #[default]
    Undefined,
    Running,
    Paused,
    AwaitingInput,
    AwaitingRequest,
    AwaitingResponse,
    Warning,
    Crashed,
    NotConnected,
    Unavailable,
}

impl fmt::Display for ProxelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProxelState::Undefined => "UNDEFINED",
            ProxelState::Running => "RUNNING",
            ProxelState::Paused => "PAUSED",
            ProxelState::AwaitingInput => "NO INPUT",
            ProxelState::AwaitingRequest => "NO REQUEST",
            ProxelState::AwaitingResponse => "NO RESPONSE",
            ProxelState::Warning => "WARNING",
            ProxelState::Crashed => "CRASHED",
            ProxelState::NotConnected => "NOT CONNECTED",
            ProxelState::Unavailable => "UNAVAILABLE",
        };
        f.write_str(label)
    }
}

/// Live status of a proxel: its state, a free-form info line and the status
/// of every named port.
#[derive(Debug, Clone)]
pub struct ProxelStatus {
    pub state: ProxelState,
    pub info: String,
    pub ports: BTreeMap<String, PortStatus>,
}

/// Latest statuses of all proxels in a graph, keyed by proxel id.
pub type ProxelStatusMap = BTreeMap<String, ProxelStatus>;

/// A processing element: an isolated unit owning a set of named ports and a
/// start/stop lifecycle.
///
/// `start` runs the processing loop and is invoked on a dedicated worker by
/// the [`Graph`](crate::engine::Graph); it should return once `stop` has been
/// called. Typical implementations loop over their input ports and exit when
/// a port is deactivated. `stop` must be safe to call at any time and must
/// cause `start` to return in bounded time.
#[async_trait]
pub trait Proxel: Send + Sync + 'static {
    /// Run the processing loop until stopped. An `Err` marks the proxel as
    /// crashed and is handed to the graph's crash reporter.
    async fn start(&self) -> Result<(), ProxelError>;

    /// Make `start` return. [`ProxelCore::request_stop`] covers the common
    /// case of deactivating every port and tripping the stop token.
    fn stop(&self);

    /// The shared bookkeeping embedded by the implementation.
    fn core(&self) -> &ProxelCore;

    /// Look up a port by its unique name.
    fn port(&self, name: &str) -> Option<PortRef> {
        self.core().port(name)
    }

    fn ports(&self) -> &PortMap {
        self.core().ports()
    }

    fn status(&self) -> ProxelStatus {
        self.core().status()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Bookkeeping shared by all proxel implementations: the named port map, the
/// mutable state and info line, and a stop token.
///
/// Implementations register their ports at construction and update the state
/// and info line from their processing loop. Dropping the core severs every
/// remaining port connection.
pub struct ProxelCore {
    ports: PortMap,
    state: Mutexed<ProxelState>,
    info: Mutexed<String>,
    stop: CancellationToken,
}

impl ProxelCore {
    pub fn new(ports: PortMap) -> Self {
        Self {
            ports,
            state: Mutexed::new(ProxelState::Undefined),
            info: Mutexed::new(String::new()),
            stop: CancellationToken::new(),
        }
    }

    pub fn port(&self, name: &str) -> Option<PortRef> {
        self.ports.get(name).cloned()
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    pub fn state(&self) -> ProxelState {
        self.state.load()
    }

    pub fn set_state(&self, state: ProxelState) {
        self.state.store(state);
    }

    pub fn set_info(&self, info: impl Into<String>) {
        self.info.store(info.into());
    }

    pub fn status(&self) -> ProxelStatus {
        let ports = self
            .ports
            .iter()
            .map(|(name, port)| (name.clone(), port.status()))
            .collect();

        ProxelStatus {
            state: self.state.load(),
            info: self.info.load(),
            ports,
        }
    }

    /// Deactivate every port and trip the stop token, unblocking any reader
    /// the processing loop is suspended on.
    pub fn request_stop(&self) {
        self.stop.cancel();
        for port in self.ports.values() {
            port.deactivate();
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// A clone of the stop token, for `select!`-style processing loops.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

impl Drop for ProxelCore {
    fn drop(&mut self) {
        for port in self.ports.values() {
            port.disconnect_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BufferedConsumerPort, ProducerPort};
    use crate::traits::port_ref;
    use crate::traits::port::Port;

    fn core_with_ports() -> ProxelCore {
        let input = BufferedConsumerPort::<i32>::with_capacity(1).expect("capacity is valid");
        let output = ProducerPort::<i32>::new();

        let mut ports = PortMap::new();
        ports.insert("in".into(), port_ref(&input));
        ports.insert("out".into(), port_ref(&output));

        ProxelCore::new(ports)
    }

    #[test]
    fn ports_are_found_by_name() {
        let core = core_with_ports();

        assert!(core.port("in").is_some());
        assert!(core.port("out").is_some());
        assert!(core.port("sideways").is_none());
    }

    #[test]
    fn state_and_info_round_trip() {
        let core = core_with_ports();
        assert_eq!(core.state(), ProxelState::Undefined);

        core.set_state(ProxelState::Running);
        core.set_info("crunching");

        let status = core.status();
        assert_eq!(status.state, ProxelState::Running);
        assert_eq!(status.info, "crunching");
        assert_eq!(status.ports.len(), 2);
        assert_eq!(status.ports["out"].transactions, 0);
    }

    #[tokio::test]
    async fn request_stop_trips_the_token_and_deactivates_ports() {
        let input = BufferedConsumerPort::<i32>::with_capacity(1).expect("capacity is valid");
        let mut ports = PortMap::new();
        ports.insert("in".into(), port_ref(&input));
        let core = ProxelCore::new(ports);

        assert!(!core.stop_requested());
        core.request_stop();

        assert!(core.stop_requested());
        assert!(core.stop_token().is_cancelled());
        assert!(!input.is_active());
        assert_eq!(input.get_next().await, None);
    }

    #[tokio::test]
    async fn dropping_the_core_severs_port_connections() {
        let producer = ProducerPort::<i32>::new();
        let consumer = BufferedConsumerPort::<i32>::with_capacity(1).expect("capacity is valid");
        producer.connect(&port_ref(&consumer)).unwrap();

        let mut ports = PortMap::new();
        ports.insert("out".into(), port_ref(&producer));
        let core = ProxelCore::new(ports);

        drop(core);

        assert!(!producer.is_connected());
        assert!(!consumer.is_connected());
    }

    #[test]
    fn states_render_their_labels() {
        assert_eq!(ProxelState::Running.to_string(), "RUNNING");
        assert_eq!(ProxelState::AwaitingInput.to_string(), "NO INPUT");
        assert_eq!(ProxelState::Crashed.to_string(), "CRASHED");
        assert_eq!(ProxelState::default().to_string(), "UNDEFINED");
    }
}
