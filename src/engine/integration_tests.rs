// SPDX-License-Identifier: MIT

//! Whole-graph scenarios: building from factories, running workers, crash
//! isolation and request fan-out across proxels.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::config::JsonProperties;
use crate::engine::{build_graph, ConnectionSpec, FactoryMap, Graph, GraphPlan, ProxelConfig};
use crate::errors::{GraphError, ProxelError};
use crate::ports::{BufferedConsumerPort, MultiRequesterPort, ProducerPort, ResponderPort};
use crate::traits::{
    port_ref, Port, PortMap, PropertyList, Proxel, ProxelCore, ProxelState, ProxelStatus,
};
use crate::utils::Mutexed;

/// Sends its seed once, then stores everything arriving on its input until
/// stopped.
struct RelayProxel {
    core: ProxelCore,
    output: Arc<ProducerPort<i32>>,
    input: Arc<BufferedConsumerPort<i32>>,
    seed: i32,
    stored: Mutexed<i32>,
}

impl std::fmt::Debug for RelayProxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayProxel").field("seed", &self.seed).finish()
    }
}

impl RelayProxel {
    fn new(seed: i32) -> Arc<Self> {
        let output = ProducerPort::<i32>::new();
        let input = BufferedConsumerPort::<i32>::with_capacity(4).expect("capacity is valid");

        let mut ports = PortMap::new();
        ports.insert("outport".into(), port_ref(&output));
        ports.insert("inport".into(), port_ref(&input));

        Arc::new(Self {
            core: ProxelCore::new(ports),
            output,
            input,
            seed,
            stored: Mutexed::new(0),
        })
    }

    fn stored(&self) -> i32 {
        self.stored.load()
    }
}

#[async_trait]
impl Proxel for RelayProxel {
    async fn start(&self) -> Result<(), ProxelError> {
        self.core.set_state(ProxelState::Running);
        self.output.send(self.seed).await;

        while let Some(value) = self.input.get_next().await {
            self.stored.store(value);
        }

        self.core.set_state(ProxelState::Paused);
        Ok(())
    }

    fn stop(&self) {
        self.core.request_stop();
    }

    fn core(&self) -> &ProxelCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Fails immediately with a fixed message.
struct MaydayProxel {
    core: ProxelCore,
    message: String,
}

impl MaydayProxel {
    fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            core: ProxelCore::new(PortMap::new()),
            message: message.into(),
        })
    }
}

#[async_trait]
impl Proxel for MaydayProxel {
    async fn start(&self) -> Result<(), ProxelError> {
        Err(ProxelError::new(self.message.clone()))
    }

    fn stop(&self) {
        self.core.request_stop();
    }

    fn core(&self) -> &ProxelCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Runs until stopped, recording that its lifecycle completed.
struct SteadyProxel {
    core: ProxelCore,
    stopped: AtomicBool,
}

impl std::fmt::Debug for SteadyProxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteadyProxel").finish()
    }
}

impl SteadyProxel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            core: ProxelCore::new(PortMap::new()),
            stopped: AtomicBool::new(false),
        })
    }

    fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Proxel for SteadyProxel {
    async fn start(&self) -> Result<(), ProxelError> {
        self.core.set_state(ProxelState::Running);
        self.core.stop_token().cancelled().await;
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.core.request_stop();
    }

    fn core(&self) -> &ProxelCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn relay_factories() -> FactoryMap<JsonProperties> {
    let mut factories = FactoryMap::new();
    factories.insert("RelayProxel", |props: &JsonProperties| {
        let seed = props
            .get_or("seed", 0)
            .map_err(|err| ProxelError::new(err.to_string()))?;
        Ok(RelayProxel::new(seed) as Arc<dyn Proxel>)
    });
    factories
}

fn relay_config(id: &str, seed: i32) -> ProxelConfig<JsonProperties> {
    let mut properties = JsonProperties::new();
    properties.insert("seed", seed);

    ProxelConfig {
        id: id.into(),
        type_name: "RelayProxel".into(),
        properties,
    }
}

#[tokio::test]
async fn built_graph_moves_data_between_proxels() {
    let factories = relay_factories();
    let configs = vec![relay_config("out", 42), relay_config("in", 0)];
    let connections = vec![ConnectionSpec::new("out", "outport", "in", "inport")];

    let graph = build_graph(&factories, &configs, &connections).unwrap();

    graph.start(true, None).unwrap();
    sleep(Duration::from_millis(100)).await;
    graph.stop().await;

    let receiver = graph.get::<RelayProxel>("in").unwrap();
    assert_eq!(receiver.stored(), 42);
}

#[tokio::test]
async fn duplicate_config_ids_fail_the_build() {
    let factories = relay_factories();
    let configs = vec![relay_config("dup", 1), relay_config("dup", 2)];

    let err = build_graph(&factories, &configs, &[]).unwrap_err();
    assert!(err.to_string().contains("dup"));
}

#[tokio::test]
async fn unknown_factory_type_fails_the_build() {
    let factories = relay_factories();
    let configs = vec![ProxelConfig {
        id: "x".into(),
        type_name: "NoSuchProxel".into(),
        properties: JsonProperties::new(),
    }];

    let err = build_graph(&factories, &configs, &[]).unwrap_err();
    assert!(err.to_string().contains("NoSuchProxel"));
}

#[tokio::test]
async fn factory_failures_name_the_offending_proxel() {
    let mut factories = FactoryMap::new();
    factories.insert("Broken", |_props: &JsonProperties| {
        Err(ProxelError::new("missing mandatory property"))
    });

    let configs = vec![ProxelConfig {
        id: "fragile".into(),
        type_name: "Broken".into(),
        properties: JsonProperties::new(),
    }];

    let err = build_graph(&factories, &configs, &[]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("fragile"));
    assert!(message.contains("missing mandatory property"));
}

#[tokio::test]
async fn connect_errors_name_all_four_components() {
    let factories = relay_factories();
    let configs = vec![relay_config("a", 0), relay_config("b", 0)];
    let graph = build_graph(&factories, &configs, &[]).unwrap();

    let err = graph.connect("a", "no_such_port", "b", "inport").unwrap_err();
    let message = err.to_string();

    assert!(message.contains("a.no_such_port"));
    assert!(message.contains("b.inport"));

    assert!(matches!(
        graph.connect("a", "outport", "a", "inport").unwrap_err(),
        GraphError::SelfConnection { .. }
    ));
}

#[tokio::test]
async fn a_crashing_proxel_is_isolated_and_reported() {
    let mut graph = Graph::new();
    let steady = SteadyProxel::new();
    graph.add("A", MaydayProxel::new("mayday")).unwrap();
    graph.add("B", steady.clone()).unwrap();

    let reports = Arc::new(Mutexed::new(Vec::<(String, String)>::new()));
    let reporter = {
        let reports = reports.clone();
        Arc::new(move |id: &str, failure: &ProxelError| {
            reports.write(|entries| entries.push((id.to_string(), failure.message.clone())));
        }) as Arc<dyn Fn(&str, &ProxelError) + Send + Sync>
    };

    graph.start(true, Some(reporter)).unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(reports.load(), vec![("A".to_string(), "mayday".to_string())]);

    let statuses = graph.statuses();
    assert_eq!(statuses["A"].state, ProxelState::Crashed);
    assert_eq!(statuses["A"].info, "mayday");
    assert_eq!(statuses["B"].state, ProxelState::Running);

    graph.stop().await;
    assert!(steady.was_stopped());
    assert!(!graph.is_running());
}

#[tokio::test]
async fn a_panicking_proxel_is_captured_like_a_failing_one() {
    struct PanickyProxel {
        core: ProxelCore,
    }

    #[async_trait]
    impl Proxel for PanickyProxel {
        async fn start(&self) -> Result<(), ProxelError> {
            panic!("boom");
        }

        fn stop(&self) {}

        fn core(&self) -> &ProxelCore {
            &self.core
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    let mut graph = Graph::new();
    graph
        .add(
            "panicky",
            Arc::new(PanickyProxel {
                core: ProxelCore::new(PortMap::new()),
            }),
        )
        .unwrap();

    graph.start(true, None).unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(graph.statuses()["panicky"].state, ProxelState::Crashed);
    assert_eq!(graph.statuses()["panicky"].info, "boom");

    graph.stop().await;
}

#[tokio::test]
async fn graph_lifecycle_rules_hold() {
    let mut graph = Graph::new();
    graph.add("a", SteadyProxel::new()).unwrap();

    assert!(matches!(
        graph.add("a", SteadyProxel::new()).unwrap_err(),
        GraphError::DuplicateProxel { .. }
    ));

    graph.stop().await; // not running: no-op

    graph.start(true, None).unwrap();
    assert!(graph.is_running());
    assert!(matches!(
        graph.start(true, None).unwrap_err(),
        GraphError::AlreadyRunning
    ));

    graph.stop().await;
    assert!(!graph.is_running());

    // A stopped graph can start again.
    graph.start(true, None).unwrap();
    graph.stop().await;
}

#[tokio::test]
async fn typed_lookup_checks_the_concrete_type() {
    let mut graph = Graph::new();
    graph.add("relay", RelayProxel::new(1)).unwrap();

    assert!(graph.get::<RelayProxel>("relay").is_ok());
    assert!(matches!(
        graph.get::<SteadyProxel>("relay").unwrap_err(),
        GraphError::WrongProxelType { .. }
    ));
    assert!(matches!(
        graph.get::<RelayProxel>("ghost").unwrap_err(),
        GraphError::ProxelNotFound { .. }
    ));
}

#[tokio::test]
async fn proxel_statuses_include_port_statistics() {
    let relay = RelayProxel::new(5);
    let status: ProxelStatus = relay.status();

    assert_eq!(status.state, ProxelState::Undefined);
    assert!(status.ports.contains_key("outport"));
    assert!(status.ports.contains_key("inport"));
    assert_eq!(status.ports["outport"].connections, 0);
}

#[tokio::test]
async fn fan_out_request_scenario() {
    let requester = MultiRequesterPort::<i32, i32>::new();
    let responders: Vec<_> = (0..10).map(|_| ResponderPort::new(|x: i32| 2 * x)).collect();

    for responder in &responders {
        requester.connect(&port_ref(responder)).unwrap();
    }

    assert_eq!(requester.request(23), vec![46; 10]);

    let handles = requester.request_async(23);
    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap());
    }
    assert_eq!(responses, vec![46; 10]);
}

#[tokio::test]
async fn plans_build_runnable_graphs() {
    use crate::engine::{Link, LinkEnd, ProxelSpec};
    use serde_json::json;

    let plan = GraphPlan::new(
        vec![
            ProxelSpec::new("out", "RelayProxel").with_properties(
                JsonProperties::from_value(json!({ "seed": 42 })).unwrap(),
            ),
            ProxelSpec::new("in", "RelayProxel"),
        ],
        vec![Link::new(
            LinkEnd::single("out", "outport"),
            LinkEnd::single("in", "inport"),
        )],
    );

    let graph = plan.build(&relay_factories()).unwrap();
    graph.start(true, None).unwrap();
    sleep(Duration::from_millis(100)).await;
    graph.stop().await;

    assert_eq!(graph.get::<RelayProxel>("in").unwrap().stored(), 42);
}

#[tokio::test]
async fn dropping_a_proxel_severs_its_connections() {
    let producer_side = RelayProxel::new(1);
    let consumer_side = RelayProxel::new(2);

    producer_side
        .port("outport")
        .unwrap()
        .connect(&consumer_side.port("inport").unwrap())
        .unwrap();
    assert!(consumer_side.port("inport").unwrap().is_connected());

    drop(producer_side);

    assert!(!consumer_side.port("inport").unwrap().is_connected());
}

#[tokio::test]
async fn statuses_map_is_ordered_by_proxel_id() {
    let mut graph = Graph::new();
    graph.add("zeta", SteadyProxel::new()).unwrap();
    graph.add("alpha", SteadyProxel::new()).unwrap();

    let ids: Vec<_> = graph.statuses().keys().cloned().collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);

    let _: BTreeMap<String, ProxelStatus> = graph.statuses();
}
