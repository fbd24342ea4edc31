// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::errors::{GraphError, ProxelError};
use crate::traits::{PortRef, Proxel, ProxelState, ProxelStatus, ProxelStatusMap};
use crate::utils::Watchdog;

/// Called with the id and failure value of every proxel that crashes while
/// the graph handles exceptions.
pub type CrashReporter = Arc<dyn Fn(&str, &ProxelError) + Send + Sync>;

type Crashes = Arc<Mutex<BTreeMap<String, ProxelError>>>;

const STOP_NAG_PERIOD: Duration = Duration::from_secs(2);

/// Container owning proxels, wiring them and running them.
///
/// [`start`](Self::start) spawns one worker task per proxel and returns;
/// [`stop`](Self::stop) asks every proxel to stop and joins every worker,
/// nagging through a watchdog while a join is outstanding. With exception
/// handling enabled, a proxel failure (an `Err` from `start` or a panic) is
/// recorded in the crashes map, surfaced through [`statuses`](Self::statuses)
/// and reported to the optional [`CrashReporter`]; other proxels keep
/// running.
///
/// Dropping a running graph signals every proxel to stop and aborts the
/// workers; awaiting [`stop`](Self::stop) is the orderly path.
pub struct Graph {
    proxels: BTreeMap<String, Arc<dyn Proxel>>,
    crashes: Crashes,
    workers: Mutex<BTreeMap<String, JoinHandle<()>>>,
    catching: AtomicBool,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("proxels", &self.proxels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_proxels(BTreeMap::new())
    }

    /// Create a graph with a predefined set of proxels.
    pub fn with_proxels(proxels: BTreeMap<String, Arc<dyn Proxel>>) -> Self {
        Self {
            proxels,
            crashes: Arc::new(Mutex::new(BTreeMap::new())),
            workers: Mutex::new(BTreeMap::new()),
            catching: AtomicBool::new(true),
        }
    }

    /// Add a proxel under a graph-unique id.
    pub fn add(&mut self, id: impl Into<String>, proxel: Arc<dyn Proxel>) -> Result<(), GraphError> {
        let id = id.into();

        if self.proxels.contains_key(&id) {
            return Err(GraphError::DuplicateProxel { id });
        }

        self.proxels.insert(id, proxel);
        Ok(())
    }

    /// Look up a proxel by id.
    pub fn proxel(&self, id: &str) -> Result<Arc<dyn Proxel>, GraphError> {
        self.proxels
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::ProxelNotFound { id: id.to_string() })
    }

    /// Look up a proxel by id, downcast to its concrete type.
    pub fn get<P: Proxel>(&self, id: &str) -> Result<Arc<P>, GraphError> {
        let proxel = self.proxel(id)?;

        proxel
            .as_any_arc()
            .downcast::<P>()
            .map_err(|_| GraphError::WrongProxelType { id: id.to_string() })
    }

    /// Connect two named ports on two proxels.
    ///
    /// Any failure is wrapped in an error naming all four components.
    pub fn connect(
        &self,
        lhs_proxel: &str,
        lhs_port: &str,
        rhs_proxel: &str,
        rhs_port: &str,
    ) -> Result<(), GraphError> {
        if lhs_proxel == rhs_proxel {
            return Err(GraphError::SelfConnection {
                id: lhs_proxel.to_string(),
            });
        }

        self.lookup_and_connect(lhs_proxel, lhs_port, rhs_proxel, rhs_port)
            .map_err(|source| GraphError::Connection {
                lhs_proxel: lhs_proxel.to_string(),
                lhs_port: lhs_port.to_string(),
                rhs_proxel: rhs_proxel.to_string(),
                rhs_port: rhs_port.to_string(),
                source,
            })
    }

    fn lookup_and_connect(
        &self,
        lhs_proxel: &str,
        lhs_port: &str,
        rhs_proxel: &str,
        rhs_port: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let lhs = self.named_port(lhs_proxel, lhs_port)?;
        let rhs = self.named_port(rhs_proxel, rhs_port)?;

        lhs.connect(&rhs)?;
        Ok(())
    }

    fn named_port(&self, proxel_id: &str, port_name: &str) -> Result<PortRef, GraphError> {
        let proxel = self.proxel(proxel_id)?;

        proxel
            .port(port_name)
            .ok_or_else(|| GraphError::PortNotFound {
                proxel: proxel_id.to_string(),
                port: port_name.to_string(),
            })
    }

    /// Spawn one worker per proxel.
    ///
    /// With `handle_exceptions`, failures are caught at the worker boundary:
    /// recorded per proxel, passed to `reporter` (`None` means silent) and
    /// isolated from the rest of the graph. Without it, a failing worker
    /// panics and the panic resurfaces when [`stop`](Self::stop) joins it.
    pub fn start(
        &self,
        handle_exceptions: bool,
        reporter: Option<CrashReporter>,
    ) -> Result<(), GraphError> {
        let mut workers = self.lock_workers();

        if !workers.is_empty() {
            return Err(GraphError::AlreadyRunning);
        }

        self.catching.store(handle_exceptions, Ordering::Relaxed);

        for (id, proxel) in &self.proxels {
            let worker = if handle_exceptions {
                Self::spawn_catching(id.clone(), proxel.clone(), self.crashes.clone(), reporter.clone())
            } else {
                Self::spawn_propagating(id.clone(), proxel.clone())
            };

            workers.insert(id.clone(), worker);
        }

        debug!(proxels = self.proxels.len(), "graph started");
        Ok(())
    }

    fn spawn_catching(
        id: String,
        proxel: Arc<dyn Proxel>,
        crashes: Crashes,
        reporter: Option<CrashReporter>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(proxel.start()).catch_unwind().await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(panic) => Some(ProxelError::new(panic_message(panic.as_ref()))),
            };

            if let Some(failure) = failure {
                debug!(proxel = %id, error = %failure, "proxel crashed");
                crashes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.clone(), failure.clone());

                if let Some(report) = &reporter {
                    report(&id, &failure);
                }
            }
        })
    }

    fn spawn_propagating(id: String, proxel: Arc<dyn Proxel>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = proxel.start().await {
                panic!("proxel '{id}' failed: {err}");
            }
        })
    }

    /// Ask every proxel to stop, then join every worker. No-op while not
    /// running.
    ///
    /// While a join is outstanding, a watchdog warns every two seconds
    /// naming the proxel still holding things up. Crash records are cleared
    /// once every worker has been joined.
    pub async fn stop(&self) {
        let workers = std::mem::take(&mut *self.lock_workers());

        if workers.is_empty() {
            return;
        }

        for proxel in self.proxels.values() {
            proxel.stop();
        }

        let catching = self.catching.load(Ordering::Relaxed);

        for (id, worker) in workers {
            let nag_id = id.clone();
            let nagger = Watchdog::spawn(STOP_NAG_PERIOD, move |waited| {
                warn!(
                    proxel = %nag_id,
                    waited_secs = waited.as_secs(),
                    "still waiting for proxel to finish"
                );
            });

            if let Err(join_error) = worker.await {
                if join_error.is_panic() && !catching {
                    nagger.stop();
                    std::panic::resume_unwind(join_error.into_panic());
                }
                error!(proxel = %id, error = %join_error, "proxel worker did not join cleanly");
            }

            nagger.stop();
        }

        self.lock_crashes().clear();
        debug!("graph stopped");
    }

    /// Whether workers are currently running.
    pub fn is_running(&self) -> bool {
        !self.lock_workers().is_empty()
    }

    /// Current status of every proxel; crashed proxels report
    /// [`ProxelState::Crashed`] with the failure message.
    pub fn statuses(&self) -> ProxelStatusMap {
        let crashes = self.lock_crashes();

        self.proxels
            .iter()
            .map(|(id, proxel)| {
                let status = match crashes.get(id) {
                    Some(failure) => ProxelStatus {
                        state: ProxelState::Crashed,
                        info: failure.message.clone(),
                        ports: BTreeMap::new(),
                    },
                    None => proxel.status(),
                };
                (id.clone(), status)
            })
            .collect()
    }

    /// A reporter logging crashes through `tracing::error!`.
    pub fn tracing_reporter() -> CrashReporter {
        Arc::new(|id, failure| {
            error!(proxel = %id, error = %failure, "proxel crashed");
        })
    }

    fn lock_workers(&self) -> MutexGuard<'_, BTreeMap<String, JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_crashes(&self) -> MutexGuard<'_, BTreeMap<String, ProxelError>> {
        self.crashes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut *self.lock_workers());

        if workers.is_empty() {
            return;
        }

        warn!("graph dropped while running; aborting workers");

        for proxel in self.proxels.values() {
            proxel.stop();
        }
        for worker in workers.into_values() {
            worker.abort();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
