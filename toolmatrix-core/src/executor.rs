//! Triggered reconciliation: at most one cycle at a time, triggers coalesced into one rerun.

use crate::pipeline::{CycleError, CycleSources, run_cycle, write_registry_artifacts};
use crate::ports::{DefinitionsSource, InventorySource, UsageSource, WritePort};
use crate::settings::ReconcileSettings;
use crate::watch::InputWatcher;
use anyhow::Context;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{MutexGuard, Notify, watch};
use tokio::task::JoinHandle;
use toolmatrix_domain::ToolRegistry;
use toolmatrix_types::report::CycleReport;
use tracing::{debug, info, warn};

/// Running flag plus a single pending slot.
///
/// Any number of triggers while a cycle runs collapse into one follow-up cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Gate {
    running: bool,
    pending: bool,
    stopped: bool,
}

impl Gate {
    /// Records a request. Returns `true` when the run loop is idle and needs waking.
    pub fn trigger(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.pending = true;
        !self.running
    }

    /// Claims the pending slot for a new cycle, if there is one and nothing is running.
    pub fn begin(&mut self) -> bool {
        if self.stopped || self.running || !self.pending {
            return false;
        }
        self.pending = false;
        self.running = true;
        true
    }

    /// Marks a cycle that did not come from the pending slot, e.g. a direct `process_files`.
    pub fn enter(&mut self) {
        self.running = true;
    }

    /// Ends the running cycle. Returns `true` when a rerun is pending and the loop needs waking.
    pub fn finish(&mut self) -> bool {
        self.running = false;
        self.pending && !self.stopped
    }

    /// Drops any pending rerun; an in-flight cycle is left to finish.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.pending = false;
    }

    pub fn restart(&mut self) {
        self.stopped = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Published after every cycle, successful or not.
#[derive(Debug, Clone, Default)]
pub struct CycleStatus {
    pub completed: u64,
    pub failed: u64,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
}

/// The ports one executor reads from and writes to.
#[derive(Clone)]
pub struct ExecutorPorts {
    pub inventory: Arc<dyn InventorySource>,
    pub usage: Arc<dyn UsageSource>,
    pub definitions: Arc<dyn DefinitionsSource>,
    pub writer: Option<Arc<dyn WritePort>>,
}

struct Shared {
    settings: ReconcileSettings,
    ports: ExecutorPorts,
    registry: Arc<ToolRegistry>,
    gate: Mutex<Gate>,
    wake: Notify,
    /// Serializes cycles from the run loop and from `process_files`; holds the cycle counter.
    cycle: tokio::sync::Mutex<u64>,
    status: watch::Sender<CycleStatus>,
}

impl Shared {
    fn gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one cycle while holding the cycle lock. The gate is already marked running; it is
    /// released here, and the run loop woken if triggers arrived meanwhile.
    async fn run_locked(
        self: &Arc<Self>,
        mut counter: MutexGuard<'_, u64>,
    ) -> Result<CycleReport, CycleError> {
        *counter += 1;
        let cycle = *counter;

        let this = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || this.cycle_blocking(cycle))
            .await
            .context("cycle task panicked")
            .map_err(CycleError::Internal)
            .and_then(|r| r);

        self.status.send_modify(|s| match &result {
            Ok(report) => {
                s.completed += 1;
                s.last_report = Some(report.clone());
                s.last_error = None;
            }
            Err(e) => {
                s.failed += 1;
                s.last_error = Some(e.to_string());
            }
        });

        if let Err(e) = &result {
            warn!(cycle, error = %e, "reconciliation cycle failed; previous registry kept");
        }

        let rerun = self.gate().finish();
        drop(counter);
        if rerun {
            self.wake.notify_one();
        }
        result
    }

    fn cycle_blocking(&self, cycle: u64) -> Result<CycleReport, CycleError> {
        let sources = CycleSources {
            inventory: self.ports.inventory.as_ref(),
            usage: self.ports.usage.as_ref(),
            definitions: self.ports.definitions.as_ref(),
        };
        let report = run_cycle(cycle, &self.settings, sources, &self.registry)?;

        if let (Some(out_dir), Some(writer)) = (&self.settings.out_dir, &self.ports.writer) {
            write_registry_artifacts(&self.registry, &report, out_dir, writer.as_ref())
                .with_context(|| format!("write registry artifacts to {}", out_dir))?;
        }
        Ok(report)
    }

    async fn run_loop(self: Arc<Self>) {
        debug!("executor run loop started");
        loop {
            if self.gate().is_stopped() {
                break;
            }
            if self.gate().is_pending() {
                // The slot is only claimed under the cycle lock, so a cycle already holding it
                // absorbs every trigger that arrives while it runs.
                let counter = self.cycle.lock().await;
                let claimed = self.gate().begin();
                if claimed {
                    // Failures are logged and published by run_locked.
                    self.run_locked(counter).await.ok();
                    continue;
                }
            }
            self.wake.notified().await;
        }
        debug!("executor run loop stopped");
    }
}

/// Owns the registry, the run loop and the input watcher.
pub struct Executor {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<InputWatcher>>,
    status_rx: watch::Receiver<CycleStatus>,
}

impl Executor {
    pub fn new(settings: ReconcileSettings, ports: ExecutorPorts) -> Self {
        Self::with_registry(settings, ports, Arc::new(ToolRegistry::new()))
    }

    pub fn with_registry(
        settings: ReconcileSettings,
        ports: ExecutorPorts,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let (status, status_rx) = watch::channel(CycleStatus::default());
        Self {
            shared: Arc::new(Shared {
                settings,
                ports,
                registry,
                gate: Mutex::new(Gate::default()),
                wake: Notify::new(),
                cycle: tokio::sync::Mutex::new(0),
                status,
            }),
            task: Mutex::new(None),
            watcher: Mutex::new(None),
            status_rx,
        }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.shared.registry)
    }

    /// Receiver that changes after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<CycleStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> CycleStatus {
        self.status_rx.borrow().clone()
    }

    /// Starts the run loop and, if enabled, the input watcher, then requests the first cycle.
    ///
    /// Must be called from within a tokio runtime. Calling it while already started is a no-op.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Ok(());
        }
        self.shared.gate().restart();

        if self.shared.settings.watch {
            let shared = Arc::clone(&self.shared);
            let watcher = InputWatcher::new(&self.shared.settings.watched_inputs(), move || {
                trigger_shared(&shared)
            })
            .context("start input watcher")?;
            *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        }

        *task = Some(tokio::spawn(Arc::clone(&self.shared).run_loop()));
        info!("executor started");
        drop(task);

        self.trigger();
        Ok(())
    }

    /// Requests a cycle. Coalesced with any request already pending.
    pub fn trigger(&self) {
        trigger_shared(&self.shared);
    }

    /// Runs exactly one cycle now and returns once the registry holds its result.
    ///
    /// Waits for an in-flight cycle to finish first.
    pub async fn process_files(&self) -> Result<CycleReport, CycleError> {
        let counter = self.shared.cycle.lock().await;
        self.shared.gate().enter();
        self.shared.run_locked(counter).await
    }

    /// Stops watching, drops a pending rerun and waits for any in-flight cycle to finish.
    pub async fn stop(&self) {
        self.shared.gate().stop();
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            drop(watcher);
            debug!("input watcher released");
        }
        self.shared.wake.notify_one();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "executor run loop ended abnormally");
        }
        // A cycle started by process_files runs outside the loop; wait for it too.
        drop(self.shared.cycle.lock().await);
        info!("executor stopped");
    }
}

fn trigger_shared(shared: &Shared) {
    let wake = shared.gate().trigger();
    if wake {
        shared.wake.notify_one();
    } else {
        debug!("cycle already running or stopped; trigger coalesced");
    }
}
