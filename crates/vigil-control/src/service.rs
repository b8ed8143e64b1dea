// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The orchestrator service: lifecycle, tick loop, reoptimization worker and
//! persistence timer.

use crate::debounce::{Debouncer, ReoptimizeReason};
use crate::diagnostics::DiagnosticsSnapshot;
use crate::pipeline::{Pipeline, TickReport, TickTrigger};
use crate::registry::AgentRegistry;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::de::DeserializeOwned;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread;
use std::time::Instant;
use thiserror::Error;
use vigil_core::learning::{BatterySample, BehaviorSample, PreferenceDocument};
use vigil_core::persistence::keys;
use vigil_core::{
    ActionValue, Agent, ConfigError, ContextProvider, DocumentStore, HandlerRegistry,
    OrchestratorStatistics, OverrideRecord, PersistenceBackend, PersistenceError, VigilConfig,
};

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not running. Initial and final state.
    Stopped,
    /// Loading persisted state and registering agents.
    Starting,
    /// Tick loop active.
    Running,
    /// Waiting for the in-flight run and persisting.
    Stopping,
}

/// Errors raised by lifecycle calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The call is not valid in the current state. The state is unchanged.
    #[error("cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        /// State at the time of the call.
        from: LifecycleState,
        /// State the call wanted to enter.
        to: LifecycleState,
    },
}

/// Builds the agent set for one start. Agents disabled in the configuration
/// are filtered out by the orchestrator afterwards.
pub type AgentFactory = Box<dyn Fn(&VigilConfig) -> Vec<Arc<Mutex<dyn Agent>>> + Send + Sync>;

/// External collaborators injected at construction.
pub struct Collaborators {
    /// Snapshot source.
    pub provider: Box<dyn ContextProvider>,
    /// Per-target hardware handlers.
    pub handlers: HandlerRegistry,
    /// Document storage.
    pub persistence: Arc<dyn PersistenceBackend>,
    /// Agent constructor.
    pub agents: AgentFactory,
}

/// State shared between the orchestrator handle and its worker threads.
struct Shared {
    config: VigilConfig,
    state: Mutex<LifecycleState>,
    /// Single-acquire lock: whoever holds it is running the pipeline.
    pipeline: Mutex<Pipeline>,
    diagnostics: RwLock<DiagnosticsSnapshot>,
    store: DocumentStore,
    restored: AtomicBool,
    /// Set while a pipeline run holds the lock, as opposed to persistence
    /// or a caller briefly holding it.
    running: AtomicBool,
    ticks_skipped: AtomicU64,
    reoptimizations_dropped: AtomicU64,
}

/// Why a non-blocking run did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Busy {
    /// Another pipeline run is in flight.
    Running,
    /// Persistence, diagnostics or a user report holds the lock.
    Held,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleError> {
        let mut state = lock(&self.state);
        if *state != from {
            return Err(LifecycleError::InvalidTransition { from: *state, to });
        }
        *state = to;
        log::info!("Orchestrator: {:?} → {:?}", from, to);
        Ok(())
    }

    /// Runs the pipeline on an already held lock, containing panics.
    ///
    /// Returns `None` if the run panicked.
    fn run_locked(&self, pipeline: &mut Pipeline, trigger: TickTrigger) -> Option<TickReport> {
        self.fold_missed(pipeline);

        self.running.store(true, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(trigger)));
        self.running.store(false, Ordering::SeqCst);
        let report = match outcome {
            Ok(report) => Some(report),
            Err(_) => {
                log::error!("Orchestrator: pipeline run panicked; loop continues.");
                None
            }
        };

        let previous = self
            .diagnostics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_tick
            .clone();
        let snapshot =
            DiagnosticsSnapshot::capture(self.state(), pipeline, report.clone().or(previous));
        *self
            .diagnostics
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
        report
    }

    /// Moves the skip and drop counters into the pipeline statistics.
    fn fold_missed(&self, pipeline: &mut Pipeline) {
        pipeline.account_missed(
            self.ticks_skipped.swap(0, Ordering::Relaxed),
            self.reoptimizations_dropped.swap(0, Ordering::Relaxed),
        );
    }

    /// Runs the pipeline unless the lock is taken. `Ok(None)` means the run
    /// happened and panicked.
    fn try_run(&self, trigger: TickTrigger) -> Result<Option<TickReport>, Busy> {
        let mut pipeline = match self.pipeline.try_lock() {
            Ok(pipeline) => pipeline,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) if self.running.load(Ordering::SeqCst) => {
                return Err(Busy::Running);
            }
            Err(TryLockError::WouldBlock) => return Err(Busy::Held),
        };
        Ok(self.run_locked(&mut pipeline, trigger))
    }

    /// One scheduled slot. A slot that finds the pipeline locked is skipped.
    fn run_scheduled(&self) {
        if let Err(busy) = self.try_run(TickTrigger::Scheduled) {
            self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            match busy {
                Busy::Running => {
                    log::debug!("Orchestrator: previous run still in progress, tick skipped.");
                }
                Busy::Held => {
                    log::debug!("Orchestrator: pipeline briefly held elsewhere, tick skipped.");
                }
            }
        }
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.load_or_default(key) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("Orchestrator: could not load {}, starting empty: {}", key, err);
                T::default()
            }
        }
    }

    /// Saves all four documents. Every document is attempted; the first error
    /// is returned.
    fn persist(&self) -> Result<(), PersistenceError> {
        let (statistics, preferences, behavior, battery) = {
            let mut pipeline = lock(&self.pipeline);
            self.fold_missed(&mut pipeline);
            pipeline.fold_uptime();
            let learner = pipeline.learner();
            (
                pipeline.statistics().clone(),
                learner.preference_document(),
                learner.behavior_samples(),
                learner.battery_samples(),
            )
        };

        let results = [
            self.store.save(keys::ORCHESTRATOR_STATISTICS, &statistics),
            self.store.save(keys::USER_PREFERENCES, &preferences),
            self.store.save(keys::BEHAVIOR_HISTORY, &behavior),
            self.store.save(keys::BATTERY_HISTORY, &battery),
        ];
        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                log::warn!("Orchestrator: persistence failed: {}", err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                log::debug!("Orchestrator: state persisted.");
                Ok(())
            }
        }
    }
}

/// Drives the control loop.
///
/// Owns the statistics and the learner through the pipeline; both are only
/// mutated by pipeline runs and the persistence timer. Callers observe them
/// through [`diagnostics`](Self::diagnostics).
pub struct Orchestrator {
    shared: Arc<Shared>,
    agents: AgentFactory,
    workers: Vec<thread::JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
    triggers: Option<Sender<ReoptimizeReason>>,
}

impl Orchestrator {
    /// Creates a stopped orchestrator.
    ///
    /// The configuration is validated here; zero intervals would leave the
    /// worker loops spinning.
    pub fn new(config: VigilConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let Collaborators {
            provider,
            handlers,
            persistence,
            agents,
        } = collaborators;
        let pipeline = Pipeline::new(&config, provider, handlers);
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(LifecycleState::Stopped),
            pipeline: Mutex::new(pipeline),
            diagnostics: RwLock::new(DiagnosticsSnapshot::idle(LifecycleState::Stopped)),
            store: DocumentStore::new(persistence),
            restored: AtomicBool::new(false),
            running: AtomicBool::new(false),
            ticks_skipped: AtomicU64::new(0),
            reoptimizations_dropped: AtomicU64::new(0),
        });
        Ok(Self {
            shared,
            agents,
            workers: Vec::new(),
            shutdown: None,
            triggers: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// The configuration in use.
    pub fn config(&self) -> &VigilConfig {
        &self.shared.config
    }

    /// Loads persisted state, registers enabled agents and starts the loop.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.shared
            .transition(LifecycleState::Stopped, LifecycleState::Starting)?;
        let config = &self.shared.config;

        {
            let mut pipeline = lock(&self.shared.pipeline);

            // In-memory state wins over the store after the first start.
            if !self.shared.restored.swap(true, Ordering::SeqCst) {
                let statistics: OrchestratorStatistics =
                    self.shared.load(keys::ORCHESTRATOR_STATISTICS);
                let preferences: PreferenceDocument = self.shared.load(keys::USER_PREFERENCES);
                let behavior: Vec<BehaviorSample> = self.shared.load(keys::BEHAVIOR_HISTORY);
                let battery: Vec<BatterySample> = self.shared.load(keys::BATTERY_HISTORY);
                pipeline.restore_statistics(statistics);
                pipeline
                    .learner_mut()
                    .restore(preferences, behavior, battery);
            }

            let mut registry = AgentRegistry::new();
            for agent in (self.agents)(config) {
                let id = lock(&*agent).id();
                if config.agents.is_enabled(id) {
                    registry.register(agent);
                } else {
                    log::info!("Orchestrator: {} disabled by configuration.", id);
                }
            }
            pipeline.set_registry(registry);
            pipeline.resume(Utc::now());
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (trigger_tx, trigger_rx) = crossbeam_channel::unbounded::<ReoptimizeReason>();

        let spawned = [
            spawn_worker("vigil-tick", {
                let shared = Arc::clone(&self.shared);
                let shutdown = shutdown_rx.clone();
                move || tick_loop(&shared, &shutdown)
            }),
            spawn_worker("vigil-reoptimize", {
                let shared = Arc::clone(&self.shared);
                let shutdown = shutdown_rx.clone();
                move || reoptimize_loop(&shared, &trigger_rx, &shutdown)
            }),
            spawn_worker("vigil-persist", {
                let shared = Arc::clone(&self.shared);
                move || persist_loop(&shared, &shutdown_rx)
            }),
        ];
        self.workers = spawned.into_iter().flatten().collect();
        self.shutdown = Some(shutdown_tx);
        self.triggers = Some(trigger_tx);

        self.shared
            .transition(LifecycleState::Starting, LifecycleState::Running)?;
        self.refresh_diagnostics();
        Ok(())
    }

    /// Lets the in-flight run finish, persists, and stops.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        self.shared
            .transition(LifecycleState::Running, LifecycleState::Stopping)?;

        // Disconnecting the channels wakes every worker.
        self.shutdown = None;
        self.triggers = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Orchestrator: a worker thread panicked.");
            }
        }

        lock(&self.shared.pipeline).suspend();
        if let Err(err) = self.shared.persist() {
            log::warn!("Orchestrator: final persist failed, state kept in memory: {}", err);
        }

        self.shared
            .transition(LifecycleState::Stopping, LifecycleState::Stopped)?;
        self.refresh_diagnostics();
        Ok(())
    }

    /// Requests a debounced out-of-cycle run. Returns `false` when not running.
    pub fn request_reoptimization(&self, reason: ReoptimizeReason) -> bool {
        match &self.triggers {
            Some(tx) if self.state() == LifecycleState::Running => {
                log::debug!("Orchestrator: reoptimization requested ({})", reason);
                tx.send(reason).is_ok()
            }
            _ => false,
        }
    }

    /// Runs the pipeline now, waiting for any in-flight run first.
    pub fn tick_now(&self) -> Option<TickReport> {
        let mut pipeline = lock(&self.shared.pipeline);
        self.shared.run_locked(&mut pipeline, TickTrigger::Manual)
    }

    /// Reports a change the user made through the UI.
    pub fn report_user_change(&self, target: &str, value: ActionValue) -> OverrideRecord {
        let record = lock(&self.shared.pipeline).record_user_change(target, value);
        self.refresh_diagnostics();
        record
    }

    /// Saves all documents now.
    pub fn persist_now(&self) -> Result<(), PersistenceError> {
        self.shared.persist()
    }

    /// Latest diagnostics snapshot.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        let mut snapshot = self
            .shared
            .diagnostics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.state = self.state();
        snapshot
    }

    fn refresh_diagnostics(&self) {
        let pipeline = lock(&self.shared.pipeline);
        let mut diagnostics = self
            .shared
            .diagnostics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let last_tick = diagnostics.last_tick.take();
        *diagnostics = DiagnosticsSnapshot::capture(self.shared.state(), &pipeline, last_tick);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            if let Err(err) = self.stop() {
                log::warn!("Orchestrator: stop on drop failed: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

fn spawn_worker(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> Option<thread::JoinHandle<()>> {
    match thread::Builder::new().name(name.to_string()).spawn(body) {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::error!("Orchestrator: could not spawn {}: {}", name, err);
            None
        }
    }
}

/// Fixed-interval scheduler. A slot that comes due while the previous run is
/// still going is skipped, never queued.
fn tick_loop(shared: &Shared, shutdown: &Receiver<()>) {
    let interval = shared.config.tick_interval();
    let mut next = Instant::now() + interval;
    log::info!("Orchestrator: tick loop started ({:?}).", interval);

    loop {
        match shutdown.recv_deadline(next) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        shared.run_scheduled();

        next += interval;
        let now = Instant::now();
        while next <= now {
            next += interval;
            shared.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }
    log::info!("Orchestrator: tick loop stopped.");
}

/// Debounces triggers and runs them behind the non-blocking pipeline lock.
fn reoptimize_loop(shared: &Shared, triggers: &Receiver<ReoptimizeReason>, shutdown: &Receiver<()>) {
    let mut debouncer = Debouncer::new(shared.config.debounce_window());

    loop {
        let timer = debouncer
            .deadline()
            .map(crossbeam_channel::at)
            .unwrap_or_else(crossbeam_channel::never);

        crossbeam_channel::select! {
            recv(triggers) -> msg => match msg {
                Ok(reason) => debouncer.trigger(reason, Instant::now()),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
            recv(timer) -> _ => {
                if let Some(fired) = debouncer.poll(Instant::now()) {
                    log::info!(
                        "Orchestrator: reoptimizing ({}, {} triggers coalesced).",
                        fired.reason,
                        fired.coalesced
                    );
                    if shared.try_run(TickTrigger::Reoptimize(fired.reason)).is_err() {
                        shared.reoptimizations_dropped.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Orchestrator: pipeline busy, reoptimization dropped.");
                    }
                }
            }
        }
    }
}

/// Periodic persistence. Failures are logged and the loop carries on in
/// memory-only mode.
fn persist_loop(shared: &Shared, shutdown: &Receiver<()>) {
    let interval = shared.config.persistence_interval();
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let _ = shared.persist();
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use vigil_core::{
        AgentError, AgentId, ContextError, ContextSnapshot, ExecutionResult, PreferenceView,
        Proposal,
    };

    struct StaticContext;

    impl ContextProvider for StaticContext {
        fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
            Ok(ContextSnapshot::default())
        }
    }

    #[derive(Default)]
    struct MemoryBackend {
        docs: Mutex<HashMap<String, Vec<u8>>>,
        broken: AtomicBool,
    }

    impl PersistenceBackend for MemoryBackend {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
            Ok(self.docs.lock().unwrap().get(key).cloned())
        }

        fn write(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(PersistenceError::Backend("disk full".into()));
            }
            self.docs
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            Ok(())
        }
    }

    struct Idle(AgentId);

    impl Agent for Idle {
        fn id(&self) -> AgentId {
            self.0
        }

        fn propose(
            &mut self,
            _context: &ContextSnapshot,
            _preferences: &PreferenceView,
        ) -> Result<Proposal, AgentError> {
            Ok(Proposal::empty(self.0))
        }

        fn on_executed(&mut self, _result: &ExecutionResult) {}

        fn describe(&self) -> String {
            "idle".into()
        }
    }

    struct PanickingContext;

    impl ContextProvider for PanickingContext {
        fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
            panic!("sensor driver crashed")
        }
    }

    fn orchestrator(config: VigilConfig, backend: Arc<MemoryBackend>) -> Orchestrator {
        orchestrator_with(Box::new(StaticContext), config, backend).unwrap()
    }

    fn orchestrator_with(
        provider: Box<dyn ContextProvider>,
        config: VigilConfig,
        backend: Arc<MemoryBackend>,
    ) -> Result<Orchestrator, ConfigError> {
        Orchestrator::new(
            config,
            Collaborators {
                provider,
                handlers: HandlerRegistry::new(),
                persistence: backend,
                agents: Box::new(|_: &VigilConfig| {
                    AgentId::ALL
                        .iter()
                        .map(|id| Arc::new(Mutex::new(Idle(*id))) as Arc<Mutex<dyn Agent>>)
                        .collect()
                }),
            },
        )
    }

    fn quiet_config() -> VigilConfig {
        VigilConfig {
            tick_interval_ms: 60_000,
            persistence_interval_secs: 3_600,
            ..VigilConfig::default()
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut orch = orchestrator(quiet_config(), Arc::default());
        assert_eq!(orch.state(), LifecycleState::Stopped);
        assert_eq!(
            orch.stop(),
            Err(LifecycleError::InvalidTransition {
                from: LifecycleState::Stopped,
                to: LifecycleState::Stopping
            })
        );

        orch.start().unwrap();
        assert_eq!(orch.state(), LifecycleState::Running);
        assert!(matches!(
            orch.start(),
            Err(LifecycleError::InvalidTransition {
                from: LifecycleState::Running,
                ..
            })
        ));
        assert_eq!(orch.state(), LifecycleState::Running);

        orch.stop().unwrap();
        assert_eq!(orch.state(), LifecycleState::Stopped);
        orch.start().unwrap();
        orch.stop().unwrap();
    }

    #[test]
    fn test_disabled_agents_are_not_registered() {
        let mut config = quiet_config();
        config.agents.keyboard_light = false;
        config.agents.display = false;
        let mut orch = orchestrator(config, Arc::default());
        orch.start().unwrap();
        let agents: Vec<AgentId> = orch.diagnostics().agents.iter().map(|a| a.agent).collect();
        assert_eq!(agents.len(), 5);
        assert!(!agents.contains(&AgentId::KeyboardLight));
        assert!(!agents.contains(&AgentId::Display));
        orch.stop().unwrap();
    }

    #[test]
    fn test_statistics_survive_restart() {
        let backend = Arc::new(MemoryBackend::default());
        {
            let mut orch = orchestrator(quiet_config(), backend.clone());
            orch.start().unwrap();
            orch.tick_now().unwrap();
            orch.tick_now().unwrap();
            orch.stop().unwrap();
        }
        let mut orch = orchestrator(quiet_config(), backend);
        orch.start().unwrap();
        let stats = orch.diagnostics().statistics;
        assert_eq!(stats.total_ticks, 2);
        assert!(stats.first_started_at.is_some());
        orch.stop().unwrap();
    }

    #[test]
    fn test_persistence_failure_does_not_stop_the_loop() {
        let backend = Arc::new(MemoryBackend::default());
        backend.broken.store(true, Ordering::SeqCst);
        let mut orch = orchestrator(quiet_config(), backend);
        orch.start().unwrap();
        assert!(orch.persist_now().is_err());
        assert!(orch.tick_now().is_some());
        orch.stop().unwrap();
        assert_eq!(orch.state(), LifecycleState::Stopped);
        assert_eq!(orch.diagnostics().statistics.total_ticks, 1);
    }

    #[test]
    fn test_scheduled_ticks_run() {
        let config = VigilConfig {
            tick_interval_ms: 20,
            agent_timeout_ms: 10,
            persistence_interval_secs: 3_600,
            ..VigilConfig::default()
        };
        let mut orch = orchestrator(config, Arc::default());
        orch.start().unwrap();
        thread::sleep(Duration::from_millis(300));
        orch.stop().unwrap();
        let stats = orch.diagnostics().statistics;
        assert!(stats.total_ticks >= 3, "only {} ticks", stats.total_ticks);
    }

    #[test]
    fn test_reoptimization_is_debounced() {
        let config = VigilConfig {
            debounce_ms: 250,
            ..quiet_config()
        };
        let mut orch = orchestrator(config, Arc::default());
        assert!(!orch.request_reoptimization(ReoptimizeReason::PowerSourceChanged));
        orch.start().unwrap();

        assert!(orch.request_reoptimization(ReoptimizeReason::PowerSourceChanged));
        thread::sleep(Duration::from_millis(10));
        assert!(orch.request_reoptimization(ReoptimizeReason::PowerModeChanged));
        thread::sleep(Duration::from_millis(30));
        assert!(orch.request_reoptimization(ReoptimizeReason::DisplayChanged));
        thread::sleep(Duration::from_millis(1000));

        let diagnostics = orch.diagnostics();
        assert_eq!(diagnostics.statistics.reoptimizations_run, 1);
        assert_eq!(
            diagnostics.last_tick.map(|t| t.trigger),
            Some(TickTrigger::Reoptimize(ReoptimizeReason::DisplayChanged))
        );
        orch.stop().unwrap();
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let no_ticks = VigilConfig {
            tick_interval_ms: 0,
            ..quiet_config()
        };
        assert!(matches!(
            orchestrator_with(Box::new(StaticContext), no_ticks, Arc::default()),
            Err(ConfigError::Invalid(_))
        ));

        let no_persistence = VigilConfig {
            persistence_interval_secs: 0,
            ..quiet_config()
        };
        assert!(matches!(
            orchestrator_with(Box::new(StaticContext), no_persistence, Arc::default()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_panicked_run_is_not_counted_as_skipped() {
        let orch =
            orchestrator_with(Box::new(PanickingContext), quiet_config(), Arc::default()).unwrap();

        assert_eq!(orch.shared.try_run(TickTrigger::Scheduled), Ok(None));
        orch.shared.run_scheduled();

        assert_eq!(orch.shared.ticks_skipped.load(Ordering::SeqCst), 0);
        assert!(!orch.shared.running.load(Ordering::SeqCst));
        assert_eq!(lock(&orch.shared.pipeline).statistics().total_ticks, 2);
    }

    #[test]
    fn test_busy_reason_tells_runs_from_brief_holders() {
        let orch = orchestrator(quiet_config(), Arc::default());

        {
            let _held = lock(&orch.shared.pipeline);
            assert_eq!(orch.shared.try_run(TickTrigger::Scheduled), Err(Busy::Held));

            orch.shared.running.store(true, Ordering::SeqCst);
            assert_eq!(
                orch.shared.try_run(TickTrigger::Scheduled),
                Err(Busy::Running)
            );
            orch.shared.running.store(false, Ordering::SeqCst);

            orch.shared.run_scheduled();
        }

        assert_eq!(orch.shared.ticks_skipped.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&orch.shared.pipeline).statistics().total_ticks, 0);
    }

    #[test]
    fn test_persist_includes_pending_skips() {
        let backend = Arc::new(MemoryBackend::default());
        {
            let orch = orchestrator(quiet_config(), backend.clone());
            orch.shared.ticks_skipped.store(3, Ordering::SeqCst);
            orch.shared.reoptimizations_dropped.store(2, Ordering::SeqCst);
            orch.persist_now().unwrap();
            assert_eq!(orch.shared.ticks_skipped.load(Ordering::SeqCst), 0);
        }

        let mut orch = orchestrator(quiet_config(), backend);
        orch.start().unwrap();
        let stats = orch.diagnostics().statistics;
        assert_eq!(stats.ticks_skipped, 3);
        assert_eq!(stats.reoptimizations_dropped, 2);
        orch.stop().unwrap();
    }
}
