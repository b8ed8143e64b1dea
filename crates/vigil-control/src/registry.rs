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

//! Agent registry with ordered, fault-contained proposal collection.

use crate::arbitration::Submission;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use vigil_core::{
    Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView, Priority,
    Proposal,
};

/// Consecutive failures after which an agent is reported as unavailable.
pub const UNAVAILABLE_AFTER: u32 = 3;

/// Last-known activity of one agent, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentActivity {
    /// The agent.
    pub agent: AgentId,
    /// The agent's own description of its last decision.
    pub description: String,
    /// Priority of the last successful proposal.
    pub last_priority: Option<Priority>,
    /// Number of actions in the last successful proposal.
    pub last_action_count: usize,
    /// Actions proposed since start.
    pub actions_proposed: u64,
    /// Failures since the last successful proposal.
    pub consecutive_failures: u32,
    /// Failures since start.
    pub total_failures: u64,
    /// Most recent failure.
    pub last_error: Option<String>,
}

impl AgentActivity {
    fn new(agent: AgentId) -> Self {
        Self {
            agent,
            description: "not run yet".to_string(),
            last_priority: None,
            last_action_count: 0,
            actions_proposed: 0,
            consecutive_failures: 0,
            total_failures: 0,
            last_error: None,
        }
    }

    /// `false` once the agent failed [`UNAVAILABLE_AFTER`] times in a row.
    pub fn is_available(&self) -> bool {
        self.consecutive_failures < UNAVAILABLE_AFTER
    }
}

/// Entry in the agent registry.
struct AgentEntry {
    id: AgentId,
    agent: Arc<Mutex<dyn Agent>>,
    activity: AgentActivity,
}

/// Proposals gathered for one tick.
#[derive(Debug, Default)]
pub struct Collected {
    /// Successful proposals, stamped with registration rank, in rank order.
    pub submissions: Vec<Submission>,
    /// Agents that failed, panicked, timed out or were still busy.
    pub failures: Vec<AgentError>,
}

struct Reply {
    result: Result<Proposal, AgentError>,
    description: Option<String>,
}

/// Ordered set of agents.
///
/// Registration order is significant: it is the final arbitration tie-break.
pub struct AgentRegistry {
    entries: Vec<AgentEntry>,
}

impl AgentRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an agent. Returns `false` if an agent with the same id is
    /// already registered.
    pub fn register(&mut self, agent: Arc<Mutex<dyn Agent>>) -> bool {
        let id = match agent.lock() {
            Ok(a) => a.id(),
            Err(poisoned) => poisoned.into_inner().id(),
        };
        if self.entries.iter().any(|e| e.id == id) {
            log::warn!("AgentRegistry: {} is already registered, ignoring.", id);
            return false;
        }
        log::info!(
            "AgentRegistry: Registered {} (rank={})",
            id,
            self.entries.len()
        );
        self.entries.push(AgentEntry {
            id,
            agent,
            activity: AgentActivity::new(id),
        });
        true
    }

    /// Returns the number of registered agents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<AgentId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Activity of every agent, in registration order.
    pub fn activities(&self) -> Vec<AgentActivity> {
        self.entries.iter().map(|e| e.activity.clone()).collect()
    }

    /// Asks every agent for a proposal, in parallel, each bounded by `timeout`.
    ///
    /// Returns only once every agent has answered or the deadline has passed,
    /// so arbitration never starts on a partial set. An agent that does not
    /// answer in time keeps running on its own thread; until it returns, later
    /// calls report it as [`AgentError::Busy`].
    pub fn collect_proposals(
        &mut self,
        context: Arc<ContextSnapshot>,
        preferences: Arc<PreferenceView>,
        timeout: Duration,
    ) -> Collected {
        let mut replies: Vec<Option<Reply>> = Vec::with_capacity(self.entries.len());
        replies.resize_with(self.entries.len(), || None);

        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Reply)>();
        let mut pending = 0usize;

        for (rank, entry) in self.entries.iter().enumerate() {
            let id = entry.id;
            let agent = Arc::clone(&entry.agent);
            let tx = tx.clone();
            let context = Arc::clone(&context);
            let preferences = Arc::clone(&preferences);

            let spawned = thread::Builder::new()
                .name(format!("vigil-agent-{}", id))
                .spawn(move || {
                    let reply = invoke(id, &agent, &context, &preferences);
                    // The collector may have given up on us already.
                    let _ = tx.send((rank, reply));
                });
            match spawned {
                Ok(_) => pending += 1,
                Err(e) => {
                    replies[rank] = Some(Reply {
                        result: Err(AgentError::failed(id, format!("could not spawn worker: {e}"))),
                        description: None,
                    });
                }
            }
        }
        drop(tx);

        let deadline = Instant::now() + timeout;
        while pending > 0 {
            match rx.recv_deadline(deadline) {
                Ok((rank, reply)) => {
                    replies[rank] = Some(reply);
                    pending -= 1;
                }
                Err(_) => break,
            }
        }

        let mut collected = Collected::default();
        for (rank, (entry, reply)) in self.entries.iter_mut().zip(replies).enumerate() {
            let reply = reply.unwrap_or(Reply {
                result: Err(AgentError::TimedOut {
                    agent: entry.id,
                    timeout,
                }),
                description: None,
            });

            let activity = &mut entry.activity;
            if let Some(description) = reply.description {
                activity.description = description;
            }
            match reply.result {
                Ok(proposal) => {
                    activity.last_priority = Some(proposal.priority);
                    activity.last_action_count = proposal.actions.len();
                    activity.actions_proposed += proposal.actions.len() as u64;
                    activity.consecutive_failures = 0;
                    if !proposal.is_empty() {
                        collected.submissions.push(Submission::new(rank, proposal));
                    }
                }
                Err(err) => {
                    log::warn!("AgentRegistry: {}. Treating its proposal as empty.", err);
                    activity.consecutive_failures += 1;
                    activity.total_failures += 1;
                    activity.last_error = Some(err.to_string());
                    if activity.consecutive_failures == UNAVAILABLE_AFTER {
                        log::warn!(
                            "AgentRegistry: {} failed {} ticks in a row, marking unavailable.",
                            entry.id,
                            UNAVAILABLE_AFTER
                        );
                    }
                    collected.failures.push(err);
                }
            }
        }
        collected
    }

    /// Delivers the execution result to every agent.
    ///
    /// Agents still busy with a timed-out call are skipped. Panics are caught
    /// and logged.
    pub fn notify_executed(&self, result: &ExecutionResult) {
        for entry in &self.entries {
            let mut agent = match entry.agent.try_lock() {
                Ok(agent) => agent,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    log::debug!(
                        "AgentRegistry: {} still busy, skipping execution feedback.",
                        entry.id
                    );
                    continue;
                }
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| agent.on_executed(result)));
            if let Err(payload) = outcome {
                log::warn!(
                    "AgentRegistry: {} panicked in on_executed: {}",
                    entry.id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.ids())
            .finish()
    }
}

fn invoke(
    id: AgentId,
    agent: &Mutex<dyn Agent>,
    context: &ContextSnapshot,
    preferences: &PreferenceView,
) -> Reply {
    let mut agent = match agent.try_lock() {
        Ok(agent) => agent,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => {
            return Reply {
                result: Err(AgentError::Busy { agent: id }),
                description: None,
            };
        }
    };

    let result = match panic::catch_unwind(AssertUnwindSafe(|| agent.propose(context, preferences)))
    {
        Ok(Ok(mut proposal)) => {
            proposal.agent = id;
            Ok(proposal)
        }
        Ok(Err(err)) => Err(err),
        Err(payload) => Err(AgentError::Panicked {
            agent: id,
            message: panic_message(payload.as_ref()),
        }),
    };
    let description = panic::catch_unwind(AssertUnwindSafe(|| agent.describe())).ok();

    Reply {
        result,
        description,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::Action;

    enum Behavior {
        Propose(Priority, i64),
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct MockAgent {
        id: AgentId,
        behavior: Behavior,
        executed: Arc<AtomicUsize>,
    }

    impl MockAgent {
        fn shared(id: AgentId, behavior: Behavior) -> (Arc<Mutex<dyn Agent>>, Arc<AtomicUsize>) {
            let executed = Arc::new(AtomicUsize::new(0));
            let agent: Arc<Mutex<dyn Agent>> = Arc::new(Mutex::new(MockAgent {
                id,
                behavior,
                executed: executed.clone(),
            }));
            (agent, executed)
        }
    }

    impl Agent for MockAgent {
        fn id(&self) -> AgentId {
            self.id
        }

        fn propose(
            &mut self,
            _context: &ContextSnapshot,
            _preferences: &PreferenceView,
        ) -> Result<Proposal, AgentError> {
            match self.behavior {
                Behavior::Propose(priority, value) => Ok(Proposal::new(self.id, priority)
                    .with_action(Action::proactive("GPU_TGP", value, "mock"))),
                Behavior::Fail => Err(AgentError::failed(self.id, "sensor missing")),
                Behavior::Panic => panic!("mock agent exploded"),
                Behavior::Sleep(d) => {
                    thread::sleep(d);
                    Ok(Proposal::empty(self.id))
                }
            }
        }

        fn on_executed(&mut self, _result: &ExecutionResult) {
            self.executed.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            format!("{} mock", self.id)
        }
    }

    fn collect(registry: &mut AgentRegistry, timeout: Duration) -> Collected {
        registry.collect_proposals(
            Arc::new(ContextSnapshot::default()),
            Arc::new(PreferenceView::new(0.6)),
            timeout,
        )
    }

    #[test]
    fn test_registration_order_is_rank() {
        let mut registry = AgentRegistry::new();
        registry.register(MockAgent::shared(AgentId::Gpu, Behavior::Propose(Priority::High, 140)).0);
        registry.register(
            MockAgent::shared(AgentId::Thermal, Behavior::Propose(Priority::Medium, 80)).0,
        );
        assert_eq!(registry.ids(), vec![AgentId::Gpu, AgentId::Thermal]);

        let collected = collect(&mut registry, Duration::from_secs(2));
        assert!(collected.failures.is_empty());
        let ranks: Vec<(usize, AgentId)> = collected
            .submissions
            .iter()
            .map(|s| (s.rank, s.proposal.agent))
            .collect();
        assert_eq!(ranks, vec![(0, AgentId::Gpu), (1, AgentId::Thermal)]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AgentRegistry::new();
        assert!(registry.register(MockAgent::shared(AgentId::Gpu, Behavior::Fail).0));
        assert!(!registry.register(MockAgent::shared(AgentId::Gpu, Behavior::Fail).0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failures_and_panics_are_contained() {
        let mut registry = AgentRegistry::new();
        registry.register(MockAgent::shared(AgentId::Thermal, Behavior::Fail).0);
        registry.register(MockAgent::shared(AgentId::Power, Behavior::Panic).0);
        registry.register(MockAgent::shared(AgentId::Gpu, Behavior::Propose(Priority::High, 140)).0);

        let collected = collect(&mut registry, Duration::from_secs(2));
        assert_eq!(collected.submissions.len(), 1);
        assert_eq!(collected.submissions[0].rank, 2);
        assert_eq!(collected.failures.len(), 2);
        assert!(collected
            .failures
            .iter()
            .any(|e| matches!(e, AgentError::Panicked { agent: AgentId::Power, message } if message.contains("exploded"))));

        let activity = registry.activities();
        assert_eq!(activity[0].consecutive_failures, 1);
        assert_eq!(activity[2].description, "Gpu mock");
        assert_eq!(activity[2].last_priority, Some(Priority::High));
    }

    #[test]
    fn test_slow_agent_times_out_then_reports_busy() {
        let mut registry = AgentRegistry::new();
        registry.register(
            MockAgent::shared(AgentId::Display, Behavior::Sleep(Duration::from_millis(400))).0,
        );
        registry.register(MockAgent::shared(AgentId::Gpu, Behavior::Propose(Priority::Low, 60)).0);

        let started = Instant::now();
        let first = collect(&mut registry, Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(350));
        assert_eq!(first.submissions.len(), 1);
        assert!(matches!(
            first.failures[0],
            AgentError::TimedOut {
                agent: AgentId::Display,
                ..
            }
        ));

        let second = collect(&mut registry, Duration::from_millis(50));
        assert!(matches!(
            second.failures[0],
            AgentError::Busy {
                agent: AgentId::Display
            }
        ));
    }

    #[test]
    fn test_unavailable_after_consecutive_failures() {
        let mut registry = AgentRegistry::new();
        registry.register(MockAgent::shared(AgentId::Battery, Behavior::Fail).0);
        for _ in 0..UNAVAILABLE_AFTER {
            collect(&mut registry, Duration::from_secs(1));
        }
        let activity = &registry.activities()[0];
        assert!(!activity.is_available());
        assert_eq!(activity.total_failures, UNAVAILABLE_AFTER as u64);
        assert!(activity.last_error.as_deref().unwrap().contains("sensor missing"));
    }

    #[test]
    fn test_notify_executed_reaches_every_agent() {
        let mut registry = AgentRegistry::new();
        let (a, a_count) = MockAgent::shared(AgentId::Thermal, Behavior::Fail);
        let (b, b_count) = MockAgent::shared(AgentId::Power, Behavior::Panic);
        registry.register(a);
        registry.register(b);
        registry.notify_executed(&ExecutionResult::empty());
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }
}
