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

//! One pass of the control loop.
//!
//! Context → Agents → Arbitration → Safety → Execution → Learner/Statistics.
//! Every failure inside a pass is contained and reported in the returned
//! [`TickReport`]; nothing here can stop the loop.

use crate::arbitration::Arbiter;
use crate::debounce::ReoptimizeReason;
use crate::executor::ActionExecutor;
use crate::learning::PreferenceLearner;
use crate::registry::AgentRegistry;
use crate::safety::{SafetyValidator, SafetyViolation, Verdict};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vigil_core::{
    ActionValue, AgentError, ContextProvider, ContextSignature, ExecutionResult, HandlerRegistry,
    OrchestratorStatistics, OverrideRecord, ResolvedActionSet, VigilConfig,
};

/// What started a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickTrigger {
    /// The fixed-interval timer.
    Scheduled,
    /// A debounced out-of-cycle request.
    Reoptimize(ReoptimizeReason),
    /// A direct synchronous call.
    Manual,
}

impl fmt::Display for TickTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickTrigger::Scheduled => f.write_str("scheduled"),
            TickTrigger::Reoptimize(reason) => write!(f, "reoptimize ({reason})"),
            TickTrigger::Manual => f.write_str("manual"),
        }
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Run number since first start.
    pub tick: u64,
    /// What started the run.
    pub trigger: TickTrigger,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Context signature, if a snapshot was obtained.
    pub signature: Option<ContextSignature>,
    /// Non-empty proposals received.
    pub proposals: usize,
    /// Agents whose proposal was treated as empty.
    pub agent_failures: Vec<AgentError>,
    /// Targets that needed an arbitration decision.
    pub conflicts_resolved: usize,
    /// Actions clamped by the validator.
    pub adjusted: usize,
    /// Actions refused by the validator.
    pub violations: Vec<SafetyViolation>,
    /// Execution outcome.
    pub execution: ExecutionResult,
    /// Overrides noticed at the start of the run.
    pub overrides_detected: usize,
    /// Set when the context provider failed and the run stopped early.
    pub context_error: Option<String>,
    /// Time spent in the run.
    pub duration: Duration,
}

impl TickReport {
    fn new(tick: u64, trigger: TickTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            tick,
            trigger,
            started_at,
            signature: None,
            proposals: 0,
            agent_failures: Vec::new(),
            conflicts_resolved: 0,
            adjusted: 0,
            violations: Vec::new(),
            execution: ExecutionResult::empty(),
            overrides_detected: 0,
            context_error: None,
            duration: Duration::ZERO,
        }
    }
}

/// The components of the control loop and the state they share.
pub struct Pipeline {
    provider: Box<dyn ContextProvider>,
    registry: AgentRegistry,
    arbiter: Arbiter,
    validator: SafetyValidator,
    executor: ActionExecutor,
    learner: PreferenceLearner,
    statistics: OrchestratorStatistics,
    agent_timeout: Duration,
    last_signature: ContextSignature,
    uptime_mark: Option<Instant>,
}

impl Pipeline {
    /// Assembles a pipeline with an empty agent registry.
    pub fn new(
        config: &VigilConfig,
        provider: Box<dyn ContextProvider>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            provider,
            registry: AgentRegistry::new(),
            arbiter: Arbiter::new(),
            validator: SafetyValidator::new(&config.safety_bounds),
            executor: ActionExecutor::new(handlers),
            learner: PreferenceLearner::new(
                &config.learning,
                config.policy.override_confidence_threshold,
            ),
            statistics: OrchestratorStatistics::default(),
            agent_timeout: config.agent_timeout(),
            last_signature: ContextSignature::default(),
            uptime_mark: None,
        }
    }

    /// The agent registry.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Replaces the agent registry.
    pub fn set_registry(&mut self, registry: AgentRegistry) {
        self.registry = registry;
    }

    /// The learner.
    pub fn learner(&self) -> &PreferenceLearner {
        &self.learner
    }

    /// Mutable access to the learner, for restoring persisted state.
    pub fn learner_mut(&mut self) -> &mut PreferenceLearner {
        &mut self.learner
    }

    /// Current counters.
    pub fn statistics(&self) -> &OrchestratorStatistics {
        &self.statistics
    }

    /// Replaces the counters with persisted ones.
    pub fn restore_statistics(&mut self, statistics: OrchestratorStatistics) {
        self.statistics = statistics;
    }

    /// Starts counting uptime.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.statistics.mark_started(now);
        self.uptime_mark = Some(Instant::now());
    }

    /// Folds the remaining uptime and stops counting.
    pub fn suspend(&mut self) {
        self.fold_uptime();
        self.uptime_mark = None;
    }

    /// Adds whole elapsed seconds to the cumulative uptime.
    pub fn fold_uptime(&mut self) {
        if let Some(mark) = self.uptime_mark.as_mut() {
            let secs = mark.elapsed().as_secs();
            if secs > 0 {
                self.statistics.cumulative_uptime_secs += secs;
                *mark += Duration::from_secs(secs);
            }
        }
    }

    /// Adds externally counted skips and drops to the statistics.
    pub fn account_missed(&mut self, skipped_ticks: u64, dropped_reoptimizations: u64) {
        self.statistics.ticks_skipped += skipped_ticks;
        self.statistics.reoptimizations_dropped += dropped_reoptimizations;
    }

    /// Records a user change reported by the UI under the latest context.
    pub fn record_user_change(&mut self, target: &str, value: ActionValue) -> OverrideRecord {
        self.statistics.total_overrides += 1;
        self.learner
            .record_user_change(target, value, self.last_signature, Utc::now())
    }

    /// Runs the full pipeline once.
    pub fn run(&mut self, trigger: TickTrigger) -> TickReport {
        let started = Instant::now();
        let now = Utc::now();

        self.statistics.total_ticks += 1;
        if matches!(trigger, TickTrigger::Reoptimize(_)) {
            self.statistics.reoptimizations_run += 1;
        }
        let mut report = TickReport::new(self.statistics.total_ticks, trigger, now);

        // ── 1. Context ───────────────────────────────────────────────────
        let context = match self.provider.snapshot() {
            Ok(context) => Arc::new(context),
            Err(err) => {
                log::warn!("Orchestrator: context unavailable, skipping tick: {}", err);
                report.context_error = Some(err.to_string());
                return self.finish(report, started);
            }
        };
        let signature = context.signature();
        report.signature = Some(signature);
        self.last_signature = signature;

        let overrides = self
            .learner
            .poll_overrides(self.executor.handlers(), signature, now);
        report.overrides_detected = overrides.len();
        self.statistics.total_overrides += overrides.len() as u64;
        self.learner.sample_battery(&context, now);
        let preferences = Arc::new(self.learner.view(now));

        // ── 2. Proposals ─────────────────────────────────────────────────
        let collected =
            self.registry
                .collect_proposals(Arc::clone(&context), preferences, self.agent_timeout);
        report.proposals = collected.submissions.len();
        report.agent_failures = collected.failures;

        // ── 3. Arbitration ───────────────────────────────────────────────
        let outcome = self.arbiter.arbitrate(&collected.submissions);
        report.conflicts_resolved = outcome.conflicts_resolved;

        // ── 4. Safety ────────────────────────────────────────────────────
        let mut validated = ResolvedActionSet::new();
        for action in outcome.resolved {
            match self.validator.validate(action) {
                Verdict::Accepted(action) => {
                    validated.push(action);
                }
                Verdict::Adjusted { action, .. } => {
                    report.adjusted += 1;
                    validated.push(action);
                }
                Verdict::Rejected(violation) => {
                    log::error!("Orchestrator: SafetyViolation: {}", violation);
                    report.violations.push(violation);
                }
            }
        }

        // ── 5. Execution ─────────────────────────────────────────────────
        report.execution = self.executor.execute(validated);

        // ── 6. Feedback ──────────────────────────────────────────────────
        self.registry.notify_executed(&report.execution);
        self.learner
            .observe_execution(&context, &report.execution, now);

        self.finish(report, started)
    }

    // ── 7. Statistics ────────────────────────────────────────────────────
    fn finish(&mut self, mut report: TickReport, started: Instant) -> TickReport {
        let stats = &mut self.statistics;
        stats.total_actions_executed += report.execution.applied_count() as u64;
        stats.total_conflicts_resolved += report.conflicts_resolved as u64;
        stats.total_safety_violations += report.violations.len() as u64;
        stats.total_adjustments += report.adjusted as u64;
        stats.total_agent_failures += report.agent_failures.len() as u64;
        if !report.execution.success {
            stats.total_failed_batches += 1;
        }
        self.fold_uptime();

        report.duration = started.elapsed();
        log::debug!(
            "Orchestrator: tick {} ({}) {} proposals, {} conflicts, {} applied, {} failed agents in {:?}",
            report.tick,
            report.trigger,
            report.proposals,
            report.conflicts_resolved,
            report.execution.applied_count(),
            report.agent_failures.len(),
            report.duration
        );
        report
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .field("statistics", &self.statistics)
            .finish_non_exhaustive()
    }
}
