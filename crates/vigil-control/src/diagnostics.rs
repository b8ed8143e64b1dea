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

//! Read-only snapshot for monitoring surfaces.

use crate::learning::LearnerSummary;
use crate::pipeline::{Pipeline, TickReport};
use crate::registry::AgentActivity;
use crate::service::LifecycleState;
use chrono::{DateTime, Utc};
use std::fmt;
use vigil_core::OrchestratorStatistics;

/// Everything an external monitor may look at.
///
/// Refreshed by the orchestrator after every run; reading it never touches
/// the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsSnapshot {
    /// Lifecycle state at capture time.
    pub state: LifecycleState,
    /// Cumulative counters.
    pub statistics: OrchestratorStatistics,
    /// Per-agent last-known activity, in registration order.
    pub agents: Vec<AgentActivity>,
    /// Learner counts.
    pub learner: LearnerSummary,
    /// The most recent run, if any.
    pub last_tick: Option<TickReport>,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl DiagnosticsSnapshot {
    /// An empty snapshot for an orchestrator that never ran.
    pub fn idle(state: LifecycleState) -> Self {
        Self {
            state,
            statistics: OrchestratorStatistics::default(),
            agents: Vec::new(),
            learner: LearnerSummary::default(),
            last_tick: None,
            captured_at: Utc::now(),
        }
    }

    /// Captures the pipeline's current state.
    pub fn capture(
        state: LifecycleState,
        pipeline: &Pipeline,
        last_tick: Option<TickReport>,
    ) -> Self {
        let now = Utc::now();
        Self {
            state,
            statistics: pipeline.statistics().clone(),
            agents: pipeline.registry().activities(),
            learner: pipeline.learner().summary(now),
            last_tick,
            captured_at: now,
        }
    }

    /// Agents currently flagged as unavailable.
    pub fn unavailable_agents(&self) -> impl Iterator<Item = &AgentActivity> {
        self.agents.iter().filter(|a| !a.is_available())
    }
}

impl fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.statistics;
        writeln!(
            f,
            "[{:?}] ticks={} actions={} conflicts={} adjusted={} violations={} failed_batches={} skipped={} uptime={}s",
            self.state,
            s.total_ticks,
            s.total_actions_executed,
            s.total_conflicts_resolved,
            s.total_adjustments,
            s.total_safety_violations,
            s.total_failed_batches,
            s.ticks_skipped,
            s.cumulative_uptime_secs
        )?;
        for agent in &self.agents {
            writeln!(
                f,
                "  {:<14} {}{}",
                agent.agent.to_string(),
                agent.description,
                if agent.is_available() { "" } else { " (unavailable)" }
            )?;
        }
        let l = &self.learner;
        write!(
            f,
            "  learner: overrides={} preferences={} (confident {}) behavior={} battery={}",
            l.override_records,
            l.learned_preferences,
            l.confident_preferences,
            l.behavior_samples,
            l.battery_samples
        )?;
        if let Some(rate) = l.discharge_rate_per_hour {
            write!(f, " drain={rate:.1}%/h")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UNAVAILABLE_AFTER;
    use vigil_core::AgentId;

    fn activity(agent: AgentId, failures: u32) -> AgentActivity {
        AgentActivity {
            agent,
            description: "holding".into(),
            last_priority: None,
            last_action_count: 0,
            actions_proposed: 0,
            consecutive_failures: failures,
            total_failures: failures as u64,
            last_error: None,
        }
    }

    #[test]
    fn test_display_lists_agents_and_flags_unavailable() {
        let mut snapshot = DiagnosticsSnapshot::idle(LifecycleState::Running);
        snapshot.statistics.total_ticks = 12;
        snapshot.agents = vec![
            activity(AgentId::Thermal, 0),
            activity(AgentId::Display, UNAVAILABLE_AFTER),
        ];
        snapshot.learner.discharge_rate_per_hour = Some(12.5);

        let text = snapshot.to_string();
        assert!(text.starts_with("[Running] ticks=12"));
        assert!(text.contains("Display"));
        assert!(text.contains("(unavailable)"));
        assert!(text.contains("drain=12.5%/h"));
        assert_eq!(snapshot.unavailable_agents().count(), 1);
    }
}
