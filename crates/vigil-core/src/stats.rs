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

//! Cumulative orchestrator counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters owned by the orchestrator, persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorStatistics {
    /// Completed pipeline runs, scheduled and out-of-cycle.
    pub total_ticks: u64,
    /// Actions that remained applied after their batch.
    pub total_actions_executed: u64,
    /// Targets that needed an arbitration decision.
    pub total_conflicts_resolved: u64,
    /// Actions rejected by the safety validator.
    pub total_safety_violations: u64,
    /// Actions clamped by the safety validator.
    pub total_adjustments: u64,
    /// Batches that failed and were rolled back.
    pub total_failed_batches: u64,
    /// Agent calls that failed, panicked or timed out.
    pub total_agent_failures: u64,
    /// User overrides recorded by the learner.
    pub total_overrides: u64,
    /// Scheduled ticks skipped because the previous run overran.
    pub ticks_skipped: u64,
    /// Out-of-cycle runs executed.
    pub reoptimizations_run: u64,
    /// Out-of-cycle requests dropped because a run was in progress.
    pub reoptimizations_dropped: u64,
    /// First time the orchestrator was ever started.
    pub first_started_at: Option<DateTime<Utc>>,
    /// Total running time across all sessions, in seconds.
    pub cumulative_uptime_secs: u64,
}

impl OrchestratorStatistics {
    /// Marks the first start if it was never recorded.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        if self.first_started_at.is_none() {
            self.first_started_at = Some(now);
        }
    }
}
