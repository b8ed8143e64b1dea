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

//! Per-tick execution results.

use crate::action::{Action, ActionValue};
use crate::agent::AgentId;

/// What happened to one action of the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// Applied and still in effect.
    Applied,
    /// The handler refused or errored. Nothing was changed for this target.
    Failed(String),
    /// Was applied, then restored because a later action failed.
    RolledBack,
    /// Was applied, restoration was attempted and failed.
    RollbackFailed(String),
}

/// Result for a single action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// Agent that proposed the action.
    pub agent: AgentId,
    /// The action as executed (after safety adjustment).
    pub action: Action,
    /// Final status after the whole batch has run.
    pub status: OutcomeStatus,
    /// Value reported by the handler before the change, used for rollback.
    pub previous: Option<ActionValue>,
}

impl ActionOutcome {
    /// Returns `true` if the action is in effect after the batch.
    pub fn is_applied(&self) -> bool {
        self.status == OutcomeStatus::Applied
    }
}

/// Result of executing one resolved action set.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// One entry per attempted action, in execution order.
    pub outcomes: Vec<ActionOutcome>,
    /// `false` as soon as any action failed.
    pub success: bool,
    /// Actions successfully restored to their previous value.
    pub rolled_back: Vec<Action>,
    /// Actions never issued because the batch stopped early.
    pub skipped: Vec<Action>,
}

impl ExecutionResult {
    /// Result of an empty batch.
    pub fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            success: true,
            rolled_back: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Outcomes still in effect.
    pub fn applied(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| o.is_applied())
    }

    /// Outcomes that failed to apply.
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed(_)))
    }

    /// Number of actions in effect.
    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    /// Returns the outcome for `target`, if it was attempted.
    pub fn outcome_for(&self, target: &str) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.action.target == target)
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::empty()
    }
}
