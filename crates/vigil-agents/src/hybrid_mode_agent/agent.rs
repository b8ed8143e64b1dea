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

//! Defines the HybridModeAgent.

use crate::policy::{summarize, Planner};
use vigil_core::context::UserIntent;
use vigil_core::targets::{self, hybrid_mode};
use vigil_core::{
    Action, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView,
    Proposal,
};

/// Picks the graphics mode a context calls for.
pub fn preferred_mode(context: &ContextSnapshot) -> &'static str {
    let wants_speed = matches!(context.intent, UserIntent::Gaming | UserIntent::MaxPerformance);
    if !context.power.on_battery() && wants_speed {
        hybrid_mode::DISCRETE
    } else {
        hybrid_mode::HYBRID
    }
}

/// Drives `HYBRID_MODE`.
#[derive(Debug)]
pub struct HybridModeAgent {
    pending_restart: bool,
    last_decision: String,
}

impl HybridModeAgent {
    /// Creates a new hybrid mode agent.
    pub fn new() -> Self {
        Self {
            pending_restart: false,
            last_decision: "not run yet".to_string(),
        }
    }

    /// Whether a mode change was applied and waits for a restart.
    pub fn pending_restart(&self) -> bool {
        self.pending_restart
    }
}

impl Default for HybridModeAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for HybridModeAgent {
    fn id(&self) -> AgentId {
        AgentId::HybridMode
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let wanted = preferred_mode(context);
        let current = context.gpu.mode.as_str();
        let mut plan = Planner::new(self.id(), context, preferences);

        // Pulling the dGPU from under running processes kills them.
        let pinned = current == hybrid_mode::DISCRETE && !context.gpu.active_processes.is_empty();
        if !pinned && !self.pending_restart {
            plan.suggest(
                Action::opportunistic(
                    targets::HYBRID_MODE,
                    wanted,
                    format!("{} on {}", wanted, context.power.source),
                )
                .with_parameter("requires_restart", "true"),
                None,
            );
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        let mut headline = format!("mode {current}");
        if pinned {
            headline.push_str(", dGPU in use");
        }
        if self.pending_restart {
            headline.push_str(", restart pending");
        }
        self.last_decision = summarize(&headline, &proposal, &respected);
        Ok(proposal)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        if let Some(outcome) = result.outcome_for(targets::HYBRID_MODE) {
            if outcome.is_applied() {
                log::info!(
                    "HybridModeAgent: switched to {}, effective after restart",
                    outcome.action.value
                );
                self.pending_restart = true;
            }
        }
    }

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}
