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

//! Defines the GpuAgent.

use crate::policy::{summarize, Planner};
use vigil_core::context::WorkloadType;
use vigil_core::targets;
use vigil_core::{
    Action, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView,
    Priority, Proposal,
};

/// Full TGP for GPU-heavy work on AC.
pub const TGP_FULL_W: i64 = 140;
/// TGP for GPU-heavy work on battery and for everyday work.
pub const TGP_MODERATE_W: i64 = 100;
/// TGP when the dGPU has nothing to do.
pub const TGP_IDLE_W: i64 = 60;

/// Drives `GPU_TGP`.
#[derive(Debug)]
pub struct GpuAgent {
    last_decision: String,
    last_tgp_failure: Option<String>,
}

impl GpuAgent {
    /// Creates a new GPU agent.
    pub fn new() -> Self {
        Self {
            last_decision: "not run yet".to_string(),
            last_tgp_failure: None,
        }
    }
}

impl Default for GpuAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for GpuAgent {
    fn id(&self) -> AgentId {
        AgentId::Gpu
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let gpu = &context.gpu;
        let mut plan = Planner::new(self.id(), context, preferences);

        match context.workload {
            WorkloadType::Gaming | WorkloadType::AiWorkload => {
                plan.escalate(Priority::High);
                let tgp = if context.power.on_battery() {
                    TGP_MODERATE_W
                } else {
                    TGP_FULL_W
                };
                let action = Action::proactive(
                    targets::GPU_TGP,
                    tgp,
                    format!("{:?} workload on {}", context.workload, context.power.source),
                )
                .with_processes(gpu.active_processes.clone());
                plan.suggest(action, None);
            }
            _ if gpu.is_idle() => {
                plan.suggest(
                    Action::opportunistic(targets::GPU_TGP, TGP_IDLE_W, "dGPU idle"),
                    None,
                );
            }
            WorkloadType::Productivity | WorkloadType::Mixed => {
                plan.escalate(Priority::Medium);
                plan.suggest(
                    Action::proactive(
                        targets::GPU_TGP,
                        TGP_MODERATE_W,
                        format!("{:?} workload", context.workload),
                    )
                    .with_processes(gpu.active_processes.clone()),
                    None,
                );
            }
            WorkloadType::Idle | WorkloadType::Unknown => {}
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        let mut headline = format!("{:.0}% busy", gpu.utilization_percent);
        if let Some(failure) = &self.last_tgp_failure {
            headline.push_str(&format!(", last TGP change failed: {failure}"));
        }
        self.last_decision = summarize(&headline, &proposal, &respected);
        Ok(proposal)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        if let Some(outcome) = result.outcome_for(targets::GPU_TGP) {
            self.last_tgp_failure = if outcome.is_applied() {
                None
            } else {
                Some(format!("{:?}", outcome.status))
            };
        }
    }

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::context::PowerSource;
    use vigil_core::{ActionKind, ActionValue};

    fn context(workload: WorkloadType, processes: &[&str]) -> ContextSnapshot {
        let mut ctx = ContextSnapshot::default();
        ctx.workload = workload;
        ctx.power.limits.gpu_tgp_w = 80.0;
        ctx.gpu.active_processes = processes.iter().map(|p| p.to_string()).collect();
        ctx.gpu.utilization_percent = if processes.is_empty() { 0.0 } else { 70.0 };
        ctx
    }

    #[test]
    fn test_gaming_gets_full_tgp_on_ac_and_moderate_on_battery() {
        let prefs = PreferenceView::new(0.6);
        let mut ctx = context(WorkloadType::Gaming, &["game.exe"]);
        let proposal = GpuAgent::new().propose(&ctx, &prefs).unwrap();
        assert_eq!(proposal.priority, Priority::High);
        assert_eq!(proposal.actions[0].value, ActionValue::Int(140));
        assert_eq!(proposal.actions[0].affected_processes, vec!["game.exe".to_string()]);

        ctx.power.source = PowerSource::Battery;
        let proposal = GpuAgent::new().propose(&ctx, &prefs).unwrap();
        assert_eq!(proposal.actions[0].value, ActionValue::Int(100));
    }

    #[test]
    fn test_idle_gpu_is_opportunistic_low() {
        let proposal = GpuAgent::new()
            .propose(&context(WorkloadType::Productivity, &[]), &PreferenceView::new(0.6))
            .unwrap();
        assert_eq!(proposal.priority, Priority::Low);
        assert_eq!(proposal.actions[0].kind, ActionKind::Opportunistic);
        assert_eq!(proposal.actions[0].value, ActionValue::Int(60));
    }

    #[test]
    fn test_busy_productivity_is_medium() {
        let proposal = GpuAgent::new()
            .propose(&context(WorkloadType::Mixed, &["blender"]), &PreferenceView::new(0.6))
            .unwrap();
        assert_eq!(proposal.priority, Priority::Medium);
        assert_eq!(proposal.actions[0].value, ActionValue::Int(100));
    }

    #[test]
    fn test_unknown_busy_workload_abstains() {
        let proposal = GpuAgent::new()
            .propose(&context(WorkloadType::Unknown, &["something"]), &PreferenceView::new(0.6))
            .unwrap();
        assert!(proposal.is_empty());
    }
}
