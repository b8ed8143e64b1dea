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

//! Defines the PowerAgent.

use crate::policy::{summarize, Planner};
use vigil_core::context::{UserIntent, WorkloadType};
use vigil_core::targets::{self, performance_mode};
use vigil_core::{
    Action, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView,
    Priority, Proposal,
};

/// CPU limits paired with each managed performance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLimits {
    /// Long-term limit, watts.
    pub pl1_w: i64,
    /// Short-term limit, watts.
    pub pl2_w: i64,
}

/// Returns the limits programmed alongside `mode`, or `None` for modes the
/// agent leaves alone (`custom`).
pub fn limits_for(mode: &str) -> Option<CpuLimits> {
    match mode {
        performance_mode::QUIET => Some(CpuLimits { pl1_w: 35, pl2_w: 65 }),
        performance_mode::BALANCED => Some(CpuLimits { pl1_w: 55, pl2_w: 115 }),
        performance_mode::PERFORMANCE => Some(CpuLimits { pl1_w: 115, pl2_w: 175 }),
        _ => None,
    }
}

/// Picks the performance mode for a context.
pub fn select_mode(context: &ContextSnapshot) -> &'static str {
    let wants_speed = matches!(context.intent, UserIntent::Gaming | UserIntent::MaxPerformance);
    if context.power.on_battery() {
        return if wants_speed {
            performance_mode::BALANCED
        } else {
            performance_mode::QUIET
        };
    }
    if wants_speed {
        return performance_mode::PERFORMANCE;
    }
    match (context.intent, context.workload) {
        (UserIntent::Quiet | UserIntent::BatterySaving, _) => performance_mode::QUIET,
        (_, WorkloadType::Gaming | WorkloadType::AiWorkload) => performance_mode::PERFORMANCE,
        (_, WorkloadType::Idle) => performance_mode::QUIET,
        _ => performance_mode::BALANCED,
    }
}

/// Drives `PERFORMANCE_MODE`, `CPU_PL1` and `CPU_PL2`.
#[derive(Debug)]
pub struct PowerAgent {
    last_decision: String,
}

impl PowerAgent {
    /// Creates a new power agent.
    pub fn new() -> Self {
        Self {
            last_decision: "not run yet".to_string(),
        }
    }
}

impl Default for PowerAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for PowerAgent {
    fn id(&self) -> AgentId {
        AgentId::Power
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let mut mode = select_mode(context);
        // Limits follow the mode the user settled on, not just ours.
        if let Some(learned) = preferences
            .respected(targets::PERFORMANCE_MODE, &context.signature())
            .and_then(|v| v.as_text())
        {
            if let Some(known) = performance_mode::ALL.iter().find(|m| **m == learned) {
                mode = *known;
            }
        }
        let mut plan = Planner::new(self.id(), context, preferences);
        plan.escalate(
            if matches!(context.intent, UserIntent::Gaming | UserIntent::MaxPerformance) {
                Priority::High
            } else {
                Priority::Medium
            },
        );

        let why = format!(
            "{} on {}, {:?}",
            mode, context.power.source, context.workload
        );
        plan.suggest(Action::proactive(targets::PERFORMANCE_MODE, mode, &why), None);
        if let Some(limits) = limits_for(mode) {
            plan.suggest(Action::proactive(targets::CPU_PL1, limits.pl1_w, &why), None);
            plan.suggest(Action::proactive(targets::CPU_PL2, limits.pl2_w, &why), None);
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        self.last_decision = summarize(&format!("wants {mode}"), &proposal, &respected);
        Ok(proposal)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        if let Some(outcome) = result.outcome_for(targets::PERFORMANCE_MODE) {
            if !outcome.is_applied() {
                log::warn!(
                    "PowerAgent: performance mode {} not applied ({:?})",
                    outcome.action.value,
                    outcome.status
                );
            }
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
    use vigil_core::ActionValue;

    fn context(source: PowerSource, workload: WorkloadType, intent: UserIntent) -> ContextSnapshot {
        let mut ctx = ContextSnapshot::default();
        ctx.power.source = source;
        ctx.workload = workload;
        ctx.intent = intent;
        ctx.power.performance_mode = performance_mode::BALANCED.to_string();
        ctx.power.limits.cpu_pl1_w = 55.0;
        ctx.power.limits.cpu_pl2_w = 115.0;
        ctx
    }

    #[test]
    fn test_mode_selection_table() {
        use PowerSource::*;
        let cases = [
            (Battery, WorkloadType::Gaming, UserIntent::Gaming, performance_mode::BALANCED),
            (Battery, WorkloadType::Productivity, UserIntent::Balanced, performance_mode::QUIET),
            (Ac, WorkloadType::Productivity, UserIntent::MaxPerformance, performance_mode::PERFORMANCE),
            (Ac, WorkloadType::Gaming, UserIntent::Quiet, performance_mode::QUIET),
            (Ac, WorkloadType::AiWorkload, UserIntent::Balanced, performance_mode::PERFORMANCE),
            (Ac, WorkloadType::Idle, UserIntent::Balanced, performance_mode::QUIET),
            (Ac, WorkloadType::Mixed, UserIntent::Productivity, performance_mode::BALANCED),
        ];
        for (source, workload, intent, expected) in cases {
            assert_eq!(
                select_mode(&context(source, workload, intent)),
                expected,
                "{source:?} {workload:?} {intent:?}"
            );
        }
    }

    #[test]
    fn test_gaming_on_ac_is_high_priority_performance() {
        let ctx = context(PowerSource::Ac, WorkloadType::Gaming, UserIntent::Gaming);
        let proposal = PowerAgent::new().propose(&ctx, &PreferenceView::new(0.6)).unwrap();
        assert_eq!(proposal.priority, Priority::High);
        assert_eq!(proposal.actions.len(), 3);
        assert_eq!(proposal.actions[0].value, ActionValue::from("performance"));
        assert_eq!(proposal.actions[2].value, ActionValue::Int(175));
    }

    #[test]
    fn test_nothing_to_do_when_already_balanced() {
        let ctx = context(PowerSource::Ac, WorkloadType::Productivity, UserIntent::Balanced);
        let mut agent = PowerAgent::new();
        let proposal = agent.propose(&ctx, &PreferenceView::new(0.6)).unwrap();
        assert!(proposal.is_empty());
        assert_eq!(proposal.priority, Priority::Low);
        assert!(agent.describe().starts_with("wants balanced: no change"));
    }

    #[test]
    fn test_learned_mode_replaces_choice() {
        let ctx = context(PowerSource::Battery, WorkloadType::Productivity, UserIntent::Balanced);
        let mut prefs = PreferenceView::new(0.6);
        prefs.insert(
            targets::PERFORMANCE_MODE,
            ctx.signature(),
            ActionValue::from("balanced"),
            0.8,
        );
        let mut agent = PowerAgent::new();
        let proposal = agent.propose(&ctx, &prefs).unwrap();
        assert!(proposal.is_empty());
        assert!(agent.describe().contains("respecting PERFORMANCE_MODE=balanced"));

        prefs.insert(
            targets::PERFORMANCE_MODE,
            ctx.signature(),
            ActionValue::from("performance"),
            0.8,
        );
        let proposal = agent.propose(&ctx, &prefs).unwrap();
        let values: Vec<_> = proposal.actions.iter().map(|a| a.value.clone()).collect();
        assert_eq!(
            values,
            vec![ActionValue::from("performance"), ActionValue::Int(115), ActionValue::Int(175)]
        );
    }
}
