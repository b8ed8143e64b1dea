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

//! Defines the BatteryAgent.

use crate::policy::{summarize, Planner};
use vigil_core::config::PolicyConfig;
use vigil_core::targets::{self, performance_mode};
use vigil_core::{
    Action, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView,
    Priority, Proposal,
};

/// Discharge rate above which the agent asks for the quiet profile, %/h.
pub const HIGH_DRAIN_PER_HOUR: f32 = 25.0;
/// CPU short-term limit forced at critical charge.
pub const CRITICAL_PL2_W: i64 = 45;
/// Charge above which conservation is worth turning on while plugged in.
pub const CONSERVATION_FROM_PERCENT: f32 = 80.0;

/// Watches charge level and discharge rate.
#[derive(Debug)]
pub struct BatteryAgent {
    critical_percent: f32,
    last_decision: String,
}

impl BatteryAgent {
    /// Creates a battery agent using the configured critical level.
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            critical_percent: policy.critical_battery_percent,
            last_decision: "not run yet".to_string(),
        }
    }
}

impl Agent for BatteryAgent {
    fn id(&self) -> AgentId {
        AgentId::Battery
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let power = &context.power;
        if !(0.0..=100.0).contains(&power.battery_percent) {
            return Err(AgentError::failed(
                self.id(),
                format!("battery level {} out of range", power.battery_percent),
            ));
        }

        let drain = preferences.battery_drain_per_hour();
        let mut plan = Planner::new(self.id(), context, preferences);

        if power.on_battery() && power.battery_percent <= self.critical_percent {
            plan.escalate(Priority::Critical);
            let why = format!("battery critical at {:.0}%", power.battery_percent);
            plan.enforce(
                Action::proactive(targets::PERFORMANCE_MODE, performance_mode::QUIET, &why),
                None,
            );
            plan.enforce(Action::proactive(targets::CPU_PL2, CRITICAL_PL2_W, &why), None);
        } else if power.on_battery() {
            if let Some(rate) = drain.filter(|r| *r > HIGH_DRAIN_PER_HOUR) {
                plan.escalate(Priority::Medium);
                plan.suggest(
                    Action::proactive(
                        targets::PERFORMANCE_MODE,
                        performance_mode::QUIET,
                        format!("draining {rate:.1}%/h"),
                    ),
                    None,
                );
            }
        } else if power.battery_percent >= CONSERVATION_FROM_PERCENT {
            plan.suggest(
                Action::opportunistic(
                    targets::BATTERY_CONSERVATION,
                    true,
                    "plugged in and charged, cap the charge",
                ),
                None,
            );
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        let mut headline = format!("{:.0}% on {}", power.battery_percent, power.source);
        if let Some(rate) = drain {
            headline.push_str(&format!(", {rate:.1}%/h"));
        }
        self.last_decision = summarize(&headline, &proposal, &respected);
        Ok(proposal)
    }

    fn on_executed(&mut self, _result: &ExecutionResult) {}

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}
