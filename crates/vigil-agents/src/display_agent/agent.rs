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

//! Defines the DisplayAgent.

use crate::policy::{summarize, Planner};
use vigil_core::config::PolicyConfig;
use vigil_core::targets;
use vigil_core::{
    Action, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView,
    Priority, Proposal,
};

/// Lowest panel refresh rate.
pub const LOW_REFRESH_HZ: i64 = 60;
/// Native panel refresh rate.
pub const HIGH_REFRESH_HZ: i64 = 165;
/// Brightness ceiling on battery.
pub const BATTERY_BRIGHTNESS_PERCENT: f32 = 50.0;
/// Brightness ceiling at critical charge.
pub const CRITICAL_BRIGHTNESS_PERCENT: f32 = 40.0;

/// Drives `DISPLAY_REFRESH_RATE` and `DISPLAY_BRIGHTNESS`.
#[derive(Debug)]
pub struct DisplayAgent {
    critical_percent: f32,
    last_decision: String,
}

impl DisplayAgent {
    /// Creates a display agent using the configured critical battery level.
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            critical_percent: policy.critical_battery_percent,
            last_decision: "not run yet".to_string(),
        }
    }
}

impl Agent for DisplayAgent {
    fn id(&self) -> AgentId {
        AgentId::Display
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let display = &context.display;
        let power = &context.power;
        let mut plan = Planner::new(self.id(), context, preferences);

        if power.on_battery() && power.battery_percent <= self.critical_percent {
            plan.escalate(Priority::High);
            let why = format!("battery critical at {:.0}%", power.battery_percent);
            plan.enforce(
                Action::proactive(targets::DISPLAY_REFRESH_RATE, LOW_REFRESH_HZ, &why),
                None,
            );
            if display.brightness_percent > CRITICAL_BRIGHTNESS_PERCENT {
                plan.enforce(
                    Action::proactive(
                        targets::DISPLAY_BRIGHTNESS,
                        CRITICAL_BRIGHTNESS_PERCENT as i64,
                        &why,
                    ),
                    None,
                );
            }
        } else if power.on_battery() {
            plan.escalate(Priority::Medium);
            plan.suggest(
                Action::opportunistic(targets::DISPLAY_REFRESH_RATE, LOW_REFRESH_HZ, "on battery"),
                None,
            );
            if display.brightness_percent > BATTERY_BRIGHTNESS_PERCENT {
                plan.suggest(
                    Action::opportunistic(
                        targets::DISPLAY_BRIGHTNESS,
                        BATTERY_BRIGHTNESS_PERCENT as i64,
                        "on battery",
                    ),
                    None,
                );
            } else {
                plan.follow_preference(targets::DISPLAY_BRIGHTNESS, "learned brightness");
            }
        } else {
            plan.suggest(
                Action::opportunistic(targets::DISPLAY_REFRESH_RATE, HIGH_REFRESH_HZ, "on AC"),
                None,
            );
            plan.follow_preference(targets::DISPLAY_BRIGHTNESS, "learned brightness");
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        self.last_decision = summarize(
            &format!(
                "{}Hz at {:.0}%",
                display.refresh_rate_hz, display.brightness_percent
            ),
            &proposal,
            &respected,
        );
        Ok(proposal)
    }

    fn on_executed(&mut self, _result: &ExecutionResult) {}

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}
