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

//! Defines the KeyboardLightAgent.

use crate::policy::{summarize, Planner};
use vigil_core::config::PolicyConfig;
use vigil_core::targets::{self, rgb_mode};
use vigil_core::{
    Action, ActionValue, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult,
    PreferenceView, Priority, Proposal,
};

/// Backlight ceiling on battery, percent.
pub const BATTERY_BACKLIGHT_PERCENT: f32 = 30.0;

/// Drives `KEYBOARD_BACKLIGHT` and `RGB_MODE`.
#[derive(Debug)]
pub struct KeyboardLightAgent {
    critical_percent: f32,
    /// Last RGB effect applied by anyone.
    rgb_current: Option<ActionValue>,
    /// Effect that was active before this agent switched lighting off.
    rgb_restore: Option<ActionValue>,
    last_decision: String,
}

impl KeyboardLightAgent {
    /// Creates a keyboard light agent using the configured critical level.
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            critical_percent: policy.critical_battery_percent,
            rgb_current: None,
            rgb_restore: None,
            last_decision: "not run yet".to_string(),
        }
    }
}

impl Agent for KeyboardLightAgent {
    fn id(&self) -> AgentId {
        AgentId::KeyboardLight
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let power = &context.power;
        let backlight = context.lighting.keyboard_backlight_percent;
        let rgb = self.rgb_current.clone();
        let mut plan = Planner::new(self.id(), context, preferences);

        if power.on_battery() && power.battery_percent <= self.critical_percent {
            plan.escalate(Priority::Medium);
            let why = format!("battery critical at {:.0}%", power.battery_percent);
            plan.enforce(Action::proactive(targets::KEYBOARD_BACKLIGHT, 0, &why), None);
            plan.enforce(Action::proactive(targets::RGB_MODE, rgb_mode::OFF, &why), rgb);
        } else if power.on_battery() {
            if backlight > BATTERY_BACKLIGHT_PERCENT {
                plan.suggest(
                    Action::opportunistic(
                        targets::KEYBOARD_BACKLIGHT,
                        BATTERY_BACKLIGHT_PERCENT as i64,
                        "on battery",
                    ),
                    None,
                );
            } else {
                plan.follow_preference(targets::KEYBOARD_BACKLIGHT, "learned backlight");
            }
            plan.suggest(
                Action::opportunistic(targets::RGB_MODE, rgb_mode::OFF, "on battery"),
                rgb,
            );
        } else {
            if let Some(previous) = self.rgb_restore.clone() {
                plan.suggest(
                    Action::opportunistic(targets::RGB_MODE, previous, "back on AC"),
                    rgb,
                );
            }
            plan.follow_preference(targets::KEYBOARD_BACKLIGHT, "learned backlight");
        }

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        let effect = self
            .rgb_current
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        self.last_decision = summarize(
            &format!("backlight {backlight:.0}%, rgb {effect}"),
            &proposal,
            &respected,
        );
        Ok(proposal)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        let Some(outcome) = result.outcome_for(targets::RGB_MODE) else {
            return;
        };
        if !outcome.is_applied() {
            return;
        }
        let applied = outcome.action.value.clone();
        let turned_off = applied.as_text() == Some(rgb_mode::OFF);
        if turned_off && outcome.agent == AgentId::KeyboardLight {
            if let Some(previous) = &outcome.previous {
                if previous.as_text() != Some(rgb_mode::OFF) && self.rgb_restore.is_none() {
                    self.rgb_restore = Some(previous.clone());
                }
            }
        } else if !turned_off {
            self.rgb_restore = None;
        }
        self.rgb_current = Some(applied);
    }

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::context::PowerSource;
    use vigil_core::{ActionOutcome, OutcomeStatus};

    fn context(source: PowerSource, percent: f32, backlight: f32) -> ContextSnapshot {
        let mut ctx = ContextSnapshot::default();
        ctx.power.source = source;
        ctx.power.battery_percent = percent;
        ctx.lighting.keyboard_backlight_percent = backlight;
        ctx
    }

    fn agent() -> KeyboardLightAgent {
        KeyboardLightAgent::new(&PolicyConfig::default())
    }

    fn rgb_applied(value: &str, previous: &str) -> ExecutionResult {
        let mut result = ExecutionResult::empty();
        result.outcomes.push(ActionOutcome {
            agent: AgentId::KeyboardLight,
            action: Action::opportunistic(targets::RGB_MODE, value, "test"),
            status: OutcomeStatus::Applied,
            previous: Some(ActionValue::from(previous)),
        });
        result
    }

    #[test]
    fn test_critical_battery_turns_lighting_off() {
        let proposal = agent()
            .propose(&context(PowerSource::Battery, 10.0, 80.0), &PreferenceView::new(0.6))
            .unwrap();
        assert_eq!(proposal.priority, Priority::Medium);
        assert_eq!(proposal.actions[0].value, ActionValue::Int(0));
        assert_eq!(proposal.actions[1].value, ActionValue::from("off"));
    }

    #[test]
    fn test_battery_dims_backlight() {
        let proposal = agent()
            .propose(&context(PowerSource::Battery, 60.0, 80.0), &PreferenceView::new(0.6))
            .unwrap();
        assert_eq!(proposal.priority, Priority::Low);
        assert_eq!(proposal.actions[0].value, ActionValue::Int(30));
    }

    #[test]
    fn test_rgb_effect_is_restored_on_ac() {
        let mut agent = agent();
        let prefs = PreferenceView::new(0.6);
        agent.on_executed(&rgb_applied("off", "rainbow"));

        let on_battery = agent
            .propose(&context(PowerSource::Battery, 60.0, 20.0), &prefs)
            .unwrap();
        assert!(on_battery.is_empty());

        let on_ac = agent.propose(&context(PowerSource::Ac, 60.0, 20.0), &prefs).unwrap();
        assert_eq!(on_ac.actions[0].value, ActionValue::from("rainbow"));

        agent.on_executed(&rgb_applied("rainbow", "off"));
        assert!(agent
            .propose(&context(PowerSource::Ac, 60.0, 20.0), &prefs)
            .unwrap()
            .is_empty());
        assert!(agent.describe().contains("rgb rainbow"));
    }
}
