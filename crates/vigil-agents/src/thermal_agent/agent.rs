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

//! Defines the ThermalAgent.

use crate::policy::{summarize, Planner};
use vigil_core::config::PolicyConfig;
use vigil_core::context::{ThermalStatus, ThermalTrend};
use vigil_core::targets;
use vigil_core::{
    Action, ActionValue, Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult,
    PreferenceView, Priority, Proposal,
};

/// Fan duty during a thermal emergency.
pub const EMERGENCY_FAN_PERCENT: i64 = 100;
/// Fan duty while throttling.
pub const THROTTLING_FAN_PERCENT: i64 = 85;
/// Fan duty when pre-cooling a warming machine.
pub const PRECOOL_FAN_PERCENT: i64 = 70;
/// CPU short-term limit forced during an emergency.
pub const EMERGENCY_PL2_W: i64 = 65;
/// GPU power forced during an emergency.
pub const EMERGENCY_TGP_W: i64 = 60;
/// How far PL2 is lowered per tick while throttling.
pub const THROTTLE_STEP_W: i64 = 15;
/// Lowest PL2 the throttle step goes to.
pub const THROTTLE_FLOOR_W: i64 = 45;

/// Watches temperatures and trends.
#[derive(Debug)]
pub struct ThermalAgent {
    emergency_c: f32,
    /// Fan duty last applied by anyone, `None` if never changed this session.
    fan_percent: Option<ActionValue>,
    last_status: ThermalStatus,
    last_decision: String,
}

impl ThermalAgent {
    /// Creates a thermal agent using the configured emergency threshold.
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            emergency_c: policy.thermal_emergency_c,
            fan_percent: None,
            last_status: ThermalStatus::Cool,
            last_decision: "not run yet".to_string(),
        }
    }

    /// Classification from the last tick.
    pub fn last_status(&self) -> ThermalStatus {
        self.last_status
    }
}

impl Agent for ThermalAgent {
    fn id(&self) -> AgentId {
        AgentId::Thermal
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        let reading = &context.thermal;
        let hottest = reading.hottest();
        if !hottest.is_finite() {
            return Err(AgentError::failed(
                self.id(),
                format!("unreadable temperature {hottest}"),
            ));
        }

        let status = reading.status(self.emergency_c);
        let fan = self.fan_percent.clone();
        let mut plan = Planner::new(self.id(), context, preferences);

        match status {
            ThermalStatus::Critical => {
                plan.escalate(Priority::Critical);
                let why = format!("thermal emergency at {hottest:.0}°C");
                plan.enforce(
                    Action::proactive(targets::FAN_SPEED, EMERGENCY_FAN_PERCENT, &why),
                    fan,
                );
                plan.enforce(Action::proactive(targets::CPU_PL2, EMERGENCY_PL2_W, &why), None);
                plan.enforce(Action::proactive(targets::GPU_TGP, EMERGENCY_TGP_W, &why), None);
            }
            ThermalStatus::Throttling => {
                plan.escalate(Priority::High);
                let why = format!("throttling at {hottest:.0}°C");
                plan.suggest(
                    Action::proactive(targets::FAN_SPEED, THROTTLING_FAN_PERCENT, &why),
                    fan,
                );
                if reading.trend != ThermalTrend::Falling {
                    let pl2 = context.power.limits.cpu_pl2_w.round() as i64;
                    let lowered = (pl2 - THROTTLE_STEP_W).max(THROTTLE_FLOOR_W);
                    if lowered < pl2 {
                        plan.suggest(Action::proactive(targets::CPU_PL2, lowered, &why), None);
                    }
                }
            }
            ThermalStatus::Warm if reading.trend == ThermalTrend::Rising => {
                plan.escalate(Priority::Medium);
                plan.suggest(
                    Action::opportunistic(
                        targets::FAN_SPEED,
                        PRECOOL_FAN_PERCENT,
                        format!("pre-cooling, {hottest:.0}°C and rising"),
                    ),
                    fan,
                );
            }
            ThermalStatus::Cool => {
                // Hand the fans back once we stop needing them.
                let raised = fan
                    .as_ref()
                    .and_then(ActionValue::as_f64)
                    .is_some_and(|duty| duty > 0.0);
                if raised {
                    plan.suggest(
                        Action::opportunistic(targets::FAN_SPEED, 0, "cool again, firmware fan curve"),
                        fan,
                    );
                }
            }
            ThermalStatus::Warm => {}
        }

        if status != self.last_status {
            log::info!(
                "ThermalAgent: {:?} → {:?} ({:.0}°C, {:?})",
                self.last_status,
                status,
                hottest,
                reading.trend
            );
        }
        self.last_status = status;

        let respected = plan.respected().to_vec();
        let proposal = plan.finish();
        self.last_decision = summarize(
            &format!("{status:?} {hottest:.0}°C {:?}", reading.trend),
            &proposal,
            &respected,
        );
        Ok(proposal)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        if let Some(outcome) = result.outcome_for(targets::FAN_SPEED) {
            if outcome.is_applied() {
                self.fan_percent = Some(outcome.action.value.clone());
            }
        }
    }

    fn describe(&self) -> String {
        self.last_decision.clone()
    }
}
