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

//! Shared proposal-building rules.
//!
//! Every agent builds its proposal through a [`Planner`], which applies the
//! override policy uniformly:
//!
//! - [`Planner::suggest`] is for ordinary tuning. If the user has a confident
//!   learned preference for the target in the current context, the learned
//!   value replaces the agent's value, or the agent abstains when the target
//!   already holds it.
//! - [`Planner::enforce`] is for hard safety conditions (thermal emergency,
//!   critical battery). Preferences are ignored.
//!
//! Both skip actions that would not change anything.

use vigil_core::targets;
use vigil_core::{
    Action, ActionValue, AgentId, ContextSignature, ContextSnapshot, PreferenceView, Priority,
    Proposal,
};

/// Reads the value a target currently holds, as far as the snapshot tells.
///
/// Targets the snapshot does not cover (fan duty, RGB effect, TjMax) return
/// `None`; agents track those from execution feedback instead.
pub fn current_value(context: &ContextSnapshot, target: &str) -> Option<ActionValue> {
    let watts = |w: f32| Some(ActionValue::Int(w.round() as i64));
    match target {
        targets::CPU_PL1 => watts(context.power.limits.cpu_pl1_w),
        targets::CPU_PL2 => watts(context.power.limits.cpu_pl2_w),
        targets::GPU_TGP => watts(context.power.limits.gpu_tgp_w),
        targets::PERFORMANCE_MODE => Some(ActionValue::from(context.power.performance_mode.as_str())),
        targets::BATTERY_CONSERVATION => Some(ActionValue::Bool(context.power.conservation_mode)),
        targets::DISPLAY_REFRESH_RATE => Some(ActionValue::Int(context.display.refresh_rate_hz as i64)),
        targets::DISPLAY_BRIGHTNESS => {
            Some(ActionValue::Int(context.display.brightness_percent.round() as i64))
        }
        targets::KEYBOARD_BACKLIGHT => Some(ActionValue::Int(
            context.lighting.keyboard_backlight_percent.round() as i64,
        )),
        targets::HYBRID_MODE => Some(ActionValue::from(context.gpu.mode.as_str())),
        _ => None,
    }
}

/// Accumulates one tick's proposal for an agent.
pub struct Planner<'a> {
    proposal: Proposal,
    context: &'a ContextSnapshot,
    preferences: &'a PreferenceView,
    signature: ContextSignature,
    respected: Vec<String>,
}

impl<'a> Planner<'a> {
    /// Starts an empty proposal.
    pub fn new(
        agent: AgentId,
        context: &'a ContextSnapshot,
        preferences: &'a PreferenceView,
    ) -> Self {
        Self {
            proposal: Proposal::empty(agent),
            context,
            preferences,
            signature: context.signature(),
            respected: Vec::new(),
        }
    }

    /// Raises the proposal's priority.
    pub fn escalate(&mut self, priority: Priority) {
        self.proposal.escalate(priority);
    }

    /// Proposes a tuning change that yields to learned preferences.
    ///
    /// `current` overrides the snapshot lookup for targets the snapshot does
    /// not cover.
    pub fn suggest(&mut self, mut action: Action, current: Option<ActionValue>) {
        let current = current.or_else(|| current_value(self.context, &action.target));

        if let Some(learned) = self.preferences.respected(&action.target, &self.signature) {
            if current.as_ref().is_some_and(|c| c.same_as(learned)) {
                self.respected
                    .push(format!("{}={}", action.target, learned));
                return;
            }
            if !learned.same_as(&action.value) {
                action.reason = format!(
                    "{} (following learned preference {} over {})",
                    action.reason, learned, action.value
                );
                action.value = learned.clone();
            }
        }
        self.push_if_changed(action, current);
    }

    /// Proposes the learned value for `target` if one is respected and the
    /// target does not already hold it. Used by agents with no opinion of their
    /// own about a target.
    pub fn follow_preference(&mut self, target: &str, reason: &str) {
        let Some(learned) = self.preferences.respected(target, &self.signature) else {
            return;
        };
        let current = current_value(self.context, target);
        if current.as_ref().is_some_and(|c| c.same_as(learned)) {
            return;
        }
        let action = Action::opportunistic(target, learned.clone(), reason);
        self.proposal.push(action);
    }

    /// Proposes a safety change regardless of learned preferences.
    pub fn enforce(&mut self, action: Action, current: Option<ActionValue>) {
        let current = current.or_else(|| current_value(self.context, &action.target));
        self.push_if_changed(action, current);
    }

    fn push_if_changed(&mut self, action: Action, current: Option<ActionValue>) {
        if current.is_some_and(|c| c.same_as(&action.value)) {
            return;
        }
        self.proposal.push(action);
    }

    /// Targets the agent left alone because of a learned preference.
    pub fn respected(&self) -> &[String] {
        &self.respected
    }

    /// Finishes the proposal. An empty proposal always has `Low` priority.
    pub fn finish(self) -> Proposal {
        let mut proposal = self.proposal;
        if proposal.is_empty() {
            proposal.priority = Priority::Low;
        }
        proposal
    }
}

/// One-line summary used by `describe()`.
pub fn summarize(headline: &str, proposal: &Proposal, respected: &[String]) -> String {
    let mut line = if proposal.is_empty() {
        format!("{headline}: no change")
    } else {
        let changes: Vec<String> = proposal
            .actions
            .iter()
            .map(|a| format!("{}={}", a.target, a.value))
            .collect();
        format!("{headline}: {:?} {}", proposal.priority, changes.join(", "))
    };
    if !respected.is_empty() {
        line.push_str(&format!(" (respecting {})", respected.join(", ")));
    }
    line
}
