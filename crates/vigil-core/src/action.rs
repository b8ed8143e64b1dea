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

//! Proposals and actions exchanged between agents and the control plane.
//!
//! Everything in this module is tick-scoped: an [`Action`] only has meaning
//! inside the cycle that produced it and is never persisted.

use crate::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Urgency attached to a whole proposal.
///
/// The order of variants defines arbitration precedence (last = highest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Nice-to-have tuning.
    #[default]
    Low,
    /// Regular optimization.
    Medium,
    /// Strong opinion, e.g. a performance workload is running.
    High,
    /// Hardware protection. Wins against everything else.
    Critical,
}

/// How strongly an agent wants a specific action applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// The agent is actively driving the target to a new state.
    Proactive,
    /// The agent would change the target only if nobody else needs it.
    Opportunistic,
}

impl ActionKind {
    /// Tie-break rank used by arbitration. Lower wins.
    pub fn precedence(self) -> u8 {
        match self {
            ActionKind::Proactive => 0,
            ActionKind::Opportunistic => 1,
        }
    }
}

/// The value carried by an action. Interpretation is left to the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionValue {
    /// On/off switch.
    Bool(bool),
    /// Integral quantity (watts, percent, hertz, ...).
    Int(i64),
    /// Fractional quantity.
    Float(f64),
    /// Named mode.
    Text(String),
}

impl ActionValue {
    /// Returns the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ActionValue::Int(v) => Some(*v as f64),
            ActionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ActionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ActionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for `Int` and `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ActionValue::Int(_) | ActionValue::Float(_))
    }

    /// Equality that treats `Int(70)` and `Float(70.0)` as the same setting.
    pub fn same_as(&self, other: &ActionValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionValue::Bool(v) => write!(f, "{v}"),
            ActionValue::Int(v) => write!(f, "{v}"),
            ActionValue::Float(v) => write!(f, "{v:.2}"),
            ActionValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ActionValue {
    fn from(value: bool) -> Self {
        ActionValue::Bool(value)
    }
}

impl From<i64> for ActionValue {
    fn from(value: i64) -> Self {
        ActionValue::Int(value)
    }
}

impl From<i32> for ActionValue {
    fn from(value: i32) -> Self {
        ActionValue::Int(value as i64)
    }
}

impl From<u32> for ActionValue {
    fn from(value: u32) -> Self {
        ActionValue::Int(value as i64)
    }
}

impl From<f64> for ActionValue {
    fn from(value: f64) -> Self {
        ActionValue::Float(value)
    }
}

impl From<f32> for ActionValue {
    fn from(value: f32) -> Self {
        ActionValue::Float(value as f64)
    }
}

impl From<&str> for ActionValue {
    fn from(value: &str) -> Self {
        ActionValue::Text(value.to_string())
    }
}

impl From<String> for ActionValue {
    fn from(value: String) -> Self {
        ActionValue::Text(value)
    }
}

/// A single requested change to one controllable surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Target identifier, e.g. `"GPU_TGP"`. See [`crate::targets`].
    pub target: String,
    /// Proactive or opportunistic.
    pub kind: ActionKind,
    /// Requested value.
    pub value: ActionValue,
    /// Human-readable reason, surfaced in logs and diagnostics.
    pub reason: String,
    /// Processes affected by the change, if the agent knows them.
    pub affected_processes: Vec<String>,
    /// Free-form handler parameters.
    pub parameters: BTreeMap<String, String>,
}

impl Action {
    /// Creates an action of the given kind.
    pub fn new(
        target: impl Into<String>,
        kind: ActionKind,
        value: impl Into<ActionValue>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            kind,
            value: value.into(),
            reason: reason.into(),
            affected_processes: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Shorthand for a [`ActionKind::Proactive`] action.
    pub fn proactive(
        target: impl Into<String>,
        value: impl Into<ActionValue>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(target, ActionKind::Proactive, value, reason)
    }

    /// Shorthand for an [`ActionKind::Opportunistic`] action.
    pub fn opportunistic(
        target: impl Into<String>,
        value: impl Into<ActionValue>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(target, ActionKind::Opportunistic, value, reason)
    }

    /// Attaches the list of affected processes.
    pub fn with_processes(mut self, processes: Vec<String>) -> Self {
        self.affected_processes = processes;
        self
    }

    /// Adds a handler parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// The full output of one agent for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The proposing agent.
    pub agent: AgentId,
    /// Urgency of every action in this proposal.
    pub priority: Priority,
    /// Requested actions, in the agent's preferred order.
    pub actions: Vec<Action>,
}

impl Proposal {
    /// Creates an empty proposal with the given priority.
    pub fn new(agent: AgentId, priority: Priority) -> Self {
        Self {
            agent,
            priority,
            actions: Vec::new(),
        }
    }

    /// An "no opinion this tick" proposal.
    pub fn empty(agent: AgentId) -> Self {
        Self::new(agent, Priority::Low)
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Appends an action.
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Raises the priority to `priority` if it is higher than the current one.
    pub fn escalate(&mut self, priority: Priority) {
        self.priority = self.priority.max(priority);
    }

    /// Returns `true` if the agent has nothing to say this tick.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// An action that survived arbitration, with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    /// The agent whose action won.
    pub agent: AgentId,
    /// The priority of the winning proposal.
    pub priority: Priority,
    /// The action itself.
    pub action: Action,
    /// Set by the safety validator when the value was clamped.
    pub adjusted: bool,
}

impl ResolvedAction {
    /// Wraps a winning action.
    pub fn new(agent: AgentId, priority: Priority, action: Action) -> Self {
        Self {
            agent,
            priority,
            action,
            adjusted: false,
        }
    }

    /// Shortcut to the target identifier.
    pub fn target(&self) -> &str {
        &self.action.target
    }
}

/// Conflict-free set of actions for one tick: at most one action per target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedActionSet {
    actions: Vec<ResolvedAction>,
}

impl ResolvedActionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action, keeping insertion order.
    ///
    /// Returns `false` and drops the action if its target is already present.
    pub fn push(&mut self, action: ResolvedAction) -> bool {
        if self.contains(action.target()) {
            return false;
        }
        self.actions.push(action);
        true
    }

    /// Returns `true` if an action for `target` is present.
    pub fn contains(&self, target: &str) -> bool {
        self.actions.iter().any(|a| a.target() == target)
    }

    /// Returns the action for `target`, if any.
    pub fn get(&self, target: &str) -> Option<&ResolvedAction> {
        self.actions.iter().find(|a| a.target() == target)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` when nothing is to be executed.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Iterates in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedAction> {
        self.actions.iter()
    }
}

impl IntoIterator for ResolvedActionSet {
    type Item = ResolvedAction;
    type IntoIter = std::vec::IntoIter<ResolvedAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}
