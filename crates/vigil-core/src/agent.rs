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

//! The capability interface implemented by every optimization agent.

use crate::action::Proposal;
use crate::context::ContextSnapshot;
use crate::execution::ExecutionResult;
use crate::learning::PreferenceView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifier of each agent variant.
///
/// The order of variants is the default registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    /// CPU/GPU temperature protection.
    Thermal,
    /// Performance mode and CPU power limits.
    Power,
    /// GPU total graphics power.
    Gpu,
    /// Battery conservation and low-battery emergency handling.
    Battery,
    /// Refresh rate and brightness.
    Display,
    /// Hybrid / discrete graphics switching.
    HybridMode,
    /// Keyboard backlight.
    KeyboardLight,
}

impl AgentId {
    /// Every agent, in default registration order.
    pub const ALL: [AgentId; 7] = [
        AgentId::Thermal,
        AgentId::Power,
        AgentId::Gpu,
        AgentId::Battery,
        AgentId::Display,
        AgentId::HybridMode,
        AgentId::KeyboardLight,
    ];
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Failures contained at the agent boundary. None of them aborts a tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    /// The agent reported a failure from `propose`.
    #[error("agent {agent} failed: {message}")]
    Failed {
        /// The failing agent.
        agent: AgentId,
        /// What went wrong.
        message: String,
    },
    /// The agent panicked; the panic was caught at the call boundary.
    #[error("agent {agent} panicked: {message}")]
    Panicked {
        /// The failing agent.
        agent: AgentId,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// The agent did not answer within its time budget.
    #[error("agent {agent} timed out after {timeout:?}")]
    TimedOut {
        /// The slow agent.
        agent: AgentId,
        /// The budget that was exceeded.
        timeout: Duration,
    },
    /// The agent is still stuck in a call from an earlier tick.
    #[error("agent {agent} is still busy with an earlier call")]
    Busy {
        /// The busy agent.
        agent: AgentId,
    },
}

impl AgentError {
    /// Convenience constructor for [`AgentError::Failed`].
    pub fn failed(agent: AgentId, message: impl Into<String>) -> Self {
        AgentError::Failed {
            agent,
            message: message.into(),
        }
    }

    /// The agent this error belongs to.
    pub fn agent(&self) -> AgentId {
        match self {
            AgentError::Failed { agent, .. }
            | AgentError::Panicked { agent, .. }
            | AgentError::TimedOut { agent, .. }
            | AgentError::Busy { agent } => *agent,
        }
    }
}

/// An optimization agent.
///
/// Agents reason, they do not act: `propose` must never touch hardware. The
/// control plane calls `propose` once per tick (possibly on a worker thread,
/// bounded by a timeout) and `on_executed` once the resolved actions have been
/// applied.
pub trait Agent: Send {
    /// Returns the identifier of this agent.
    fn id(&self) -> AgentId;

    /// Produces this tick's proposal from the shared snapshot.
    ///
    /// `preferences` is a read-only view of what the learner knows about the
    /// user's manual choices. Agents consult it before changing a target.
    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError>;

    /// Feedback after execution, used to refresh short-lived internal state.
    fn on_executed(&mut self, result: &ExecutionResult);

    /// One-line description of the last decision, for diagnostics.
    fn describe(&self) -> String;
}
