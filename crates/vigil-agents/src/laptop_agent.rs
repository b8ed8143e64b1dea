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

//! The closed set of agents shipped with Vigil.

use crate::{
    BatteryAgent, DisplayAgent, GpuAgent, HybridModeAgent, KeyboardLightAgent, PowerAgent,
    ThermalAgent,
};
use vigil_core::{
    Agent, AgentError, AgentId, ContextSnapshot, ExecutionResult, PreferenceView, Proposal,
    VigilConfig,
};

/// One of the standard agents.
///
/// The registry only sees [`Agent`]; this enum keeps the set of built-in
/// variants closed so each [`AgentId`] maps to exactly one implementation.
#[derive(Debug)]
pub enum LaptopAgent {
    /// See [`ThermalAgent`].
    Thermal(ThermalAgent),
    /// See [`PowerAgent`].
    Power(PowerAgent),
    /// See [`GpuAgent`].
    Gpu(GpuAgent),
    /// See [`BatteryAgent`].
    Battery(BatteryAgent),
    /// See [`DisplayAgent`].
    Display(DisplayAgent),
    /// See [`HybridModeAgent`].
    HybridMode(HybridModeAgent),
    /// See [`KeyboardLightAgent`].
    KeyboardLight(KeyboardLightAgent),
}

impl LaptopAgent {
    /// Builds the variant for `id`.
    pub fn new(id: AgentId, config: &VigilConfig) -> Self {
        let policy = &config.policy;
        match id {
            AgentId::Thermal => Self::Thermal(ThermalAgent::new(policy)),
            AgentId::Power => Self::Power(PowerAgent::new()),
            AgentId::Gpu => Self::Gpu(GpuAgent::new()),
            AgentId::Battery => Self::Battery(BatteryAgent::new(policy)),
            AgentId::Display => Self::Display(DisplayAgent::new(policy)),
            AgentId::HybridMode => Self::HybridMode(HybridModeAgent::new()),
            AgentId::KeyboardLight => Self::KeyboardLight(KeyboardLightAgent::new(policy)),
        }
    }

    fn inner(&self) -> &dyn Agent {
        match self {
            Self::Thermal(agent) => agent,
            Self::Power(agent) => agent,
            Self::Gpu(agent) => agent,
            Self::Battery(agent) => agent,
            Self::Display(agent) => agent,
            Self::HybridMode(agent) => agent,
            Self::KeyboardLight(agent) => agent,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Agent {
        match self {
            Self::Thermal(agent) => agent,
            Self::Power(agent) => agent,
            Self::Gpu(agent) => agent,
            Self::Battery(agent) => agent,
            Self::Display(agent) => agent,
            Self::HybridMode(agent) => agent,
            Self::KeyboardLight(agent) => agent,
        }
    }
}

impl Agent for LaptopAgent {
    fn id(&self) -> AgentId {
        self.inner().id()
    }

    fn propose(
        &mut self,
        context: &ContextSnapshot,
        preferences: &PreferenceView,
    ) -> Result<Proposal, AgentError> {
        self.inner_mut().propose(context, preferences)
    }

    fn on_executed(&mut self, result: &ExecutionResult) {
        self.inner_mut().on_executed(result);
    }

    fn describe(&self) -> String {
        self.inner().describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_builds_its_own_variant() {
        let config = VigilConfig::default();
        for id in AgentId::ALL {
            assert_eq!(LaptopAgent::new(id, &config).id(), id);
        }
    }

    #[test]
    fn test_describe_before_first_tick() {
        let agent = LaptopAgent::new(AgentId::Thermal, &VigilConfig::default());
        assert_eq!(agent.describe(), "not run yet");
    }
}
