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

//! # Vigil Agents
//!
//! The seven optimization agents. Each one owns a slice of the hardware
//! (thermals, power limits, GPU budget, battery, panel, graphics mode and
//! keyboard lighting), proposes changes for it every tick, and builds its
//! proposal through [`policy::Planner`] so learned user preferences are
//! honored the same way everywhere.

pub mod battery_agent;
pub mod display_agent;
pub mod gpu_agent;
pub mod hybrid_mode_agent;
pub mod keyboard_light_agent;
pub mod laptop_agent;
pub mod policy;
pub mod power_agent;
pub mod thermal_agent;

pub use battery_agent::BatteryAgent;
pub use display_agent::DisplayAgent;
pub use gpu_agent::GpuAgent;
pub use hybrid_mode_agent::HybridModeAgent;
pub use keyboard_light_agent::KeyboardLightAgent;
pub use laptop_agent::LaptopAgent;
pub use power_agent::PowerAgent;
pub use thermal_agent::ThermalAgent;

use std::sync::{Arc, Mutex};
use vigil_core::{Agent, AgentId, VigilConfig};

/// Builds the agent for `id`, configured from `config`.
pub fn build_agent(id: AgentId, config: &VigilConfig) -> Arc<Mutex<dyn Agent>> {
    Arc::new(Mutex::new(LaptopAgent::new(id, config)))
}

/// Every agent, in registration order.
///
/// Registration order is the final arbitration tie-break, so thermal
/// protection comes first. The orchestrator filters out agents disabled in
/// the configuration.
pub fn standard_agents(config: &VigilConfig) -> Vec<Arc<Mutex<dyn Agent>>> {
    AgentId::ALL
        .iter()
        .map(|id| build_agent(*id, config))
        .collect()
}
