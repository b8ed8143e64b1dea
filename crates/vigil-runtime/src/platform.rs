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

//! Chooses and wires the collaborators for the machine we run on.

use anyhow::{bail, Context, Result};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use vigil_control::Collaborators;
use vigil_core::context::{PowerSource, UserIntent};
use vigil_core::{ActionValue, HandlerRegistry, PersistenceBackend};
use vigil_infra::{
    legion_handlers, SimulatedDevice, SysfsContextProvider, SysfsLayout, WrittenValues,
};

/// The device under control.
pub enum Platform {
    /// An in-process laptop model.
    Simulated(SimulatedDevice),
    /// The real machine through sysfs.
    Sysfs(SysfsLayout),
}

impl Platform {
    /// Opens the real platform, failing if the driver is not loaded.
    pub fn sysfs() -> Result<Self> {
        let layout = SysfsLayout::system();
        if !layout.driver_present() {
            bail!(
                "platform driver not found at {:?}; load legion_laptop_16irx9 or run with --simulate",
                layout.platform
            );
        }
        Ok(Platform::Sysfs(layout))
    }

    /// Builds the collaborators and a handle on the handlers for operator
    /// commands.
    pub fn wire(
        &self,
        intent: UserIntent,
        persistence: Arc<dyn PersistenceBackend>,
    ) -> Result<(Collaborators, HandlerRegistry)> {
        let agents = Box::new(vigil_agents::standard_agents);
        let (collaborators, handlers) = match self {
            Platform::Simulated(device) => {
                device.update(|ctx| ctx.intent = intent);
                let handlers = device.handlers();
                let collaborators = Collaborators {
                    provider: Box::new(device.provider()),
                    handlers: handlers.clone(),
                    persistence,
                    agents,
                };
                (collaborators, handlers)
            }
            Platform::Sysfs(layout) => {
                let mode = fs::read_to_string(layout.attribute("performance_mode"))
                    .with_context(|| format!("reading {:?}", layout.attribute("performance_mode")))?;
                let written = Arc::new(WrittenValues::seeded(mode.trim()));
                let provider = SysfsContextProvider::new(layout.clone(), Arc::clone(&written));
                provider.set_intent(intent);
                let handlers = legion_handlers(layout, &written);
                let collaborators = Collaborators {
                    provider: Box::new(provider),
                    handlers: handlers.clone(),
                    persistence,
                    agents,
                };
                (collaborators, handlers)
            }
        };
        log::info!(
            "Runtime: {} handlers registered ({})",
            handlers.len(),
            handlers.targets().collect::<Vec<_>>().join(", ")
        );
        Ok((collaborators, handlers))
    }

    /// Whether the charger is connected, if known.
    pub fn on_mains(&self) -> Option<bool> {
        match self {
            Platform::Simulated(device) => Some(device.power_source() == PowerSource::Ac),
            Platform::Sysfs(layout) => layout.mains_online(),
        }
    }

    /// Moves simulated time forward. No-op on real hardware.
    pub fn advance(&self, elapsed: Duration) {
        if let Platform::Simulated(device) = self {
            device.advance(elapsed.as_secs_f32());
        }
    }

    /// The simulated device, for simulation-only commands.
    pub fn simulated(&self) -> Option<&SimulatedDevice> {
        match self {
            Platform::Simulated(device) => Some(device),
            Platform::Sysfs(_) => None,
        }
    }
}

/// Applies a user change through the handlers, as a UI would.
pub fn apply_user_change(
    handlers: &HandlerRegistry,
    target: &str,
    value: &ActionValue,
) -> Result<ActionValue> {
    let Some(handler) = handlers.get(target) else {
        bail!("no handler for {target}");
    };
    handler
        .apply(value)
        .with_context(|| format!("setting {target} to {value}"))
}
