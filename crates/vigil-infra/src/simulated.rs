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

//! An in-process laptop used by tests and by `--simulate` runs.
//!
//! The device owns a [`ContextSnapshot`]-shaped state plus the few targets the
//! snapshot does not carry (fan duty, RGB effect, TjMax). Handlers and the
//! provider share it, so whatever the executor applies shows up in the next
//! snapshot. Faults can be injected per target, and the user can be
//! simulated changing a setting behind the control plane's back.

use chrono::Utc;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vigil_core::context::{PowerSource, ThermalTrend, UserIntent, WorkloadType};
use vigil_core::targets::{self, hybrid_mode, performance_mode, rgb_mode};
use vigil_core::{
    ActionHandler, ActionValue, ContextError, ContextProvider, ContextSnapshot, HandlerError,
    HandlerRegistry,
};

/// Battery capacity used to turn power draw into discharge, in Wh.
pub const BATTERY_CAPACITY_WH: f32 = 99.9;

/// Every target the simulated device exposes.
pub const SIMULATED_TARGETS: [&str; 12] = [
    targets::CPU_PL1,
    targets::CPU_PL2,
    targets::CPU_TJMAX,
    targets::GPU_TGP,
    targets::FAN_SPEED,
    targets::PERFORMANCE_MODE,
    targets::DISPLAY_REFRESH_RATE,
    targets::DISPLAY_BRIGHTNESS,
    targets::KEYBOARD_BACKLIGHT,
    targets::RGB_MODE,
    targets::HYBRID_MODE,
    targets::BATTERY_CONSERVATION,
];

#[derive(Debug)]
struct DeviceState {
    context: ContextSnapshot,
    fan_percent: i64,
    rgb_mode: String,
    tjmax_c: i64,
    last_hottest: Option<f32>,
    context_failure: Option<String>,
    /// Successful applies left before the target fails, per target.
    faults: HashMap<String, u32>,
    applied: Vec<(String, ActionValue)>,
}

impl DeviceState {
    fn get(&self, target: &str) -> Option<ActionValue> {
        let ctx = &self.context;
        let watts = |w: f32| ActionValue::Int(w.round() as i64);
        Some(match target {
            targets::CPU_PL1 => watts(ctx.power.limits.cpu_pl1_w),
            targets::CPU_PL2 => watts(ctx.power.limits.cpu_pl2_w),
            targets::GPU_TGP => watts(ctx.power.limits.gpu_tgp_w),
            targets::CPU_TJMAX => ActionValue::Int(self.tjmax_c),
            targets::FAN_SPEED => ActionValue::Int(self.fan_percent),
            targets::PERFORMANCE_MODE => ActionValue::from(ctx.power.performance_mode.as_str()),
            targets::DISPLAY_REFRESH_RATE => ActionValue::from(ctx.display.refresh_rate_hz),
            targets::DISPLAY_BRIGHTNESS => watts(ctx.display.brightness_percent),
            targets::KEYBOARD_BACKLIGHT => watts(ctx.lighting.keyboard_backlight_percent),
            targets::RGB_MODE => ActionValue::from(self.rgb_mode.as_str()),
            targets::HYBRID_MODE => ActionValue::from(ctx.gpu.mode.as_str()),
            targets::BATTERY_CONSERVATION => ActionValue::Bool(ctx.power.conservation_mode),
            _ => return None,
        })
    }

    /// Writes a target the way the platform driver would, refusing what it
    /// would refuse.
    fn set(&mut self, target: &str, value: &ActionValue) -> Result<(), HandlerError> {
        let unsupported = || HandlerError::Unsupported {
            target: target.to_string(),
            value: value.clone(),
        };
        let number = |max: f64| {
            value
                .as_f64()
                .filter(|v| (0.0..=max).contains(v))
                .ok_or_else(unsupported)
        };
        let word = |allowed: &[&str]| {
            value
                .as_text()
                .filter(|w| allowed.iter().any(|a| a == w))
                .map(str::to_string)
                .ok_or_else(unsupported)
        };
        let ctx = &mut self.context;
        match target {
            targets::CPU_PL1 => ctx.power.limits.cpu_pl1_w = number(140.0)? as f32,
            targets::CPU_PL2 => ctx.power.limits.cpu_pl2_w = number(200.0)? as f32,
            targets::GPU_TGP => ctx.power.limits.gpu_tgp_w = number(140.0)? as f32,
            targets::CPU_TJMAX => self.tjmax_c = number(105.0)?.round() as i64,
            targets::FAN_SPEED => self.fan_percent = number(100.0)?.round() as i64,
            targets::PERFORMANCE_MODE => {
                ctx.power.performance_mode = word(&performance_mode::ALL)?;
            }
            targets::DISPLAY_REFRESH_RATE => {
                let hz = number(1000.0)?.round() as i64;
                if !targets::PANEL_REFRESH_RATES.contains(&hz) {
                    return Err(unsupported());
                }
                ctx.display.refresh_rate_hz = hz as u32;
            }
            targets::DISPLAY_BRIGHTNESS => ctx.display.brightness_percent = number(100.0)? as f32,
            targets::KEYBOARD_BACKLIGHT => {
                ctx.lighting.keyboard_backlight_percent = number(100.0)? as f32;
            }
            targets::RGB_MODE => self.rgb_mode = word(&rgb_mode::ALL)?,
            targets::HYBRID_MODE => ctx.gpu.mode = word(&hybrid_mode::ALL)?,
            targets::BATTERY_CONSERVATION => {
                ctx.power.conservation_mode = value.as_bool().ok_or_else(unsupported)?;
            }
            _ => return Err(HandlerError::NotRegistered(target.to_string())),
        }
        Ok(())
    }
}

/// Handle to a simulated laptop. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// A plugged-in laptop doing office work at balanced settings.
    pub fn new() -> Self {
        let mut context = ContextSnapshot::default();
        context.thermal.cpu_temp_c = 55.0;
        context.thermal.gpu_temp_c = 45.0;
        context.power.source = PowerSource::Ac;
        context.power.battery_percent = 100.0;
        context.power.performance_mode = performance_mode::BALANCED.to_string();
        context.power.limits.cpu_pl1_w = 55.0;
        context.power.limits.cpu_pl2_w = 115.0;
        context.power.limits.gpu_tgp_w = 100.0;
        context.gpu.mode = hybrid_mode::HYBRID.to_string();
        context.display.refresh_rate_hz = 165;
        context.display.brightness_percent = 60.0;
        context.lighting.keyboard_backlight_percent = 50.0;
        context.workload = WorkloadType::Productivity;
        context.intent = UserIntent::Balanced;

        Self {
            state: Arc::new(Mutex::new(DeviceState {
                context,
                fan_percent: 0,
                rgb_mode: "static".to_string(),
                tjmax_c: 100,
                last_hottest: None,
                context_failure: None,
                faults: HashMap::new(),
                applied: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A context provider reading this device.
    pub fn provider(&self) -> SimulatedContextProvider {
        SimulatedContextProvider {
            device: self.clone(),
        }
    }

    /// Handlers for every simulated target.
    pub fn handlers(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for target in SIMULATED_TARGETS {
            registry.register(
                target,
                Arc::new(SimulatedHandler {
                    target: target.to_string(),
                    device: self.clone(),
                }),
            );
        }
        registry
    }

    /// Mutates the sensed state directly.
    pub fn update(&self, change: impl FnOnce(&mut ContextSnapshot)) {
        change(&mut self.lock().context);
    }

    /// Plugs or unplugs the charger.
    pub fn set_power_source(&self, source: PowerSource) {
        self.update(|ctx| ctx.power.source = source);
    }

    /// Current power source.
    pub fn power_source(&self) -> PowerSource {
        self.lock().context.power.source
    }

    /// Sets the remaining charge.
    pub fn set_battery_percent(&self, percent: f32) {
        self.update(|ctx| ctx.power.battery_percent = percent);
    }

    /// Sets both temperatures.
    pub fn set_temperatures(&self, cpu_c: f32, gpu_c: f32) {
        self.update(|ctx| {
            ctx.thermal.cpu_temp_c = cpu_c;
            ctx.thermal.gpu_temp_c = gpu_c;
        });
    }

    /// Sets the workload class and inferred intent.
    pub fn set_activity(&self, workload: WorkloadType, intent: UserIntent) {
        self.update(|ctx| {
            ctx.workload = workload;
            ctx.intent = intent;
        });
    }

    /// Sets the processes holding the dGPU and its utilization.
    pub fn set_gpu_load(&self, processes: &[&str], utilization_percent: f32) {
        self.update(|ctx| {
            ctx.gpu.active_processes = processes.iter().map(|p| p.to_string()).collect();
            ctx.gpu.utilization_percent = utilization_percent;
        });
    }

    /// The user changes a setting outside the control plane.
    pub fn user_change(
        &self,
        target: &str,
        value: impl Into<ActionValue>,
    ) -> Result<(), HandlerError> {
        let value = value.into();
        log::debug!("SimulatedDevice: user set {target} = {value}");
        self.lock().set(target, &value)
    }

    /// Reads a target.
    pub fn value(&self, target: &str) -> Option<ActionValue> {
        self.lock().get(target)
    }

    /// Makes the apply of `target` fail after `successes` more successful
    /// applies. The fault fires once.
    pub fn fail_apply(&self, target: &str, successes: u32) {
        self.lock().faults.insert(target.to_string(), successes);
    }

    /// Makes snapshots fail (or succeed again).
    pub fn fail_context(&self, message: Option<&str>) {
        self.lock().context_failure = message.map(str::to_string);
    }

    /// Every successful apply, in order.
    pub fn applied(&self) -> Vec<(String, ActionValue)> {
        self.lock().applied.clone()
    }

    /// Advances a crude thermal and battery model by `secs`.
    ///
    /// Temperatures relax toward an equilibrium set by the power limits and
    /// fan duty; the battery drains with power draw while unplugged.
    pub fn advance(&self, secs: f32) {
        let mut state = self.lock();
        let fan = state.fan_percent as f32;
        let ctx = &mut state.context;
        let limits = &ctx.power.limits;
        let gpu_load = ctx.gpu.utilization_percent / 100.0;

        let cpu_target = 35.0 + limits.cpu_pl1_w * 0.45 - fan * 0.12;
        let gpu_target = 35.0 + limits.gpu_tgp_w * gpu_load * 0.4 - fan * 0.08;
        let relax = (secs / 20.0).min(1.0);
        ctx.thermal.cpu_temp_c += (cpu_target - ctx.thermal.cpu_temp_c) * relax;
        ctx.thermal.gpu_temp_c += (gpu_target - ctx.thermal.gpu_temp_c) * relax;

        if ctx.power.on_battery() {
            let draw_w = limits.cpu_pl1_w * 0.5
                + limits.gpu_tgp_w * gpu_load
                + ctx.display.brightness_percent * 0.08
                + 4.0;
            let drained = draw_w * secs / 3600.0 / BATTERY_CAPACITY_WH * 100.0;
            ctx.power.battery_percent = (ctx.power.battery_percent - drained).max(0.0);
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for one simulated target.
#[derive(Debug)]
pub struct SimulatedHandler {
    target: String,
    device: SimulatedDevice,
}

impl ActionHandler for SimulatedHandler {
    fn apply(&self, value: &ActionValue) -> Result<ActionValue, HandlerError> {
        let mut state = self.device.lock();
        if let Some(remaining) = state.faults.get_mut(&self.target) {
            if *remaining == 0 {
                state.faults.remove(&self.target);
                return Err(HandlerError::Rejected {
                    target: self.target.clone(),
                    message: "injected fault".to_string(),
                });
            }
            *remaining -= 1;
        }
        let previous = state
            .get(&self.target)
            .ok_or_else(|| HandlerError::NotRegistered(self.target.clone()))?;
        state.set(&self.target, value)?;
        state.applied.push((self.target.clone(), value.clone()));
        Ok(previous)
    }

    fn current(&self) -> Option<ActionValue> {
        self.device.value(&self.target)
    }
}

/// Snapshots of a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedContextProvider {
    device: SimulatedDevice,
}

impl ContextProvider for SimulatedContextProvider {
    fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
        let mut state = self.device.lock();
        if let Some(message) = &state.context_failure {
            return Err(ContextError::Sensor {
                sensor: "simulated".to_string(),
                source: io::Error::other(message.clone()),
            });
        }
        let hottest = state.context.thermal.hottest();
        let trend = state
            .last_hottest
            .map_or(ThermalTrend::Stable, |last| ThermalTrend::from_delta(hottest - last));
        state.last_hottest = Some(hottest);

        let mut snapshot = state.context.clone();
        snapshot.thermal.trend = trend;
        snapshot.captured_at = Utc::now();
        Ok(snapshot)
    }
}
