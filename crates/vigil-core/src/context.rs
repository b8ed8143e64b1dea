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

//! Device state snapshot consumed by every agent in a tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Temperature above which a reading counts as warm, in °C.
pub const WARM_THRESHOLD_C: f32 = 70.0;
/// Temperature above which the device is considered to be throttling, in °C.
pub const THROTTLING_THRESHOLD_C: f32 = 85.0;
/// Temperature change per sample beyond which the trend is no longer stable.
pub const TREND_DEADBAND_C: f32 = 1.0;

/// Represents the thermal state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThermalStatus {
    /// Device is running cool.
    #[default]
    Cool,
    /// Device is warming up but within normal bounds.
    Warm,
    /// Device is actively throttling performance to shed heat.
    Throttling,
    /// Device is at critical temperature, emergency measures required.
    Critical,
}

/// Direction the temperature is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThermalTrend {
    /// Getting hotter.
    Rising,
    /// Roughly flat.
    #[default]
    Stable,
    /// Cooling down.
    Falling,
}

impl ThermalTrend {
    /// Classifies a temperature delta between two consecutive samples.
    pub fn from_delta(delta_c: f32) -> Self {
        if delta_c > TREND_DEADBAND_C {
            ThermalTrend::Rising
        } else if delta_c < -TREND_DEADBAND_C {
            ThermalTrend::Falling
        } else {
            ThermalTrend::Stable
        }
    }
}

/// CPU and GPU temperatures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermalReading {
    /// CPU package temperature in °C.
    pub cpu_temp_c: f32,
    /// GPU core temperature in °C.
    pub gpu_temp_c: f32,
    /// Direction of the hottest sensor.
    pub trend: ThermalTrend,
}

impl ThermalReading {
    /// The hotter of the two sensors.
    pub fn hottest(&self) -> f32 {
        self.cpu_temp_c.max(self.gpu_temp_c)
    }

    /// Classifies the reading, with `critical_c` as the emergency threshold.
    pub fn status(&self, critical_c: f32) -> ThermalStatus {
        let t = self.hottest();
        if t >= critical_c {
            ThermalStatus::Critical
        } else if t >= THROTTLING_THRESHOLD_C {
            ThermalStatus::Throttling
        } else if t >= WARM_THRESHOLD_C {
            ThermalStatus::Warm
        } else {
            ThermalStatus::Cool
        }
    }
}

/// Where the device draws power from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PowerSource {
    /// Wall adapter.
    #[default]
    Ac,
    /// Internal battery.
    Battery,
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerSource::Ac => f.write_str("ac"),
            PowerSource::Battery => f.write_str("battery"),
        }
    }
}

/// Currently programmed power limits, in watts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerLimits {
    /// CPU long-term limit.
    pub cpu_pl1_w: f32,
    /// CPU short-term (turbo) limit.
    pub cpu_pl2_w: f32,
    /// GPU total graphics power.
    pub gpu_tgp_w: f32,
}

/// Power delivery state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerState {
    /// AC or battery.
    pub source: PowerSource,
    /// Remaining charge, 0..=100.
    pub battery_percent: f32,
    /// Current limits.
    pub limits: PowerLimits,
    /// Active firmware performance mode (`quiet`, `balanced`, ...).
    pub performance_mode: String,
    /// Whether battery conservation (charge cap) is on.
    pub conservation_mode: bool,
}

impl PowerState {
    /// Returns `true` when running on battery.
    pub fn on_battery(&self) -> bool {
        self.source == PowerSource::Battery
    }
}

/// Discrete GPU state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuState {
    /// Utilization, 0..=100.
    pub utilization_percent: f32,
    /// Processes currently holding a GPU context.
    pub active_processes: Vec<String>,
    /// Graphics switching mode (`hybrid`, `discrete`, `integrated`).
    pub mode: String,
}

impl GpuState {
    /// Idle enough that the dGPU could be powered down.
    pub fn is_idle(&self) -> bool {
        self.active_processes.is_empty() && self.utilization_percent < 5.0
    }
}

/// Built-in panel state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    /// Panel refresh rate in Hz.
    pub refresh_rate_hz: u32,
    /// Backlight, 0..=100.
    pub brightness_percent: f32,
}

/// Keyboard lighting state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightingState {
    /// Keyboard backlight, 0..=100.
    pub keyboard_backlight_percent: f32,
}

/// What the machine is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum WorkloadType {
    /// Nothing significant running.
    Idle,
    /// A game holds the GPU.
    Gaming,
    /// Office, browsing, development.
    Productivity,
    /// Model inference or training.
    AiWorkload,
    /// Several classes at once.
    Mixed,
    /// Classifier had no opinion.
    #[default]
    Unknown,
}

/// What the user is inferred to want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum UserIntent {
    /// No strong preference.
    #[default]
    Balanced,
    /// Frame rate first.
    Gaming,
    /// Everything at maximum.
    MaxPerformance,
    /// Responsive but efficient.
    Productivity,
    /// Stretch the battery.
    BatterySaving,
    /// Keep fans down.
    Quiet,
}

/// Reduced key used to index learned preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ContextSignature {
    /// AC or battery.
    pub power: PowerSource,
    /// Workload class.
    pub workload: WorkloadType,
    /// Inferred intent.
    pub intent: UserIntent,
}

impl ContextSignature {
    /// Creates a signature.
    pub fn new(power: PowerSource, workload: WorkloadType, intent: UserIntent) -> Self {
        Self {
            power,
            workload,
            intent,
        }
    }
}

impl fmt::Display for ContextSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:?},{:?}", self.power, self.workload, self.intent)
    }
}

/// Immutable device state for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    /// When the provider sampled the device.
    pub captured_at: DateTime<Utc>,
    /// Temperatures.
    pub thermal: ThermalReading,
    /// Power source, charge and limits.
    pub power: PowerState,
    /// Discrete GPU.
    pub gpu: GpuState,
    /// Internal panel.
    pub display: DisplayState,
    /// Keyboard lighting.
    pub lighting: LightingState,
    /// Workload classification.
    pub workload: WorkloadType,
    /// Inferred user intent.
    pub intent: UserIntent,
}

impl ContextSnapshot {
    /// Returns the reduced key for preference lookups.
    pub fn signature(&self) -> ContextSignature {
        ContextSignature::new(self.power.source, self.workload, self.intent)
    }
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            captured_at: Utc::now(),
            thermal: ThermalReading::default(),
            power: PowerState {
                battery_percent: 100.0,
                ..Default::default()
            },
            gpu: GpuState::default(),
            display: DisplayState::default(),
            lighting: LightingState::default(),
            workload: WorkloadType::default(),
            intent: UserIntent::default(),
        }
    }
}

/// Failure to sample the device.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A sensor could not be read.
    #[error("sensor {sensor} unavailable: {source}")]
    Sensor {
        /// Sensor name or path.
        sensor: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The provider produced data it could not interpret.
    #[error("malformed sensor data from {sensor}: {message}")]
    Malformed {
        /// Sensor name or path.
        sensor: String,
        /// What was wrong.
        message: String,
    },
}

/// Produces one snapshot per tick.
pub trait ContextProvider: Send {
    /// Samples the device.
    fn snapshot(&self) -> Result<ContextSnapshot, ContextError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thermal_status_thresholds() {
        let mut reading = ThermalReading {
            cpu_temp_c: 60.0,
            gpu_temp_c: 55.0,
            trend: ThermalTrend::Stable,
        };
        assert_eq!(reading.status(95.0), ThermalStatus::Cool);
        reading.gpu_temp_c = 72.0;
        assert_eq!(reading.status(95.0), ThermalStatus::Warm);
        reading.cpu_temp_c = 88.0;
        assert_eq!(reading.status(95.0), ThermalStatus::Throttling);
        reading.cpu_temp_c = 96.0;
        assert_eq!(reading.status(95.0), ThermalStatus::Critical);
    }

    #[test]
    fn test_trend_from_delta() {
        assert_eq!(ThermalTrend::from_delta(2.5), ThermalTrend::Rising);
        assert_eq!(ThermalTrend::from_delta(0.4), ThermalTrend::Stable);
        assert_eq!(ThermalTrend::from_delta(-3.0), ThermalTrend::Falling);
    }

    #[test]
    fn test_signature_display() {
        let sig = ContextSignature::new(
            PowerSource::Battery,
            WorkloadType::Productivity,
            UserIntent::Balanced,
        );
        assert_eq!(sig.to_string(), "battery,Productivity,Balanced");
    }

    #[test]
    fn test_snapshot_signature_follows_state() {
        let mut ctx = ContextSnapshot::default();
        ctx.power.source = PowerSource::Battery;
        ctx.workload = WorkloadType::Gaming;
        ctx.intent = UserIntent::Gaming;
        let sig = ctx.signature();
        assert_eq!(sig.power, PowerSource::Battery);
        assert_eq!(sig.workload, WorkloadType::Gaming);
        assert_eq!(sig.intent, UserIntent::Gaming);
    }
}
