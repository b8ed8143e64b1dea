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

//! Catalogue of controllable surfaces and their well-known values.

/// CPU long-term power limit, watts.
pub const CPU_PL1: &str = "CPU_PL1";
/// CPU short-term power limit, watts.
pub const CPU_PL2: &str = "CPU_PL2";
/// CPU thermal junction limit, °C.
pub const CPU_TJMAX: &str = "CPU_TJMAX";
/// GPU total graphics power, watts.
pub const GPU_TGP: &str = "GPU_TGP";
/// Fan duty target, percent. `0` hands control back to the firmware curve.
pub const FAN_SPEED: &str = "FAN_SPEED";
/// Firmware performance mode.
pub const PERFORMANCE_MODE: &str = "PERFORMANCE_MODE";
/// Panel refresh rate, Hz.
pub const DISPLAY_REFRESH_RATE: &str = "DISPLAY_REFRESH_RATE";
/// Panel brightness, percent.
pub const DISPLAY_BRIGHTNESS: &str = "DISPLAY_BRIGHTNESS";
/// Keyboard backlight, percent.
pub const KEYBOARD_BACKLIGHT: &str = "KEYBOARD_BACKLIGHT";
/// Keyboard RGB effect.
pub const RGB_MODE: &str = "RGB_MODE";
/// Graphics switching mode.
pub const HYBRID_MODE: &str = "HYBRID_MODE";
/// Battery conservation (charge cap).
pub const BATTERY_CONSERVATION: &str = "BATTERY_CONSERVATION";

/// Values accepted by [`PERFORMANCE_MODE`].
pub mod performance_mode {
    /// Lowest fan noise.
    pub const QUIET: &str = "quiet";
    /// Firmware default.
    pub const BALANCED: &str = "balanced";
    /// Maximum sustained power.
    pub const PERFORMANCE: &str = "performance";
    /// User-defined limits.
    pub const CUSTOM: &str = "custom";
    /// All modes.
    pub const ALL: [&str; 4] = [QUIET, BALANCED, PERFORMANCE, CUSTOM];
}

/// Values accepted by [`HYBRID_MODE`].
pub mod hybrid_mode {
    /// iGPU drives the panel, dGPU on demand.
    pub const HYBRID: &str = "hybrid";
    /// dGPU drives the panel.
    pub const DISCRETE: &str = "discrete";
    /// dGPU powered off.
    pub const INTEGRATED: &str = "integrated";
    /// All modes.
    pub const ALL: [&str; 3] = [HYBRID, DISCRETE, INTEGRATED];
}

/// Values accepted by [`RGB_MODE`].
pub mod rgb_mode {
    /// Lighting disabled.
    pub const OFF: &str = "off";
    /// All supported effects.
    pub const ALL: [&str; 5] = [OFF, "static", "breathing", "rainbow", "wave"];
}

/// Refresh rates supported by the built-in panel.
pub const PANEL_REFRESH_RATES: [i64; 2] = [60, 165];
