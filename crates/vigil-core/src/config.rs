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

//! Immutable runtime configuration, read once per start.
//!
//! Configuration files are written in RON. Every field has a default, so a
//! file only needs to mention what it changes:
//!
//! ```ron
//! (
//!     tick_interval_ms: 500,
//!     agents: (keyboard_light: false),
//!     policy: (critical_battery_percent: 15.0),
//! )
//! ```

use crate::action::ActionValue;
use crate::agent::AgentId;
use crate::targets::{self, hybrid_mode, performance_mode, rgb_mode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid RON for [`VigilConfig`].
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// The values are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Shape of a safety bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundRule {
    /// Inclusive numeric range.
    Range {
        /// Lowest accepted value.
        min: f64,
        /// Highest accepted value.
        max: f64,
    },
    /// Value must be one of these.
    AllowedSet(Vec<ActionValue>),
    /// Value must be a boolean.
    Boolean,
}

/// Hardware-safety bound for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyBoundConfig {
    /// Target identifier.
    pub target: String,
    /// Accepted values.
    pub rule: BoundRule,
    /// Out-of-bounds values are rejected instead of clamped.
    #[serde(default)]
    pub critical: bool,
}

impl SafetyBoundConfig {
    /// Numeric range bound.
    pub fn range(target: &str, min: f64, max: f64) -> Self {
        Self {
            target: target.to_string(),
            rule: BoundRule::Range { min, max },
            critical: false,
        }
    }

    /// Allowed-set bound.
    pub fn allowed(target: &str, values: Vec<ActionValue>) -> Self {
        Self {
            target: target.to_string(),
            rule: BoundRule::AllowedSet(values),
            critical: false,
        }
    }

    /// Marks the bound as hard-safety-critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// Thresholds deciding when agents may override learned preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Learned preferences at or above this confidence are respected.
    pub override_confidence_threshold: f32,
    /// At or below this charge, battery protection ignores preferences.
    pub critical_battery_percent: f32,
    /// At or above this temperature, thermal protection ignores preferences.
    pub thermal_emergency_c: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            override_confidence_threshold: 0.6,
            critical_battery_percent: 20.0,
            thermal_emergency_c: 95.0,
        }
    }
}

/// Learner capacities and windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// How long after an agent change a user change counts as an override.
    pub override_window_secs: u64,
    /// Maximum override records kept.
    pub override_capacity: usize,
    /// Maximum behavior samples kept.
    pub behavior_capacity: usize,
    /// Maximum battery samples kept.
    pub battery_capacity: usize,
    /// Minimum spacing between battery samples.
    pub battery_sample_interval_secs: u64,
    /// Confidence halves after this many days without confirmation.
    pub preference_half_life_days: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            override_window_secs: 30,
            override_capacity: 500,
            behavior_capacity: 10_000,
            battery_capacity: 1_000,
            battery_sample_interval_secs: 60,
            preference_half_life_days: 14,
        }
    }
}

/// Per-agent enable switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToggles {
    /// Thermal agent.
    pub thermal: bool,
    /// Power agent.
    pub power: bool,
    /// GPU agent.
    pub gpu: bool,
    /// Battery agent.
    pub battery: bool,
    /// Display agent.
    pub display: bool,
    /// Hybrid mode agent.
    pub hybrid_mode: bool,
    /// Keyboard light agent.
    pub keyboard_light: bool,
}

impl Default for AgentToggles {
    fn default() -> Self {
        Self {
            thermal: true,
            power: true,
            gpu: true,
            battery: true,
            display: true,
            hybrid_mode: true,
            keyboard_light: true,
        }
    }
}

impl AgentToggles {
    /// Returns whether `agent` should be registered.
    pub fn is_enabled(&self, agent: AgentId) -> bool {
        match agent {
            AgentId::Thermal => self.thermal,
            AgentId::Power => self.power,
            AgentId::Gpu => self.gpu,
            AgentId::Battery => self.battery,
            AgentId::Display => self.display,
            AgentId::HybridMode => self.hybrid_mode,
            AgentId::KeyboardLight => self.keyboard_light,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Scheduled tick period.
    pub tick_interval_ms: u64,
    /// Per-call budget for `Agent::propose`.
    pub agent_timeout_ms: u64,
    /// Coalescing window for out-of-cycle triggers.
    pub debounce_ms: u64,
    /// Period of the background persistence flush.
    pub persistence_interval_secs: u64,
    /// Preference override policy.
    pub policy: PolicyConfig,
    /// Learner settings.
    pub learning: LearningConfig,
    /// Which agents to register.
    pub agents: AgentToggles,
    /// Hardware-safety bounds.
    pub safety_bounds: Vec<SafetyBoundConfig>,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            agent_timeout_ms: 150,
            debounce_ms: 1000,
            persistence_interval_secs: 300,
            policy: PolicyConfig::default(),
            learning: LearningConfig::default(),
            agents: AgentToggles::default(),
            safety_bounds: default_safety_bounds(),
        }
    }
}

/// Bounds matching the Legion Slim 7i Gen 9 platform driver limits.
pub fn default_safety_bounds() -> Vec<SafetyBoundConfig> {
    let text = |values: &[&str]| -> Vec<ActionValue> {
        values.iter().map(|v| ActionValue::from(*v)).collect()
    };
    vec![
        SafetyBoundConfig::range(targets::CPU_PL1, 15.0, 140.0),
        SafetyBoundConfig::range(targets::CPU_PL2, 45.0, 200.0),
        SafetyBoundConfig::range(targets::GPU_TGP, 35.0, 140.0),
        SafetyBoundConfig::range(targets::FAN_SPEED, 0.0, 100.0).critical(),
        SafetyBoundConfig::range(targets::CPU_TJMAX, 85.0, 105.0).critical(),
        SafetyBoundConfig::range(targets::DISPLAY_BRIGHTNESS, 0.0, 100.0),
        SafetyBoundConfig::range(targets::KEYBOARD_BACKLIGHT, 0.0, 100.0),
        SafetyBoundConfig::allowed(
            targets::DISPLAY_REFRESH_RATE,
            targets::PANEL_REFRESH_RATES
                .iter()
                .map(|hz| ActionValue::Int(*hz))
                .collect(),
        ),
        SafetyBoundConfig::allowed(targets::PERFORMANCE_MODE, text(&performance_mode::ALL)),
        SafetyBoundConfig::allowed(targets::RGB_MODE, text(&rgb_mode::ALL)),
        SafetyBoundConfig::allowed(targets::HYBRID_MODE, text(&hybrid_mode::ALL)),
        SafetyBoundConfig {
            target: targets::BATTERY_CONSERVATION.to_string(),
            rule: BoundRule::Boolean,
            critical: false,
        },
    ]
}

impl VigilConfig {
    /// Parses and validates a RON document.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: VigilConfig =
            ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&source)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                "Config: {} not found, using defaults.",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.persistence_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "persistence_interval_secs must be > 0".into(),
            ));
        }
        if self.agent_timeout_ms == 0 {
            return Err(ConfigError::Invalid("agent_timeout_ms must be > 0".into()));
        }
        if self.agent_timeout_ms >= self.tick_interval_ms {
            log::warn!(
                "Config: agent_timeout_ms ({}) is not shorter than tick_interval_ms ({}); \
                slow agents will cause skipped ticks.",
                self.agent_timeout_ms,
                self.tick_interval_ms
            );
        }
        let threshold = self.policy.override_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "override_confidence_threshold {threshold} outside [0, 1]"
            )));
        }
        if self.learning.override_capacity == 0
            || self.learning.behavior_capacity == 0
            || self.learning.battery_capacity == 0
        {
            return Err(ConfigError::Invalid(
                "learning capacities must be > 0".into(),
            ));
        }
        for bound in &self.safety_bounds {
            match &bound.rule {
                BoundRule::Range { min, max } if min > max || min.is_nan() || max.is_nan() => {
                    return Err(ConfigError::Invalid(format!(
                        "bound for {} has min {} above max {}",
                        bound.target, min, max
                    )));
                }
                BoundRule::AllowedSet(values) if values.is_empty() => {
                    return Err(ConfigError::Invalid(format!(
                        "bound for {} has an empty allowed set",
                        bound.target
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Scheduled tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Per-call agent budget.
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Debounce window.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Background persistence period.
    pub fn persistence_interval(&self) -> Duration {
        Duration::from_secs(self.persistence_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = VigilConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.debounce_window(), Duration::from_secs(1));
        assert!(config.agents.is_enabled(AgentId::KeyboardLight));
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = VigilConfig::from_ron_str(
            "(tick_interval_ms: 250, agents: (keyboard_light: false), policy: (critical_battery_percent: 15.0))",
        )
        .unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert!(!config.agents.is_enabled(AgentId::KeyboardLight));
        assert!(config.agents.is_enabled(AgentId::Thermal));
        assert_eq!(config.policy.critical_battery_percent, 15.0);
        assert_eq!(config.policy.override_confidence_threshold, 0.6);
        assert_eq!(config.safety_bounds, default_safety_bounds());
    }

    #[test]
    fn test_custom_bounds_from_ron() {
        let config = VigilConfig::from_ron_str(
            r#"(safety_bounds: [
                (target: "CPU_PL2", rule: Range(min: 45.0, max: 135.0)),
                (target: "PERFORMANCE_MODE", rule: AllowedSet([Text("quiet")]), critical: true),
            ])"#,
        )
        .unwrap();
        assert_eq!(config.safety_bounds.len(), 2);
        assert_eq!(
            config.safety_bounds[0].rule,
            BoundRule::Range {
                min: 45.0,
                max: 135.0
            }
        );
        assert!(config.safety_bounds[1].critical);
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let err = VigilConfig::from_ron_str("(tick_interval_ms: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_persistence_interval_rejected() {
        let err = VigilConfig::from_ron_str("(persistence_interval_secs: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let config = VigilConfig {
            persistence_interval_secs: 0,
            ..VigilConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = VigilConfig::from_ron_str(
            r#"(safety_bounds: [(target: "GPU_TGP", rule: Range(min: 140.0, max: 35.0))])"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            VigilConfig::from_ron_str("(tick_interval_ms: \"fast\")"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.ron");
        assert_eq!(
            VigilConfig::load_or_default(&path).unwrap(),
            VigilConfig::default()
        );

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "(debounce_ms: 250)").unwrap();
        let config = VigilConfig::load(&path).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert!(matches!(
            VigilConfig::load(dir.path().join("nope.ron")),
            Err(ConfigError::Io { .. })
        ));
    }
}
