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

//! The orchestrator service driving the simulated laptop, with state kept
//! in JSON files.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vigil_agents::standard_agents;
use vigil_control::{Collaborators, LifecycleState, Orchestrator, ReoptimizeReason, TickTrigger};
use vigil_core::context::PowerSource;
use vigil_core::persistence::keys;
use vigil_core::targets;
use vigil_core::{ActionValue, ConfigError, VigilConfig};
use vigil_infra::{JsonFileBackend, SimulatedDevice};

/// A config whose timers never fire during a test.
fn quiet_config() -> VigilConfig {
    let mut config = VigilConfig::default();
    config.tick_interval_ms = 3_600_000;
    config.persistence_interval_secs = 3_600;
    config
}

fn orchestrator(device: &SimulatedDevice, dir: &Path, config: VigilConfig) -> Orchestrator {
    try_orchestrator(device, dir, config).unwrap()
}

fn try_orchestrator(
    device: &SimulatedDevice,
    dir: &Path,
    config: VigilConfig,
) -> Result<Orchestrator, ConfigError> {
    Orchestrator::new(
        config,
        Collaborators {
            provider: Box::new(device.provider()),
            handlers: device.handlers(),
            persistence: Arc::new(JsonFileBackend::new(dir)),
            agents: Box::new(standard_agents),
        },
    )
}

#[test]
fn test_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let device = SimulatedDevice::new();

    {
        let mut first = orchestrator(&device, dir.path(), quiet_config());
        first.start().unwrap();
        assert!(first.tick_now().is_some());
        first.report_user_change(targets::DISPLAY_BRIGHTNESS, ActionValue::Int(80));
        first.stop().unwrap();
    }

    let backend = JsonFileBackend::new(dir.path());
    for key in [
        keys::ORCHESTRATOR_STATISTICS,
        keys::USER_PREFERENCES,
        keys::BEHAVIOR_HISTORY,
        keys::BATTERY_HISTORY,
    ] {
        assert!(backend.path_for(key).exists(), "{key} not written");
    }

    let mut second = orchestrator(&device, dir.path(), quiet_config());
    second.start().unwrap();
    let diagnostics = second.diagnostics();
    assert_eq!(diagnostics.state, LifecycleState::Running);
    assert_eq!(diagnostics.statistics.total_ticks, 1);
    assert_eq!(diagnostics.statistics.total_overrides, 1);
    assert_eq!(diagnostics.learner.override_records, 1);
    assert_eq!(diagnostics.learner.learned_preferences, 1);
    assert_eq!(diagnostics.learner.behavior_samples, 1);
    second.stop().unwrap();
}

#[test]
fn test_drop_stops_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let device = SimulatedDevice::new();
    {
        let mut orchestrator = orchestrator(&device, dir.path(), quiet_config());
        orchestrator.start().unwrap();
        orchestrator.tick_now();
    }
    let backend = JsonFileBackend::new(dir.path());
    assert!(backend.path_for(keys::ORCHESTRATOR_STATISTICS).exists());
}

#[test]
fn test_unplugging_reoptimizes_for_battery() {
    let dir = tempfile::tempdir().unwrap();
    let device = SimulatedDevice::new();
    let mut config = quiet_config();
    config.debounce_ms = 50;
    let mut orchestrator = orchestrator(&device, dir.path(), config);
    orchestrator.start().unwrap();

    device.set_power_source(PowerSource::Battery);
    device.set_battery_percent(70.0);
    assert!(orchestrator.request_reoptimization(ReoptimizeReason::PowerSourceChanged));
    thread::sleep(Duration::from_millis(600));

    let diagnostics = orchestrator.diagnostics();
    assert_eq!(diagnostics.statistics.reoptimizations_run, 1);
    assert_eq!(
        diagnostics.last_tick.map(|t| t.trigger),
        Some(TickTrigger::Reoptimize(ReoptimizeReason::PowerSourceChanged))
    );
    assert_eq!(
        device.value(targets::DISPLAY_REFRESH_RATE),
        Some(ActionValue::Int(60))
    );
    orchestrator.stop().unwrap();
}

#[test]
fn test_zero_tick_interval_is_refused_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let device = SimulatedDevice::new();
    let mut config = quiet_config();
    config.tick_interval_ms = 0;

    let result = try_orchestrator(&device, dir.path(), config);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
