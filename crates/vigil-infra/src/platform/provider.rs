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

//! Context sampling from sysfs, with sysinfo for CPU load and as a fallback
//! temperature source.

use super::attribute::WrittenValues;
use super::layout::SysfsLayout;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use sysinfo::{Components, System};
use vigil_core::context::{
    DisplayState, GpuState, LightingState, PowerLimits, PowerSource, PowerState, ThermalReading,
    ThermalTrend, UserIntent, WorkloadType,
};
use vigil_core::targets::{self, hybrid_mode, performance_mode};
use vigil_core::{ContextError, ContextProvider, ContextSnapshot};

/// Classifies the workload from CPU and GPU utilization, both in percent.
pub fn classify_workload(cpu_percent: f32, gpu_percent: f32) -> WorkloadType {
    if gpu_percent >= 40.0 {
        WorkloadType::Gaming
    } else if cpu_percent >= 70.0 {
        WorkloadType::Mixed
    } else if cpu_percent >= 10.0 || gpu_percent >= 10.0 {
        WorkloadType::Productivity
    } else {
        WorkloadType::Idle
    }
}

struct Sampler {
    system: System,
    last_hottest: Option<f32>,
}

/// Reads the device state for each tick.
pub struct SysfsContextProvider {
    layout: SysfsLayout,
    written: Arc<WrittenValues>,
    intent: Mutex<UserIntent>,
    sampler: Mutex<Sampler>,
}

impl SysfsContextProvider {
    /// Creates a provider over `layout`, sharing the handlers' write cache.
    pub fn new(layout: SysfsLayout, written: Arc<WrittenValues>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            layout,
            written,
            intent: Mutex::new(UserIntent::Balanced),
            sampler: Mutex::new(Sampler {
                system,
                last_hottest: None,
            }),
        }
    }

    /// Sets the intent reported in every snapshot.
    pub fn set_intent(&self, intent: UserIntent) {
        if let Ok(mut current) = self.intent.lock() {
            *current = intent;
        }
    }

    fn temperature(&self, attribute: &str) -> Result<f32, ContextError> {
        read_value(&self.layout.attribute(attribute))
    }

    /// Hottest CPU sensor reported by sysinfo.
    fn fallback_cpu_temperature() -> Option<f32> {
        let components = Components::new_with_refreshed_list();
        components
            .list()
            .iter()
            .filter(|c| {
                let label = c.label().to_lowercase();
                label.contains("cpu") || label.contains("core") || label.contains("package")
            })
            .filter_map(|c| c.temperature())
            .fold(None, |hottest: Option<f32>, t| Some(hottest.map_or(t, |h| h.max(t))))
    }

    fn power(&self) -> Result<PowerState, ContextError> {
        let batteries = self.layout.power_supplies("Battery");
        // No battery at all means a desktop, or a laptop without the driver.
        let source = match self.layout.mains_online() {
            Some(true) => PowerSource::Ac,
            _ if batteries.is_empty() => PowerSource::Ac,
            _ => PowerSource::Battery,
        };
        let battery_percent = match batteries.first() {
            Some(dir) => read_value::<f32>(&dir.join("capacity"))?,
            None => 100.0,
        };

        let performance_mode = fs::read_to_string(self.layout.attribute("performance_mode"))
            .map(|s| s.trim().to_string())
            .ok()
            .or_else(|| self.cached_text(targets::PERFORMANCE_MODE))
            .unwrap_or_else(|| performance_mode::BALANCED.to_string());
        let conservation_mode = read_value::<u8>(&self.layout.conservation_mode)
            .map(|v| v == 1)
            .unwrap_or(false);

        Ok(PowerState {
            source,
            battery_percent,
            limits: PowerLimits {
                cpu_pl1_w: self.cached_number(targets::CPU_PL1),
                cpu_pl2_w: self.cached_number(targets::CPU_PL2),
                gpu_tgp_w: self.cached_number(targets::GPU_TGP),
            },
            performance_mode,
            conservation_mode,
        })
    }

    fn brightness(&self) -> f32 {
        let Some(device) = self.layout.backlight_device() else {
            return 100.0;
        };
        let max = read_value::<f32>(&device.join("max_brightness")).unwrap_or(1.0).max(1.0);
        read_value::<f32>(&device.join("brightness"))
            .map(|raw| raw * 100.0 / max)
            .unwrap_or(100.0)
    }

    fn gpu_busy(&self) -> f32 {
        self.layout
            .gpu_busy_file()
            .and_then(|file| read_value::<f32>(&file).ok())
            .unwrap_or(0.0)
    }

    fn cached_number(&self, target: &str) -> f32 {
        self.written
            .get(target)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32
    }

    fn cached_text(&self, target: &str) -> Option<String> {
        self.written
            .get(target)
            .and_then(|v| v.as_text().map(str::to_string))
    }
}

impl ContextProvider for SysfsContextProvider {
    fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
        let mut sampler = self.sampler.lock().map_err(|_| ContextError::Malformed {
            sensor: "sampler".to_string(),
            message: "sampler lock poisoned".to_string(),
        })?;

        let cpu_temp_c = match self.temperature("cpu_temp") {
            Ok(t) => t,
            Err(e) => match Self::fallback_cpu_temperature() {
                Some(t) => {
                    log::debug!("Sysfs: cpu_temp unavailable ({e}), using sysinfo");
                    t
                }
                None => return Err(e),
            },
        };
        // The dGPU sensor disappears when the GPU is powered down.
        let gpu_temp_c = self.temperature("gpu_temp").unwrap_or(0.0);
        let hottest = cpu_temp_c.max(gpu_temp_c);
        let trend = sampler
            .last_hottest
            .map_or(ThermalTrend::Stable, |last| ThermalTrend::from_delta(hottest - last));
        sampler.last_hottest = Some(hottest);

        sampler.system.refresh_cpu_all();
        let cpu_load = sampler.system.global_cpu_usage();
        let gpu_busy = self.gpu_busy();

        let power = self.power()?;
        let refresh_rate_hz = self
            .written
            .get(targets::DISPLAY_REFRESH_RATE)
            .and_then(|v| v.as_f64())
            .map_or(165, |hz| hz as u32);
        let intent = self.intent.lock().map(|i| *i).unwrap_or_default();

        Ok(ContextSnapshot {
            captured_at: Utc::now(),
            thermal: ThermalReading {
                cpu_temp_c,
                gpu_temp_c,
                trend,
            },
            power,
            gpu: GpuState {
                utilization_percent: gpu_busy,
                active_processes: Vec::new(),
                mode: self
                    .cached_text(targets::HYBRID_MODE)
                    .unwrap_or_else(|| hybrid_mode::HYBRID.to_string()),
            },
            display: DisplayState {
                refresh_rate_hz,
                brightness_percent: self.brightness(),
            },
            lighting: LightingState {
                keyboard_backlight_percent: self.cached_number(targets::KEYBOARD_BACKLIGHT),
            },
            workload: classify_workload(cpu_load, gpu_busy),
            intent,
        })
    }
}

fn read_value<T>(path: &Path) -> Result<T, ContextError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let sensor = || path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ContextError::Sensor {
        sensor: sensor(),
        source,
    })?;
    text.trim().parse::<T>().map_err(|e| ContextError::Malformed {
        sensor: sensor(),
        message: format!("{:?}: {e}", text.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSys {
        _root: tempfile::TempDir,
        layout: SysfsLayout,
    }

    impl FakeSys {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let layout = SysfsLayout::under(root.path());
            fs::create_dir_all(&layout.platform).unwrap();
            let fake = Self { _root: root, layout };
            fake.set_temps(60, 50);
            fs::write(fake.layout.attribute("performance_mode"), "balanced\n").unwrap();
            fake.supply("AC0", "Mains", &[("online", "1")]);
            fake.supply("BAT0", "Battery", &[("capacity", "80")]);
            fake
        }

        fn set_temps(&self, cpu: i32, gpu: i32) {
            fs::write(self.layout.attribute("cpu_temp"), format!("{cpu}\n")).unwrap();
            fs::write(self.layout.attribute("gpu_temp"), format!("{gpu}\n")).unwrap();
        }

        fn supply(&self, name: &str, kind: &str, files: &[(&str, &str)]) {
            let dir = self.layout.power_supply.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("type"), kind).unwrap();
            for (file, value) in files {
                fs::write(dir.join(file), value).unwrap();
            }
        }
    }

    #[test]
    fn test_snapshot_reads_driver_and_power_supply() {
        let fake = FakeSys::new();
        let written = Arc::new(WrittenValues::seeded("balanced"));
        let provider = SysfsContextProvider::new(fake.layout.clone(), written);
        provider.set_intent(UserIntent::Gaming);

        let ctx = provider.snapshot().unwrap();
        assert_eq!(ctx.thermal.cpu_temp_c, 60.0);
        assert_eq!(ctx.thermal.trend, ThermalTrend::Stable);
        assert_eq!(ctx.power.source, PowerSource::Ac);
        assert_eq!(ctx.power.battery_percent, 80.0);
        assert_eq!(ctx.power.performance_mode, "balanced");
        assert_eq!(ctx.power.limits.cpu_pl2_w, 115.0);
        assert_eq!(ctx.intent, UserIntent::Gaming);
    }

    #[test]
    fn test_trend_and_unplugging_are_detected() {
        let fake = FakeSys::new();
        let provider =
            SysfsContextProvider::new(fake.layout.clone(), Arc::new(WrittenValues::new()));
        provider.snapshot().unwrap();

        fake.set_temps(75, 50);
        fs::write(fake.layout.power_supply.join("AC0/online"), "0\n").unwrap();
        let ctx = provider.snapshot().unwrap();
        assert_eq!(ctx.thermal.trend, ThermalTrend::Rising);
        assert_eq!(ctx.power.source, PowerSource::Battery);
    }

    #[test]
    fn test_malformed_battery_level_is_reported() {
        let fake = FakeSys::new();
        fake.supply("BAT0", "Battery", &[("capacity", "lots")]);
        let provider =
            SysfsContextProvider::new(fake.layout.clone(), Arc::new(WrittenValues::new()));
        let err = provider.snapshot().unwrap_err();
        assert!(matches!(err, ContextError::Malformed { .. }));
    }

    #[test]
    fn test_workload_classification() {
        assert_eq!(classify_workload(5.0, 0.0), WorkloadType::Idle);
        assert_eq!(classify_workload(25.0, 0.0), WorkloadType::Productivity);
        assert_eq!(classify_workload(85.0, 5.0), WorkloadType::Mixed);
        assert_eq!(classify_workload(30.0, 90.0), WorkloadType::Gaming);
    }
}
