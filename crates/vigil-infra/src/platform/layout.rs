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

//! Where the relevant sysfs files live.

use std::fs;
use std::path::{Path, PathBuf};

/// Platform driver directory of the Legion Slim 7i Gen 9 (16IRX9) module.
pub const LEGION_PLATFORM_DIR: &str = "/sys/devices/platform/legion_laptop_16irx9";
/// Linux power-supply class.
pub const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";
/// Linux backlight class.
pub const BACKLIGHT_DIR: &str = "/sys/class/backlight";
/// DRM class, searched for `gpu_busy_percent`.
pub const DRM_DIR: &str = "/sys/class/drm";
/// Battery conservation switch exposed by `ideapad_acpi`.
pub const CONSERVATION_MODE_FILE: &str =
    "/sys/bus/platform/drivers/ideapad_acpi/VPC2004:00/conservation_mode";

/// Resolved sysfs paths.
///
/// [`SysfsLayout::under`] re-roots every path, which lets tests build a fake
/// tree in a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsLayout {
    /// Legion platform driver directory.
    pub platform: PathBuf,
    /// Power-supply class directory.
    pub power_supply: PathBuf,
    /// Backlight class directory.
    pub backlight: PathBuf,
    /// DRM class directory.
    pub drm: PathBuf,
    /// Conservation mode file.
    pub conservation_mode: PathBuf,
}

impl SysfsLayout {
    /// The live system paths.
    pub fn system() -> Self {
        Self::under(Path::new("/"))
    }

    /// The same layout mirrored below `root`.
    pub fn under(root: &Path) -> Self {
        let rebase = |absolute: &str| root.join(absolute.trim_start_matches('/'));
        Self {
            platform: rebase(LEGION_PLATFORM_DIR),
            power_supply: rebase(POWER_SUPPLY_DIR),
            backlight: rebase(BACKLIGHT_DIR),
            drm: rebase(DRM_DIR),
            conservation_mode: rebase(CONSERVATION_MODE_FILE),
        }
    }

    /// A file of the platform driver.
    pub fn attribute(&self, name: &str) -> PathBuf {
        self.platform.join(name)
    }

    /// Whether the platform driver is loaded.
    pub fn driver_present(&self) -> bool {
        self.platform.is_dir()
    }

    /// First backlight device, by name order.
    pub fn backlight_device(&self) -> Option<PathBuf> {
        sorted_entries(&self.backlight)
            .into_iter()
            .find(|dir| dir.join("brightness").is_file())
    }

    /// Power supplies whose `type` file matches `kind` (`Mains`, `Battery`).
    pub fn power_supplies(&self, kind: &str) -> Vec<PathBuf> {
        sorted_entries(&self.power_supply)
            .into_iter()
            .filter(|dir| {
                fs::read_to_string(dir.join("type"))
                    .map(|t| t.trim() == kind)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Whether any mains adapter reports `online`. `None` when the machine
    /// has no mains supply entry at all.
    pub fn mains_online(&self) -> Option<bool> {
        let mains = self.power_supplies("Mains");
        if mains.is_empty() {
            return None;
        }
        Some(mains.iter().any(|dir| {
            fs::read_to_string(dir.join("online"))
                .map(|v| v.trim() == "1")
                .unwrap_or(false)
        }))
    }

    /// First `gpu_busy_percent` file under the DRM class.
    pub fn gpu_busy_file(&self) -> Option<PathBuf> {
        sorted_entries(&self.drm)
            .into_iter()
            .map(|card| card.join("device").join("gpu_busy_percent"))
            .find(|file| file.is_file())
    }
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self::system()
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}
