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

//! Action handlers backed by sysfs attributes.

use super::layout::SysfsLayout;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use vigil_core::targets::{self, performance_mode, rgb_mode};
use vigil_core::{ActionHandler, ActionValue, HandlerError, HandlerRegistry};

/// `EINVAL`, returned by the driver for out-of-range or unknown values.
const EINVAL: i32 = 22;

/// Last value written per target.
///
/// Most Legion attributes are write-only, so this cache is the only record
/// of their state. It is shared with [`super::SysfsContextProvider`].
#[derive(Debug, Default)]
pub struct WrittenValues {
    values: RwLock<HashMap<String, ActionValue>>,
}

impl WrittenValues {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the cache with the firmware defaults of `mode`.
    ///
    /// Used at startup, before anything was written, so that rollback has a
    /// value to return to.
    pub fn seeded(mode: &str) -> Self {
        let cache = Self::new();
        let (pl1, pl2, tgp) = match mode {
            performance_mode::QUIET => (35, 65, 60),
            performance_mode::PERFORMANCE => (115, 175, 140),
            _ => (55, 115, 100),
        };
        cache.record(targets::CPU_PL1, ActionValue::Int(pl1));
        cache.record(targets::CPU_PL2, ActionValue::Int(pl2));
        cache.record(targets::GPU_TGP, ActionValue::Int(tgp));
        cache.record(targets::FAN_SPEED, ActionValue::Int(0));
        cache.record(targets::RGB_MODE, ActionValue::from("static"));
        cache.record(targets::KEYBOARD_BACKLIGHT, ActionValue::Int(100));
        cache
    }

    /// Stores the value last written to `target`.
    pub fn record(&self, target: &str, value: ActionValue) {
        if let Ok(mut values) = self.values.write() {
            values.insert(target.to_string(), value);
        }
    }

    /// Value last written to `target`.
    pub fn get(&self, target: &str) -> Option<ActionValue> {
        self.values.read().ok()?.get(target).cloned()
    }
}

/// How a target's value maps to the text of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Unsigned decimal, bounded by the driver.
    Unsigned {
        /// Largest value the driver accepts.
        max: u64,
    },
    /// One of a fixed set of keywords.
    Keyword(&'static [&'static str]),
    /// `1` / `0`.
    Flag,
}

impl Encoding {
    /// Renders `value` for the driver.
    pub fn encode(&self, target: &str, value: &ActionValue) -> Result<String, HandlerError> {
        let unsupported = || HandlerError::Unsupported {
            target: target.to_string(),
            value: value.clone(),
        };
        match (self, value) {
            (Encoding::Unsigned { max }, v) if v.is_numeric() => {
                let n = v.as_f64().ok_or_else(unsupported)?.round();
                if n < 0.0 || n > *max as f64 {
                    return Err(unsupported());
                }
                Ok(format!("{}", n as u64))
            }
            (Encoding::Keyword(words), ActionValue::Text(word)) => words
                .iter()
                .find(|w| **w == word.as_str())
                .map(|w| w.to_string())
                .ok_or_else(unsupported),
            (Encoding::Flag, ActionValue::Bool(on)) => Ok(if *on { "1" } else { "0" }.to_string()),
            _ => Err(unsupported()),
        }
    }

    /// Parses attribute text back into a value.
    pub fn decode(&self, text: &str) -> Option<ActionValue> {
        let text = text.trim();
        match self {
            Encoding::Unsigned { .. } => text.parse::<i64>().ok().map(ActionValue::Int),
            Encoding::Keyword(words) => words
                .iter()
                .find(|w| **w == text)
                .map(|w| ActionValue::from(*w)),
            Encoding::Flag => match text {
                "1" | "Y" => Some(ActionValue::Bool(true)),
                "0" | "N" => Some(ActionValue::Bool(false)),
                _ => None,
            },
        }
    }
}

/// Writes one target to one or more attribute files.
#[derive(Debug)]
pub struct SysfsAttributeHandler {
    target: String,
    files: Vec<PathBuf>,
    encoding: Encoding,
    readable: bool,
    written: Arc<WrittenValues>,
}

impl SysfsAttributeHandler {
    /// Creates a handler for a write-only attribute.
    pub fn write_only(
        target: &str,
        files: Vec<PathBuf>,
        encoding: Encoding,
        written: Arc<WrittenValues>,
    ) -> Self {
        Self {
            target: target.to_string(),
            files,
            encoding,
            readable: false,
            written,
        }
    }

    /// Creates a handler for an attribute whose first file can be read back.
    pub fn read_write(
        target: &str,
        file: PathBuf,
        encoding: Encoding,
        written: Arc<WrittenValues>,
    ) -> Self {
        Self {
            readable: true,
            ..Self::write_only(target, vec![file], encoding, written)
        }
    }

    fn read_back(&self) -> Option<ActionValue> {
        let file = self.files.first()?;
        let text = fs::read_to_string(file).ok()?;
        self.encoding.decode(&text)
    }
}

/// Maps a failed attribute write to a handler error.
pub fn write_error(target: &str, source: io::Error) -> HandlerError {
    if source.raw_os_error() == Some(EINVAL) || source.kind() == io::ErrorKind::InvalidInput {
        HandlerError::Rejected {
            target: target.to_string(),
            message: format!("driver refused the value ({source})"),
        }
    } else {
        HandlerError::Io {
            target: target.to_string(),
            source,
        }
    }
}

impl ActionHandler for SysfsAttributeHandler {
    fn apply(&self, value: &ActionValue) -> Result<ActionValue, HandlerError> {
        let text = self.encoding.encode(&self.target, value)?;
        let previous = self.current().unwrap_or_else(|| value.clone());
        for file in &self.files {
            fs::write(file, &text).map_err(|e| write_error(&self.target, e))?;
        }
        log::debug!("Sysfs: {} = {} ({} file(s))", self.target, text, self.files.len());
        let stored = self.encoding.decode(&text).unwrap_or_else(|| value.clone());
        self.written.record(&self.target, stored);
        Ok(previous)
    }

    fn current(&self) -> Option<ActionValue> {
        if self.readable {
            if let Some(value) = self.read_back() {
                return Some(value);
            }
        }
        self.written.get(&self.target)
    }
}

/// Panel brightness through the backlight class, in percent of
/// `max_brightness`.
#[derive(Debug)]
pub struct BacklightHandler {
    device: PathBuf,
}

impl BacklightHandler {
    /// Creates a handler for a backlight device directory.
    pub fn new(device: PathBuf) -> Self {
        Self { device }
    }

    fn read_raw(&self, name: &str) -> io::Result<u64> {
        let text = fs::read_to_string(self.device.join(name))?;
        text.trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Current brightness in percent.
    pub fn percent(&self) -> io::Result<f32> {
        let max = self.read_raw("max_brightness")?.max(1);
        let raw = self.read_raw("brightness")?;
        Ok(raw as f32 * 100.0 / max as f32)
    }
}

impl ActionHandler for BacklightHandler {
    fn apply(&self, value: &ActionValue) -> Result<ActionValue, HandlerError> {
        let target = targets::DISPLAY_BRIGHTNESS;
        let percent = value
            .as_f64()
            .filter(|p| (0.0..=100.0).contains(p))
            .ok_or_else(|| HandlerError::Unsupported {
                target: target.to_string(),
                value: value.clone(),
            })?;
        let io_error = |source| HandlerError::Io {
            target: target.to_string(),
            source,
        };
        let previous = self.percent().map_err(io_error)?;
        let max = self.read_raw("max_brightness").map_err(io_error)?;
        let raw = (percent / 100.0 * max as f64).round() as u64;
        fs::write(self.device.join("brightness"), raw.to_string())
            .map_err(|e| write_error(target, e))?;
        Ok(ActionValue::Int(previous.round() as i64))
    }

    fn current(&self) -> Option<ActionValue> {
        self.percent()
            .ok()
            .map(|p| ActionValue::Int(p.round() as i64))
    }
}

/// Registers every handler the layout supports.
///
/// Refresh rate and graphics mode have no sysfs surface on this platform
/// and are left unregistered.
pub fn legion_handlers(layout: &SysfsLayout, written: &Arc<WrittenValues>) -> HandlerRegistry {
    let watts = |max| Encoding::Unsigned { max };
    let wo = |target: &str, names: &[&str], encoding| {
        Arc::new(SysfsAttributeHandler::write_only(
            target,
            names.iter().map(|n| layout.attribute(n)).collect(),
            encoding,
            Arc::clone(written),
        ))
    };

    let mut registry = HandlerRegistry::new()
        .with(targets::CPU_PL1, wo(targets::CPU_PL1, &["cpu_pl1"], watts(140)))
        .with(targets::CPU_PL2, wo(targets::CPU_PL2, &["cpu_pl2"], watts(200)))
        .with(targets::GPU_TGP, wo(targets::GPU_TGP, &["gpu_tgp"], watts(140)))
        .with(
            targets::FAN_SPEED,
            wo(targets::FAN_SPEED, &["fan1_target", "fan2_target"], watts(100)),
        )
        .with(
            targets::RGB_MODE,
            wo(targets::RGB_MODE, &["rgb_mode"], Encoding::Keyword(&rgb_mode::ALL)),
        )
        .with(
            targets::KEYBOARD_BACKLIGHT,
            wo(targets::KEYBOARD_BACKLIGHT, &["rgb_brightness"], watts(100)),
        )
        .with(
            targets::PERFORMANCE_MODE,
            Arc::new(SysfsAttributeHandler::read_write(
                targets::PERFORMANCE_MODE,
                layout.attribute("performance_mode"),
                Encoding::Keyword(&performance_mode::ALL),
                Arc::clone(written),
            )),
        );

    if layout.conservation_mode.is_file() {
        registry.register(
            targets::BATTERY_CONSERVATION,
            Arc::new(SysfsAttributeHandler::read_write(
                targets::BATTERY_CONSERVATION,
                layout.conservation_mode.clone(),
                Encoding::Flag,
                Arc::clone(written),
            )),
        );
    }
    if let Some(device) = layout.backlight_device() {
        registry.register(targets::DISPLAY_BRIGHTNESS, Arc::new(BacklightHandler::new(device)));
    }

    for target in [targets::DISPLAY_REFRESH_RATE, targets::HYBRID_MODE] {
        log::warn!("Sysfs: no handler for {target} on this platform");
    }
    if !registry.contains(targets::DISPLAY_BRIGHTNESS) {
        log::warn!("Sysfs: no backlight device under {:?}", layout.backlight);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_platform() -> (tempfile::TempDir, SysfsLayout) {
        let root = tempfile::tempdir().unwrap();
        let layout = SysfsLayout::under(root.path());
        fs::create_dir_all(&layout.platform).unwrap();
        fs::write(layout.attribute("performance_mode"), "balanced\n").unwrap();
        (root, layout)
    }

    #[test]
    fn test_encoding_rejects_out_of_range_and_unknown_values() {
        let watts = Encoding::Unsigned { max: 140 };
        assert_eq!(watts.encode("GPU_TGP", &ActionValue::Float(99.6)).unwrap(), "100");
        assert!(matches!(
            watts.encode("GPU_TGP", &ActionValue::Int(141)),
            Err(HandlerError::Unsupported { .. })
        ));
        let modes = Encoding::Keyword(&rgb_mode::ALL);
        assert_eq!(modes.encode("RGB_MODE", &ActionValue::from("wave")).unwrap(), "wave");
        assert!(modes.encode("RGB_MODE", &ActionValue::from("disco")).is_err());
        assert_eq!(Encoding::Flag.decode("1\n"), Some(ActionValue::Bool(true)));
    }

    #[test]
    fn test_write_only_attribute_tracks_last_written_value() {
        let (_root, layout) = fake_platform();
        let written = Arc::new(WrittenValues::seeded("balanced"));
        let handlers = legion_handlers(&layout, &written);

        let pl2 = handlers.get(targets::CPU_PL2).unwrap();
        assert_eq!(pl2.current(), Some(ActionValue::Int(115)));
        let previous = pl2.apply(&ActionValue::Int(90)).unwrap();
        assert_eq!(previous, ActionValue::Int(115));
        assert_eq!(fs::read_to_string(layout.attribute("cpu_pl2")).unwrap(), "90");
        assert_eq!(written.get(targets::CPU_PL2), Some(ActionValue::Int(90)));
    }

    #[test]
    fn test_fan_target_writes_both_fans() {
        let (_root, layout) = fake_platform();
        let written = Arc::new(WrittenValues::new());
        let handlers = legion_handlers(&layout, &written);
        handlers
            .get(targets::FAN_SPEED)
            .unwrap()
            .apply(&ActionValue::Int(85))
            .unwrap();
        assert_eq!(fs::read_to_string(layout.attribute("fan1_target")).unwrap(), "85");
        assert_eq!(fs::read_to_string(layout.attribute("fan2_target")).unwrap(), "85");
    }

    #[test]
    fn test_performance_mode_reads_back_from_driver() {
        let (_root, layout) = fake_platform();
        let written = Arc::new(WrittenValues::new());
        let handlers = legion_handlers(&layout, &written);
        let mode = handlers.get(targets::PERFORMANCE_MODE).unwrap();
        assert_eq!(mode.current(), Some(ActionValue::from("balanced")));

        let previous = mode.apply(&ActionValue::from("quiet")).unwrap();
        assert_eq!(previous, ActionValue::from("balanced"));
        // The user flips the mode with Fn+Q.
        fs::write(layout.attribute("performance_mode"), "performance\n").unwrap();
        assert_eq!(mode.current(), Some(ActionValue::from("performance")));
    }

    #[test]
    fn test_backlight_scales_to_max_brightness() {
        let (root, layout) = fake_platform();
        let device = layout.backlight.join("intel_backlight");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("max_brightness"), "400\n").unwrap();
        fs::write(device.join("brightness"), "200\n").unwrap();

        let handlers = legion_handlers(&layout, &Arc::new(WrittenValues::new()));
        let backlight = handlers.get(targets::DISPLAY_BRIGHTNESS).unwrap();
        assert_eq!(backlight.current(), Some(ActionValue::Int(50)));
        assert_eq!(backlight.apply(&ActionValue::Int(70)).unwrap(), ActionValue::Int(50));
        assert_eq!(fs::read_to_string(device.join("brightness")).unwrap(), "280");
        assert!(!handlers.contains(targets::BATTERY_CONSERVATION));
        drop(root);
    }

    #[test]
    fn test_missing_attribute_is_an_io_error() {
        let root = tempfile::tempdir().unwrap();
        let layout = SysfsLayout::under(root.path());
        let handlers = legion_handlers(&layout, &Arc::new(WrittenValues::new()));
        let err = handlers
            .get(targets::GPU_TGP)
            .unwrap()
            .apply(&ActionValue::Int(100))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Io { .. }));
    }
}
