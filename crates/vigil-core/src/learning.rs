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

//! Override records, learned preferences, and the read-only view agents consult.

use crate::action::ActionValue;
use crate::context::ContextSignature;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user-initiated change observed shortly after (or instead of) an agent change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// When the user change was observed.
    pub timestamp: DateTime<Utc>,
    /// Target identifier.
    pub target: String,
    /// Value the controller had applied, if the user reverted an agent change.
    pub suggested: Option<ActionValue>,
    /// Value the user chose.
    pub user_value: ActionValue,
    /// Context at the time of the change.
    pub signature: ContextSignature,
}

/// How often a specific user value was seen for a preference key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTally {
    /// The user value.
    pub value: ActionValue,
    /// Number of records carrying it.
    pub count: u32,
    /// Most recent record carrying it.
    pub last_seen: DateTime<Utc>,
}

/// Confidence derived from the number of corroborating overrides.
///
/// `1 - 1/n`, so a single observation carries no confidence and each
/// further agreeing record adds less than the previous one.
pub fn confidence_for(occurrences: u32) -> f32 {
    if occurrences == 0 {
        return 0.0;
    }
    (1.0 - 1.0 / occurrences as f32).clamp(0.0, 1.0)
}

/// Aggregated preference for one (target, context signature) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPreference {
    /// Target identifier.
    pub target: String,
    /// Context the preference applies to.
    pub signature: ContextSignature,
    /// Preferred value: most frequent, most recent on ties.
    pub value: ActionValue,
    /// Number of records agreeing with `value`.
    pub occurrences: u32,
    /// Last time any record for this key was folded in.
    pub last_seen: DateTime<Utc>,
    /// Confidence at `last_seen`, before recency decay.
    pub confidence: f32,
    /// Per-value counters backing `value`.
    #[serde(default)]
    pub tallies: Vec<ValueTally>,
}

impl LearnedPreference {
    /// Seeds a preference from its first record.
    pub fn from_record(record: &OverrideRecord) -> Self {
        let mut preference = Self {
            target: record.target.clone(),
            signature: record.signature,
            value: record.user_value.clone(),
            occurrences: 0,
            last_seen: record.timestamp,
            confidence: 0.0,
            tallies: Vec::new(),
        };
        preference.observe(&record.user_value, record.timestamp);
        preference
    }

    /// Folds one more user value into the preference.
    pub fn observe(&mut self, value: &ActionValue, at: DateTime<Utc>) {
        match self.tallies.iter_mut().find(|t| t.value.same_as(value)) {
            Some(tally) => {
                tally.count += 1;
                tally.last_seen = tally.last_seen.max(at);
            }
            None => self.tallies.push(ValueTally {
                value: value.clone(),
                count: 1,
                last_seen: at,
            }),
        }

        let winner = self
            .tallies
            .iter()
            .max_by(|a, b| a.count.cmp(&b.count).then(a.last_seen.cmp(&b.last_seen)));
        if let Some(winner) = winner {
            self.value = winner.value.clone();
            self.occurrences = winner.count;
        }
        self.last_seen = self.last_seen.max(at);
        self.confidence = confidence_for(self.occurrences);
    }

    /// Confidence after recency decay: halves every `half_life` without a
    /// confirming record.
    pub fn decayed_confidence(&self, now: DateTime<Utc>, half_life: Duration) -> f32 {
        let age = now - self.last_seen;
        if age <= Duration::zero() || half_life <= Duration::zero() {
            return self.confidence;
        }
        let halvings = age.num_milliseconds() as f64 / half_life.num_milliseconds() as f64;
        (self.confidence as f64 * 0.5f64.powf(halvings)) as f32
    }
}

/// A learned value as seen by agents.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceEntry {
    /// Preferred value.
    pub value: ActionValue,
    /// Decayed confidence, 0..=1.
    pub confidence: f32,
}

/// Immutable per-tick view of the learner's state.
///
/// Built once per tick so that every agent of the tick sees the same data.
#[derive(Debug, Clone, Default)]
pub struct PreferenceView {
    entries: HashMap<(String, ContextSignature), PreferenceEntry>,
    threshold: f32,
    battery_drain_per_hour: Option<f32>,
}

impl PreferenceView {
    /// Creates an empty view that respects preferences at or above `threshold`.
    pub fn new(threshold: f32) -> Self {
        Self {
            entries: HashMap::new(),
            threshold,
            battery_drain_per_hour: None,
        }
    }

    /// Adds or replaces an entry.
    pub fn insert(
        &mut self,
        target: impl Into<String>,
        signature: ContextSignature,
        value: ActionValue,
        confidence: f32,
    ) {
        self.entries
            .insert((target.into(), signature), PreferenceEntry { value, confidence });
    }

    /// Records the learner's battery drain estimate.
    pub fn set_battery_drain_per_hour(&mut self, rate: Option<f32>) {
        self.battery_drain_per_hour = rate;
    }

    /// Estimated battery drain in percent per hour while discharging.
    pub fn battery_drain_per_hour(&self) -> Option<f32> {
        self.battery_drain_per_hour
    }

    /// Raw lookup regardless of confidence.
    pub fn get(&self, target: &str, signature: &ContextSignature) -> Option<&PreferenceEntry> {
        self.entries.get(&(target.to_string(), *signature))
    }

    /// The learned value if it is confident enough to be respected.
    pub fn respected(&self, target: &str, signature: &ContextSignature) -> Option<&ActionValue> {
        self.get(target, signature)
            .filter(|e| e.confidence >= self.threshold)
            .map(|e| &e.value)
    }

    /// Confidence threshold in use.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been learned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One raw behavior sample, kept for statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSample {
    /// Tick time.
    pub timestamp: DateTime<Utc>,
    /// Context of the tick.
    pub signature: ContextSignature,
    /// Hottest sensor, °C.
    pub max_temp_c: f32,
    /// Battery charge, percent.
    pub battery_percent: f32,
    /// Actions that remained applied.
    pub actions_applied: u32,
    /// Whether the batch succeeded.
    pub success: bool,
}

/// One battery history sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    /// Sample time.
    pub timestamp: DateTime<Utc>,
    /// Charge, percent.
    pub percent: f32,
    /// Whether the adapter was plugged in.
    pub on_ac: bool,
}

/// Persisted form of the user-preferences document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceDocument {
    /// Override history, oldest first.
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
    /// Learned preferences.
    #[serde(default)]
    pub preferences: Vec<LearnedPreference>,
}
