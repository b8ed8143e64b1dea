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

//! Preference and behavior learner.
//!
//! Two jobs:
//!
//! 1. **Override detection.** Every target the executor changes is watched
//!    for a bounded window. If its handler reports a different value before
//!    the window closes, or the UI reports a user change, an
//!    [`OverrideRecord`] is appended.
//! 2. **Preference aggregation.** Each record is folded into the
//!    [`LearnedPreference`] for its (target, context signature) key. Agents
//!    read the result through an immutable [`PreferenceView`] built once per
//!    tick, with recency decay already applied.
//!
//! The learner also keeps bounded behavior and battery histories.

mod history;

pub use history::BoundedHistory;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use vigil_core::config::LearningConfig;
use vigil_core::learning::{BatterySample, BehaviorSample, PreferenceDocument};
use vigil_core::{
    ActionValue, AgentId, ContextSignature, ContextSnapshot, ExecutionResult, HandlerRegistry,
    LearnedPreference, OutcomeStatus, OverrideRecord, PreferenceView,
};

/// Counts exposed through diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnerSummary {
    /// Override records retained.
    pub override_records: usize,
    /// Learned preferences.
    pub learned_preferences: usize,
    /// Preferences currently above the confidence threshold.
    pub confident_preferences: usize,
    /// Behavior samples retained.
    pub behavior_samples: usize,
    /// Battery samples retained.
    pub battery_samples: usize,
    /// Targets currently watched for overrides.
    pub watched_targets: usize,
    /// Estimated discharge rate, percent per hour.
    pub discharge_rate_per_hour: Option<f32>,
}

/// A target recently changed by the controller.
#[derive(Debug, Clone)]
struct Watch {
    applied: ActionValue,
    agent: AgentId,
    applied_at: DateTime<Utc>,
}

/// Learns user preferences from overrides.
#[derive(Debug)]
pub struct PreferenceLearner {
    window: Duration,
    half_life: Duration,
    battery_interval: Duration,
    threshold: f32,
    overrides: BoundedHistory<OverrideRecord>,
    preferences: BTreeMap<(String, ContextSignature), LearnedPreference>,
    behavior: BoundedHistory<BehaviorSample>,
    battery: BoundedHistory<BatterySample>,
    watches: HashMap<String, Watch>,
}

impl PreferenceLearner {
    /// Creates an empty learner.
    ///
    /// `threshold` is the confidence at which agents must respect a
    /// preference; it is only used for the view and the summary.
    pub fn new(config: &LearningConfig, threshold: f32) -> Self {
        Self {
            window: Duration::seconds(config.override_window_secs as i64),
            half_life: Duration::days(config.preference_half_life_days as i64),
            battery_interval: Duration::seconds(config.battery_sample_interval_secs as i64),
            threshold,
            overrides: BoundedHistory::new(config.override_capacity),
            preferences: BTreeMap::new(),
            behavior: BoundedHistory::new(config.behavior_capacity),
            battery: BoundedHistory::new(config.battery_capacity),
            watches: HashMap::new(),
        }
    }

    /// Replaces the learner's long-lived state with persisted documents.
    pub fn restore(
        &mut self,
        preferences: PreferenceDocument,
        behavior: Vec<BehaviorSample>,
        battery: Vec<BatterySample>,
    ) {
        self.overrides = BoundedHistory::from_vec(preferences.overrides, self.overrides.capacity());
        self.preferences = preferences
            .preferences
            .into_iter()
            .map(|p| ((p.target.clone(), p.signature), p))
            .collect();

        // Older documents may carry only the raw records.
        if self.preferences.is_empty() && !self.overrides.is_empty() {
            let records = self.overrides.to_vec();
            for record in &records {
                self.fold(record);
            }
        }

        self.behavior = BoundedHistory::from_vec(behavior, self.behavior.capacity());
        self.battery = BoundedHistory::from_vec(battery, self.battery.capacity());
        log::info!(
            "Learner: restored {} overrides, {} preferences, {} behavior samples, {} battery samples.",
            self.overrides.len(),
            self.preferences.len(),
            self.behavior.len(),
            self.battery.len()
        );
    }

    /// Starts watching applied targets and stores a behavior sample.
    pub fn observe_execution(
        &mut self,
        context: &ContextSnapshot,
        result: &ExecutionResult,
        now: DateTime<Utc>,
    ) {
        for outcome in &result.outcomes {
            match outcome.status {
                OutcomeStatus::Applied => {
                    self.watches.insert(
                        outcome.action.target.clone(),
                        Watch {
                            applied: outcome.action.value.clone(),
                            agent: outcome.agent,
                            applied_at: now,
                        },
                    );
                }
                OutcomeStatus::RolledBack | OutcomeStatus::RollbackFailed(_) => {
                    self.watches.remove(&outcome.action.target);
                }
                OutcomeStatus::Failed(_) => {}
            }
        }

        self.behavior.push(BehaviorSample {
            timestamp: now,
            signature: context.signature(),
            max_temp_c: context.thermal.hottest(),
            battery_percent: context.power.battery_percent,
            actions_applied: result.applied_count() as u32,
            success: result.success,
        });
    }

    /// Checks watched targets for values changed behind the controller's back.
    ///
    /// Expired watches are dropped. Every drift found inside the window becomes
    /// an override recorded under `signature`.
    pub fn poll_overrides(
        &mut self,
        handlers: &HandlerRegistry,
        signature: ContextSignature,
        now: DateTime<Utc>,
    ) -> Vec<OverrideRecord> {
        let window = self.window;
        self.watches.retain(|_, w| now - w.applied_at <= window);

        let mut drifted: Vec<(String, Watch, ActionValue)> = Vec::new();
        for (target, watch) in &self.watches {
            let current = handlers.get(target).and_then(|h| h.current());
            if let Some(current) = current {
                if !current.same_as(&watch.applied) {
                    drifted.push((target.clone(), watch.clone(), current));
                }
            }
        }
        // Stable record order across HashMap iteration.
        drifted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records = Vec::with_capacity(drifted.len());
        for (target, watch, user_value) in drifted {
            self.watches.remove(&target);
            log::info!(
                "Learner: {} changed to {} within {}s of {} setting {}",
                target,
                user_value,
                window.num_seconds(),
                watch.agent,
                watch.applied
            );
            let record = OverrideRecord {
                timestamp: now,
                target,
                suggested: Some(watch.applied),
                user_value,
                signature,
            };
            self.record_override(record.clone());
            records.push(record);
        }
        records
    }

    /// Records a change the user made through another channel (UI, hotkey).
    ///
    /// If the controller changed the same target within the window, the
    /// record carries the value it had applied.
    pub fn record_user_change(
        &mut self,
        target: &str,
        value: ActionValue,
        signature: ContextSignature,
        now: DateTime<Utc>,
    ) -> OverrideRecord {
        let suggested = self
            .watches
            .remove(target)
            .filter(|w| now - w.applied_at <= self.window)
            .map(|w| w.applied);
        let record = OverrideRecord {
            timestamp: now,
            target: target.to_string(),
            suggested,
            user_value: value,
            signature,
        };
        log::info!(
            "Learner: user set {} = {} ({})",
            record.target,
            record.user_value,
            record.signature
        );
        self.record_override(record.clone());
        record
    }

    /// Appends a record and folds it into its preference.
    pub fn record_override(&mut self, record: OverrideRecord) {
        self.fold(&record);
        self.overrides.push(record);
    }

    fn fold(&mut self, record: &OverrideRecord) {
        let key = (record.target.clone(), record.signature);
        let preference = self
            .preferences
            .entry(key)
            .and_modify(|p| p.observe(&record.user_value, record.timestamp))
            .or_insert_with(|| LearnedPreference::from_record(record));
        log::debug!(
            "Learner: {} @ {} prefers {} (n={}, confidence={:.2})",
            preference.target,
            preference.signature,
            preference.value,
            preference.occurrences,
            preference.confidence
        );
    }

    /// The learned preference for a key, without decay.
    pub fn preference(
        &self,
        target: &str,
        signature: &ContextSignature,
    ) -> Option<&LearnedPreference> {
        self.preferences.get(&(target.to_string(), *signature))
    }

    /// Builds the read-only view handed to agents for one tick.
    pub fn view(&self, now: DateTime<Utc>) -> PreferenceView {
        let mut view = PreferenceView::new(self.threshold);
        for preference in self.preferences.values() {
            view.insert(
                preference.target.clone(),
                preference.signature,
                preference.value.clone(),
                preference.decayed_confidence(now, self.half_life),
            );
        }
        view.set_battery_drain_per_hour(self.discharge_rate_per_hour());
        view
    }

    /// Stores a battery sample unless one was taken within the sample interval.
    pub fn sample_battery(&mut self, context: &ContextSnapshot, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.battery.last() {
            if now - last.timestamp < self.battery_interval {
                return false;
            }
        }
        self.battery.push(BatterySample {
            timestamp: now,
            percent: context.power.battery_percent,
            on_ac: !context.power.on_battery(),
        });
        true
    }

    /// Discharge rate over the most recent uninterrupted run on battery, in
    /// percent per hour. `None` without at least two samples in that run.
    pub fn discharge_rate_per_hour(&self) -> Option<f32> {
        let mut run = self.battery.iter().rev().take_while(|s| !s.on_ac);
        let newest = run.next()?;
        let oldest = run.last()?;

        let hours = (newest.timestamp - oldest.timestamp).num_seconds() as f32 / 3600.0;
        if hours <= 0.0 {
            return None;
        }
        Some(((oldest.percent - newest.percent) / hours).max(0.0))
    }

    /// Counts for diagnostics.
    pub fn summary(&self, now: DateTime<Utc>) -> LearnerSummary {
        let confident = self
            .preferences
            .values()
            .filter(|p| p.decayed_confidence(now, self.half_life) >= self.threshold)
            .count();
        LearnerSummary {
            override_records: self.overrides.len(),
            learned_preferences: self.preferences.len(),
            confident_preferences: confident,
            behavior_samples: self.behavior.len(),
            battery_samples: self.battery.len(),
            watched_targets: self.watches.len(),
            discharge_rate_per_hour: self.discharge_rate_per_hour(),
        }
    }

    /// Persistable override history and preferences.
    pub fn preference_document(&self) -> PreferenceDocument {
        PreferenceDocument {
            overrides: self.overrides.to_vec(),
            preferences: self.preferences.values().cloned().collect(),
        }
    }

    /// Persistable behavior history.
    pub fn behavior_samples(&self) -> Vec<BehaviorSample> {
        self.behavior.to_vec()
    }

    /// Persistable battery history.
    pub fn battery_samples(&self) -> Vec<BatterySample> {
        self.battery.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};
    use vigil_core::context::{PowerSource, UserIntent, WorkloadType};
    use vigil_core::{Action, ActionHandler, ActionOutcome, HandlerError};

    struct Knob(Mutex<ActionValue>);

    impl ActionHandler for Knob {
        fn apply(&self, value: &ActionValue) -> Result<ActionValue, HandlerError> {
            Ok(std::mem::replace(&mut *self.0.lock().unwrap(), value.clone()))
        }

        fn current(&self) -> Option<ActionValue> {
            Some(self.0.lock().unwrap().clone())
        }
    }

    fn signature() -> ContextSignature {
        ContextSignature::new(
            PowerSource::Battery,
            WorkloadType::Productivity,
            UserIntent::Balanced,
        )
    }

    fn learner() -> PreferenceLearner {
        PreferenceLearner::new(&LearningConfig::default(), 0.6)
    }

    fn applied(target: &str, value: i64) -> ExecutionResult {
        let mut result = ExecutionResult::empty();
        result.outcomes.push(ActionOutcome {
            agent: AgentId::Display,
            action: Action::proactive(target, value, "test"),
            status: OutcomeStatus::Applied,
            previous: Some(ActionValue::Int(100)),
        });
        result
    }

    fn record(value: i64, at: DateTime<Utc>) -> OverrideRecord {
        OverrideRecord {
            timestamp: at,
            target: "DISPLAY_BRIGHTNESS".into(),
            suggested: Some(ActionValue::Int(40)),
            user_value: ActionValue::Int(value),
            signature: signature(),
        }
    }

    #[test]
    fn test_confidence_strictly_increases_with_corroboration() {
        let mut learner = learner();
        let t0 = Utc::now();
        let mut last = -1.0f32;
        for i in 0..3 {
            learner.record_override(record(70, t0 + Duration::minutes(i)));
            let pref = learner.preference("DISPLAY_BRIGHTNESS", &signature()).unwrap();
            assert_eq!(pref.value, ActionValue::Int(70));
            assert!(pref.confidence > last);
            assert!(pref.confidence <= 1.0);
            last = pref.confidence;
        }
        let pref = learner.preference("DISPLAY_BRIGHTNESS", &signature()).unwrap();
        assert_eq!(pref.occurrences, 3);

        let view = learner.view(t0 + Duration::minutes(3));
        assert_eq!(
            view.respected("DISPLAY_BRIGHTNESS", &signature()),
            Some(&ActionValue::Int(70))
        );
    }

    #[test]
    fn test_old_preferences_decay_below_threshold() {
        let mut learner = learner();
        let t0 = Utc::now();
        for i in 0..3 {
            learner.record_override(record(70, t0 + Duration::seconds(i)));
        }
        let view = learner.view(t0 + Duration::days(30));
        let entry = view.get("DISPLAY_BRIGHTNESS", &signature()).unwrap();
        assert!(entry.confidence < 0.6);
        assert!(view.respected("DISPLAY_BRIGHTNESS", &signature()).is_none());
    }

    #[test]
    fn test_polling_detects_drift_inside_window() {
        let mut learner = learner();
        let knob = Arc::new(Knob(Mutex::new(ActionValue::Int(40))));
        let handlers = HandlerRegistry::new().with("DISPLAY_BRIGHTNESS", knob.clone());
        let t0 = Utc::now();

        learner.observe_execution(&ContextSnapshot::default(), &applied("DISPLAY_BRIGHTNESS", 40), t0);
        assert!(learner
            .poll_overrides(&handlers, signature(), t0 + Duration::seconds(1))
            .is_empty());

        knob.apply(&ActionValue::Int(70)).unwrap();
        let records = learner.poll_overrides(&handlers, signature(), t0 + Duration::seconds(5));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].suggested, Some(ActionValue::Int(40)));
        assert_eq!(records[0].user_value, ActionValue::Int(70));
        assert_eq!(learner.summary(t0).override_records, 1);
        assert_eq!(learner.summary(t0).watched_targets, 0);
    }

    #[test]
    fn test_drift_after_window_is_ignored() {
        let mut learner = learner();
        let knob = Arc::new(Knob(Mutex::new(ActionValue::Int(40))));
        let handlers = HandlerRegistry::new().with("DISPLAY_BRIGHTNESS", knob.clone());
        let t0 = Utc::now();

        learner.observe_execution(&ContextSnapshot::default(), &applied("DISPLAY_BRIGHTNESS", 40), t0);
        knob.apply(&ActionValue::Int(70)).unwrap();
        let records = learner.poll_overrides(&handlers, signature(), t0 + Duration::seconds(31));
        assert!(records.is_empty());
        assert_eq!(learner.summary(t0).override_records, 0);
    }

    #[test]
    fn test_user_change_picks_up_suggested_value() {
        let mut learner = learner();
        let t0 = Utc::now();
        learner.observe_execution(&ContextSnapshot::default(), &applied("DISPLAY_BRIGHTNESS", 40), t0);

        let record = learner.record_user_change(
            "DISPLAY_BRIGHTNESS",
            ActionValue::Int(70),
            signature(),
            t0 + Duration::seconds(2),
        );
        assert_eq!(record.suggested, Some(ActionValue::Int(40)));

        let unrelated = learner.record_user_change(
            "KEYBOARD_BACKLIGHT",
            ActionValue::Int(0),
            signature(),
            t0 + Duration::seconds(3),
        );
        assert_eq!(unrelated.suggested, None);
        assert_eq!(learner.summary(t0).learned_preferences, 2);
    }

    #[test]
    fn test_histories_are_bounded() {
        let config = LearningConfig {
            override_capacity: 2,
            behavior_capacity: 3,
            ..LearningConfig::default()
        };
        let mut learner = PreferenceLearner::new(&config, 0.6);
        let t0 = Utc::now();
        for i in 0..5 {
            learner.record_override(record(70, t0 + Duration::seconds(i)));
            learner.observe_execution(&ContextSnapshot::default(), &ExecutionResult::empty(), t0);
        }
        let summary = learner.summary(t0);
        assert_eq!(summary.override_records, 2);
        assert_eq!(summary.behavior_samples, 3);
        // Aggregation keeps counting past the record capacity.
        assert_eq!(
            learner.preference("DISPLAY_BRIGHTNESS", &signature()).unwrap().occurrences,
            5
        );
    }

    #[test]
    fn test_battery_sampling_interval_and_discharge_rate() {
        let mut learner = learner();
        let t0 = Utc::now();
        let mut ctx = ContextSnapshot::default();
        ctx.power.source = PowerSource::Battery;

        ctx.power.battery_percent = 80.0;
        assert!(learner.sample_battery(&ctx, t0));
        assert!(!learner.sample_battery(&ctx, t0 + Duration::seconds(10)));
        assert_eq!(learner.discharge_rate_per_hour(), None);

        ctx.power.battery_percent = 70.0;
        assert!(learner.sample_battery(&ctx, t0 + Duration::minutes(30)));
        assert_relative_eq!(learner.discharge_rate_per_hour().unwrap(), 20.0, epsilon = 1e-3);

        ctx.power.source = PowerSource::Ac;
        assert!(learner.sample_battery(&ctx, t0 + Duration::minutes(31)));
        assert_eq!(learner.discharge_rate_per_hour(), None);
    }

    #[test]
    fn test_restore_round_trip_and_rebuild_from_records() {
        let mut learner = learner();
        let t0 = Utc::now();
        learner.record_override(record(70, t0));
        learner.record_override(record(70, t0 + Duration::seconds(1)));
        let doc = learner.preference_document();

        let mut restored = self::learner();
        restored.restore(doc.clone(), Vec::new(), Vec::new());
        assert_eq!(restored.preference_document(), doc);

        let mut rebuilt = self::learner();
        rebuilt.restore(
            PreferenceDocument {
                overrides: doc.overrides.clone(),
                preferences: Vec::new(),
            },
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(
            rebuilt.preference("DISPLAY_BRIGHTNESS", &signature()).unwrap().occurrences,
            2
        );
    }
}
