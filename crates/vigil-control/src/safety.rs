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

//! Hardware-safety bounds enforcement.
//!
//! The validator is a pure function over (action, bounds). Non-critical
//! numeric values outside their range are clamped and marked as adjusted;
//! values for hard-safety-critical targets are rejected outright.

use std::collections::HashMap;
use thiserror::Error;
use vigil_core::config::{BoundRule, SafetyBoundConfig};
use vigil_core::{ActionValue, AgentId, ResolvedAction};

/// An action refused by the validator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SafetyViolation {
    /// Numeric value outside the bounds of a critical target.
    #[error("{agent} requested {target}={value}, outside hard bounds [{min}, {max}]")]
    OutOfBounds {
        /// Proposing agent.
        agent: AgentId,
        /// Target identifier.
        target: String,
        /// Requested value.
        value: ActionValue,
        /// Lowest accepted value.
        min: f64,
        /// Highest accepted value.
        max: f64,
    },
    /// The value kind does not match the bound.
    #[error("{agent} requested {target}={value}, expected {expected}")]
    TypeMismatch {
        /// Proposing agent.
        agent: AgentId,
        /// Target identifier.
        target: String,
        /// Requested value.
        value: ActionValue,
        /// What the bound accepts.
        expected: &'static str,
    },
    /// The value is not in the allowed set.
    #[error("{agent} requested {target}={value}, not in the allowed set")]
    NotAllowed {
        /// Proposing agent.
        agent: AgentId,
        /// Target identifier.
        target: String,
        /// Requested value.
        value: ActionValue,
    },
}

impl SafetyViolation {
    /// The target the violation refers to.
    pub fn target(&self) -> &str {
        match self {
            SafetyViolation::OutOfBounds { target, .. }
            | SafetyViolation::TypeMismatch { target, .. }
            | SafetyViolation::NotAllowed { target, .. } => target,
        }
    }
}

/// Outcome of validating one action.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Within bounds, unchanged.
    Accepted(ResolvedAction),
    /// Clamped into bounds. The action is still executed.
    Adjusted {
        /// The clamped action, with `adjusted` set.
        action: ResolvedAction,
        /// The value originally requested.
        original: ActionValue,
    },
    /// Refused.
    Rejected(SafetyViolation),
}

impl Verdict {
    /// The action to execute, if any.
    pub fn into_action(self) -> Option<ResolvedAction> {
        match self {
            Verdict::Accepted(action) | Verdict::Adjusted { action, .. } => Some(action),
            Verdict::Rejected(_) => None,
        }
    }
}

/// Holds the bounds for every constrained target.
#[derive(Debug, Clone, Default)]
pub struct SafetyValidator {
    bounds: HashMap<String, SafetyBoundConfig>,
}

impl SafetyValidator {
    /// Builds a validator from configured bounds. Later entries for the same
    /// target replace earlier ones.
    pub fn new(bounds: &[SafetyBoundConfig]) -> Self {
        let bounds = bounds
            .iter()
            .map(|b| (b.target.clone(), b.clone()))
            .collect();
        Self { bounds }
    }

    /// The bound configured for `target`, if any.
    pub fn bound(&self, target: &str) -> Option<&SafetyBoundConfig> {
        self.bounds.get(target)
    }

    /// Validates one resolved action. Targets without a bound pass through.
    pub fn validate(&self, action: ResolvedAction) -> Verdict {
        let Some(bound) = self.bounds.get(action.target()) else {
            return Verdict::Accepted(action);
        };

        match &bound.rule {
            BoundRule::Range { min, max } => self.check_range(action, *min, *max, bound.critical),
            BoundRule::AllowedSet(allowed) => self.check_allowed(action, allowed, bound.critical),
            BoundRule::Boolean => match action.action.value {
                ActionValue::Bool(_) => Verdict::Accepted(action),
                _ => Verdict::Rejected(type_mismatch(&action, "a boolean")),
            },
        }
    }

    fn check_range(&self, action: ResolvedAction, min: f64, max: f64, critical: bool) -> Verdict {
        let value = match action.action.value.as_f64() {
            Some(v) if v.is_nan() => {
                return Verdict::Rejected(type_mismatch(&action, "a finite number"));
            }
            Some(v) => v,
            None => return Verdict::Rejected(type_mismatch(&action, "a number")),
        };

        if (min..=max).contains(&value) {
            return Verdict::Accepted(action);
        }

        if critical {
            return Verdict::Rejected(SafetyViolation::OutOfBounds {
                agent: action.agent,
                target: action.action.target.clone(),
                value: action.action.value.clone(),
                min,
                max,
            });
        }

        let clamped = match action.action.value {
            // Stay integral, and stay inside the range even for fractional bounds.
            ActionValue::Int(v) => {
                let lo = min.ceil() as i64;
                let hi = max.floor() as i64;
                if lo > hi {
                    return Verdict::Rejected(type_mismatch(&action, "a fractional value"));
                }
                ActionValue::Int(v.clamp(lo, hi))
            }
            _ => ActionValue::Float(value.clamp(min, max)),
        };
        adjust(action, clamped, &format!("[{min}, {max}]"))
    }

    fn check_allowed(
        &self,
        action: ResolvedAction,
        allowed: &[ActionValue],
        critical: bool,
    ) -> Verdict {
        if allowed.iter().any(|v| v.same_as(&action.action.value)) {
            return Verdict::Accepted(action);
        }

        // Numeric sets snap to the nearest allowed value, ties to the lower one.
        let requested = action.action.value.as_f64();
        let all_numeric = allowed.iter().all(ActionValue::is_numeric);
        if let (false, true, Some(requested)) = (critical, all_numeric, requested) {
            let nearest = allowed
                .iter()
                .filter_map(|v| v.as_f64().map(|n| (v, n)))
                .min_by(|(_, a), (_, b)| {
                    let da = (a - requested).abs();
                    let db = (b - requested).abs();
                    da.total_cmp(&db).then(a.total_cmp(b))
                });
            if let Some((value, _)) = nearest {
                let value = value.clone();
                return adjust(action, value, "allowed set");
            }
        }

        Verdict::Rejected(SafetyViolation::NotAllowed {
            agent: action.agent,
            target: action.action.target.clone(),
            value: action.action.value.clone(),
        })
    }
}

fn adjust(mut action: ResolvedAction, value: ActionValue, bound: &str) -> Verdict {
    let original = std::mem::replace(&mut action.action.value, value);
    action.action.reason = format!(
        "{} [adjusted: {} → {} to fit {}]",
        action.action.reason, original, action.action.value, bound
    );
    action.adjusted = true;
    log::info!(
        "Safety: {} adjusted {} → {} for {}",
        action.action.target,
        original,
        action.action.value,
        action.agent
    );
    Verdict::Adjusted { action, original }
}

fn type_mismatch(action: &ResolvedAction, expected: &'static str) -> SafetyViolation {
    SafetyViolation::TypeMismatch {
        agent: action.agent,
        target: action.action.target.clone(),
        value: action.action.value.clone(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::config::default_safety_bounds;
    use vigil_core::{Action, Priority};

    fn resolved(target: &str, value: impl Into<ActionValue>) -> ResolvedAction {
        ResolvedAction::new(
            AgentId::Power,
            Priority::High,
            Action::proactive(target, value, "test"),
        )
    }

    #[test]
    fn test_out_of_range_is_clamped_and_marked() {
        let validator = SafetyValidator::new(&[SafetyBoundConfig::range("CPU_PL2", 45.0, 135.0)]);
        match validator.validate(resolved("CPU_PL2", 200)) {
            Verdict::Adjusted { action, original } => {
                assert_eq!(action.action.value, ActionValue::Int(135));
                assert!(action.adjusted);
                assert!(action.action.reason.contains("adjusted"));
                assert_eq!(original, ActionValue::Int(200));
            }
            other => panic!("expected adjustment, got {other:?}"),
        }
    }

    #[test]
    fn test_clamp_to_lower_bound() {
        let validator = SafetyValidator::new(&[SafetyBoundConfig::range("GPU_TGP", 35.0, 140.0)]);
        let action = validator.validate(resolved("GPU_TGP", 10)).into_action().unwrap();
        assert_eq!(action.action.value, ActionValue::Int(35));
        let action = validator
            .validate(resolved("GPU_TGP", 150.5))
            .into_action()
            .unwrap();
        assert_eq!(action.action.value, ActionValue::Float(140.0));
    }

    #[test]
    fn test_in_range_is_untouched() {
        let validator = SafetyValidator::new(&default_safety_bounds());
        let verdict = validator.validate(resolved("CPU_PL1", 55));
        assert!(matches!(verdict, Verdict::Accepted(ref a) if !a.adjusted));
    }

    #[test]
    fn test_critical_target_rejects_instead_of_clamping() {
        let validator = SafetyValidator::new(&default_safety_bounds());
        let verdict = validator.validate(resolved("FAN_SPEED", 120));
        match verdict {
            Verdict::Rejected(SafetyViolation::OutOfBounds { target, max, .. }) => {
                assert_eq!(target, "FAN_SPEED");
                assert_eq!(max, 100.0);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_allowed_set_snaps_numeric_and_rejects_text() {
        let validator = SafetyValidator::new(&default_safety_bounds());
        let snapped = validator
            .validate(resolved("DISPLAY_REFRESH_RATE", 144))
            .into_action()
            .unwrap();
        assert_eq!(snapped.action.value, ActionValue::Int(165));
        assert!(snapped.adjusted);

        let verdict = validator.validate(resolved("PERFORMANCE_MODE", "turbo"));
        assert!(matches!(
            verdict,
            Verdict::Rejected(SafetyViolation::NotAllowed { .. })
        ));
        assert!(matches!(
            validator.validate(resolved("PERFORMANCE_MODE", "quiet")),
            Verdict::Accepted(_)
        ));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let validator = SafetyValidator::new(&default_safety_bounds());
        assert!(matches!(
            validator.validate(resolved("CPU_PL1", "lots")),
            Verdict::Rejected(SafetyViolation::TypeMismatch { .. })
        ));
        assert!(matches!(
            validator.validate(resolved("BATTERY_CONSERVATION", 1)),
            Verdict::Rejected(SafetyViolation::TypeMismatch { .. })
        ));
        assert!(matches!(
            validator.validate(resolved("CPU_PL1", f64::NAN)),
            Verdict::Rejected(SafetyViolation::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unbounded_target_passes_through() {
        let validator = SafetyValidator::new(&[]);
        let action = resolved("VENDOR_SPECIFIC", 9000);
        assert_eq!(validator.validate(action.clone()), Verdict::Accepted(action));
    }
}
