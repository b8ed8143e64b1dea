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

//! Trailing-edge coalescing of out-of-cycle reoptimization requests.

use std::fmt;
use std::time::{Duration, Instant};

/// Why an out-of-cycle run was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReoptimizeReason {
    /// AC adapter plugged or unplugged.
    PowerSourceChanged,
    /// Firmware performance mode changed (Fn+Q or vendor tool).
    PowerModeChanged,
    /// Display configuration changed.
    DisplayChanged,
    /// Requested by an external caller.
    Manual(String),
}

impl fmt::Display for ReoptimizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReoptimizeReason::PowerSourceChanged => f.write_str("power source changed"),
            ReoptimizeReason::PowerModeChanged => f.write_str("power mode changed"),
            ReoptimizeReason::DisplayChanged => f.write_str("display changed"),
            ReoptimizeReason::Manual(why) => write!(f, "manual: {why}"),
        }
    }
}

/// A burst of triggers collapsed into one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedTrigger {
    /// Reason of the last trigger of the burst.
    pub reason: ReoptimizeReason,
    /// Number of triggers in the burst.
    pub coalesced: u32,
}

#[derive(Debug)]
struct Pending {
    reason: ReoptimizeReason,
    count: u32,
    fire_at: Instant,
}

/// Coalesces triggers that arrive within `window` of each other.
///
/// Every trigger pushes the deadline back to `window` after itself, so a
/// burst fires exactly once, `window` after its last trigger, carrying that
/// trigger's reason. Time is passed in explicitly.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Option<Pending>,
}

impl Debouncer {
    /// Creates an idle debouncer.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Registers a trigger at `now`.
    pub fn trigger(&mut self, reason: ReoptimizeReason, now: Instant) {
        let fire_at = now + self.window;
        match self.pending.as_mut() {
            Some(pending) => {
                pending.reason = reason;
                pending.count += 1;
                pending.fire_at = fire_at;
            }
            None => {
                self.pending = Some(Pending {
                    reason,
                    count: 1,
                    fire_at,
                });
            }
        }
    }

    /// When the pending burst is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.fire_at)
    }

    /// Returns `true` while a burst is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the burst if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<DebouncedTrigger> {
        let due = self.pending.as_ref().is_some_and(|p| now >= p.fire_at);
        if !due {
            return None;
        }
        self.pending.take().map(|p| DebouncedTrigger {
            reason: p.reason,
            coalesced: p.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_fires_once_with_last_reason() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(ms(1000));
        debouncer.trigger(ReoptimizeReason::PowerSourceChanged, t0);
        debouncer.trigger(ReoptimizeReason::PowerModeChanged, t0 + ms(100));
        debouncer.trigger(ReoptimizeReason::DisplayChanged, t0 + ms(300));

        let mut fired = Vec::new();
        for step in 0..=30 {
            if let Some(trigger) = debouncer.poll(t0 + ms(step * 100)) {
                fired.push((step * 100, trigger));
            }
        }

        assert_eq!(fired.len(), 1);
        let (at, trigger) = &fired[0];
        assert_eq!(*at, 1300);
        assert_eq!(trigger.reason, ReoptimizeReason::DisplayChanged);
        assert_eq!(trigger.coalesced, 3);
    }

    #[test]
    fn test_separate_bursts_fire_separately() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(ms(1000));
        debouncer.trigger(ReoptimizeReason::PowerSourceChanged, t0);
        assert!(debouncer.poll(t0 + ms(999)).is_none());
        assert!(debouncer.poll(t0 + ms(1000)).is_some());
        assert!(!debouncer.is_pending());

        debouncer.trigger(ReoptimizeReason::Manual("ui".into()), t0 + ms(5000));
        assert_eq!(debouncer.deadline(), Some(t0 + ms(6000)));
        let trigger = debouncer.poll(t0 + ms(6000)).unwrap();
        assert_eq!(trigger.coalesced, 1);
        assert_eq!(trigger.reason.to_string(), "manual: ui");
    }

    #[test]
    fn test_idle_poll_is_none() {
        let mut debouncer = Debouncer::new(ms(10));
        assert!(debouncer.poll(Instant::now()).is_none());
        assert_eq!(debouncer.deadline(), None);
    }
}
