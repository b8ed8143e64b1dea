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

//! Arbiter implementation.
//!
//! Merges every proposal of a tick into one conflict-free action set:
//!
//! 1. Flattens all actions and groups them by target identifier.
//! 2. Passes uncontended targets through unchanged.
//! 3. For contended targets, picks a single winner by agent priority, then
//!    action kind (proactive first), then agent registration order.
//! 4. Orders the winners for execution (highest priority first).
//!
//! The arbiter is a pure function of its input: the order in which
//! submissions arrive never influences the result.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use vigil_core::{Action, AgentId, Priority, Proposal, ResolvedAction, ResolvedActionSet};

/// A proposal stamped with its agent's registration rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Position of the agent in the registry (0 = registered first).
    pub rank: usize,
    /// The agent's proposal.
    pub proposal: Proposal,
}

impl Submission {
    /// Stamps a proposal.
    pub fn new(rank: usize, proposal: Proposal) -> Self {
        Self { rank, proposal }
    }
}

/// A decision taken for one contended target.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDecision {
    /// The contended target.
    pub target: String,
    /// The agent whose action won.
    pub winner: AgentId,
    /// The agents whose actions were discarded.
    pub overruled: Vec<AgentId>,
}

/// Result of one arbitration round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbitrationOutcome {
    /// At most one action per target, in execution order.
    pub resolved: ResolvedActionSet,
    /// Number of targets that needed a decision.
    pub conflicts_resolved: usize,
    /// Details of each decision.
    pub decisions: Vec<ConflictDecision>,
}

/// One action flattened out of its proposal.
struct Candidate<'a> {
    rank: usize,
    index: usize,
    agent: AgentId,
    priority: Priority,
    action: &'a Action,
}

impl Candidate<'_> {
    /// Total ordering key; smaller wins.
    fn sort_key(&self) -> (Reverse<Priority>, u8, usize, AgentId, usize) {
        (
            Reverse(self.priority),
            self.action.kind.precedence(),
            self.rank,
            self.agent,
            self.index,
        )
    }

    fn execution_key(&self) -> (Reverse<Priority>, usize, AgentId, usize) {
        (Reverse(self.priority), self.rank, self.agent, self.index)
    }
}

/// Deterministic conflict resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct Arbiter;

impl Arbiter {
    /// Creates an arbiter.
    pub fn new() -> Self {
        Self
    }

    /// Resolves all submissions of a tick.
    pub fn arbitrate(&self, submissions: &[Submission]) -> ArbitrationOutcome {
        let mut outcome = ArbitrationOutcome::default();

        // ── 1. Group by target ───────────────────────────────────────────
        let mut groups: BTreeMap<&str, Vec<Candidate<'_>>> = BTreeMap::new();
        for submission in submissions {
            let proposal = &submission.proposal;
            for (index, action) in proposal.actions.iter().enumerate() {
                groups
                    .entry(action.target.as_str())
                    .or_default()
                    .push(Candidate {
                        rank: submission.rank,
                        index,
                        agent: proposal.agent,
                        priority: proposal.priority,
                        action,
                    });
            }
        }

        // ── 2. Pick one winner per target ────────────────────────────────
        let mut winners: Vec<Candidate<'_>> = Vec::with_capacity(groups.len());
        for (target, mut candidates) in groups {
            candidates.sort_by_key(|c| c.sort_key());
            let mut iter = candidates.into_iter();
            let Some(winner) = iter.next() else {
                continue;
            };
            let overruled: Vec<AgentId> = iter.map(|c| c.agent).collect();

            if !overruled.is_empty() {
                log::trace!(
                    "Arbiter: {} contended by {} agents, {:?} wins with {} ({:?}, {:?})",
                    target,
                    overruled.len() + 1,
                    winner.agent,
                    winner.action.value,
                    winner.priority,
                    winner.action.kind
                );
                outcome.conflicts_resolved += 1;
                outcome.decisions.push(ConflictDecision {
                    target: target.to_string(),
                    winner: winner.agent,
                    overruled,
                });
            }
            winners.push(winner);
        }

        // ── 3. Execution order ───────────────────────────────────────────
        winners.sort_by_key(|c| c.execution_key());
        for winner in winners {
            let pushed = outcome.resolved.push(ResolvedAction::new(
                winner.agent,
                winner.priority,
                winner.action.clone(),
            ));
            debug_assert!(pushed, "targets are unique after grouping");
        }

        if outcome.conflicts_resolved > 0 {
            log::debug!(
                "Arbiter: {} actions resolved, {} conflicts.",
                outcome.resolved.len(),
                outcome.conflicts_resolved
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use vigil_core::{ActionValue, Proposal};

    fn submission(rank: usize, agent: AgentId, priority: Priority, actions: Vec<Action>) -> Submission {
        let mut proposal = Proposal::new(agent, priority);
        for action in actions {
            proposal.push(action);
        }
        Submission::new(rank, proposal)
    }

    /// All permutations of `items` (Heap's algorithm).
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            heap(k - 1, items, out);
            for i in 0..k - 1 {
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
                heap(k - 1, items, out);
            }
        }
        let mut work = items.to_vec();
        let mut out = Vec::new();
        heap(work.len(), &mut work, &mut out);
        out
    }

    fn mixed_submissions() -> Vec<Submission> {
        vec![
            submission(
                0,
                AgentId::Thermal,
                Priority::Medium,
                vec![
                    Action::proactive("GPU_TGP", 80, "heat"),
                    Action::opportunistic("FAN_SPEED", 70, "pre-cool"),
                ],
            ),
            submission(
                1,
                AgentId::Power,
                Priority::Medium,
                vec![
                    Action::opportunistic("PERFORMANCE_MODE", "quiet", "battery"),
                    Action::proactive("FAN_SPEED", 40, "quiet fans"),
                ],
            ),
            submission(
                2,
                AgentId::Gpu,
                Priority::High,
                vec![Action::proactive("GPU_TGP", 140, "gaming")],
            ),
            submission(
                3,
                AgentId::Battery,
                Priority::Medium,
                vec![Action::proactive("PERFORMANCE_MODE", "balanced", "charged")],
            ),
        ]
    }

    #[test]
    fn test_higher_priority_wins_and_counts_conflict() {
        let arbiter = Arbiter::new();
        let subs = vec![
            submission(
                0,
                AgentId::Thermal,
                Priority::Medium,
                vec![Action::proactive("GPU_TGP", 80, "heat")],
            ),
            submission(
                1,
                AgentId::Gpu,
                Priority::High,
                vec![Action::proactive("GPU_TGP", 140, "gaming")],
            ),
        ];
        let outcome = arbiter.arbitrate(&subs);
        assert_eq!(outcome.conflicts_resolved, 1);
        assert_eq!(outcome.resolved.len(), 1);
        let resolved = outcome.resolved.get("GPU_TGP").unwrap();
        assert_eq!(resolved.action.value, ActionValue::Int(140));
        assert_eq!(resolved.agent, AgentId::Gpu);
        assert_eq!(outcome.decisions[0].overruled, vec![AgentId::Thermal]);
    }

    #[test]
    fn test_proactive_beats_opportunistic_at_equal_priority() {
        let outcome = Arbiter::new().arbitrate(&mixed_submissions());
        // Thermal (rank 0) is opportunistic, Power (rank 1) is proactive.
        let fan = outcome.resolved.get("FAN_SPEED").unwrap();
        assert_eq!(fan.agent, AgentId::Power);
        assert_eq!(fan.action.value, ActionValue::Int(40));
    }

    #[test]
    fn test_registration_order_breaks_remaining_ties() {
        let subs = vec![
            submission(
                5,
                AgentId::Display,
                Priority::Low,
                vec![Action::opportunistic("DISPLAY_BRIGHTNESS", 30, "late")],
            ),
            submission(
                2,
                AgentId::Battery,
                Priority::Low,
                vec![Action::opportunistic("DISPLAY_BRIGHTNESS", 50, "early")],
            ),
        ];
        let outcome = Arbiter::new().arbitrate(&subs);
        assert_eq!(
            outcome.resolved.get("DISPLAY_BRIGHTNESS").unwrap().agent,
            AgentId::Battery
        );
    }

    #[test]
    fn test_uncontended_actions_pass_through_untouched() {
        let action = Action::proactive("KEYBOARD_BACKLIGHT", 0, "battery")
            .with_parameter("fade_ms", "250");
        let subs = vec![submission(
            0,
            AgentId::KeyboardLight,
            Priority::Low,
            vec![action.clone()],
        )];
        let outcome = Arbiter::new().arbitrate(&subs);
        assert_eq!(outcome.conflicts_resolved, 0);
        assert!(outcome.decisions.is_empty());
        assert_eq!(outcome.resolved.get("KEYBOARD_BACKLIGHT").unwrap().action, action);
    }

    #[test]
    fn test_single_target_invariant() {
        let outcome = Arbiter::new().arbitrate(&mixed_submissions());
        let mut seen = HashSet::new();
        for resolved in outcome.resolved.iter() {
            assert!(seen.insert(resolved.target().to_string()));
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(outcome.conflicts_resolved, 3);
    }

    #[test]
    fn test_result_is_independent_of_submission_order() {
        let arbiter = Arbiter::new();
        let subs = mixed_submissions();
        let reference = arbiter.arbitrate(&subs);
        for permuted in permutations(&subs) {
            assert_eq!(arbiter.arbitrate(&permuted), reference);
        }
    }

    #[test]
    fn test_large_input_rotation_is_stable() {
        let agents = AgentId::ALL;
        let priorities = [Priority::Low, Priority::Medium, Priority::High, Priority::Critical];
        let targets = ["CPU_PL1", "CPU_PL2", "GPU_TGP", "FAN_SPEED", "DISPLAY_BRIGHTNESS"];

        let mut subs = Vec::new();
        for (rank, agent) in agents.iter().enumerate() {
            let mut actions = Vec::new();
            for (t, target) in targets.iter().enumerate() {
                if (rank + t) % 2 == 0 {
                    let kind_action = if (rank * 3 + t) % 3 == 0 {
                        Action::opportunistic(*target, (rank * 10 + t) as i64, "rotate")
                    } else {
                        Action::proactive(*target, (rank * 10 + t) as i64, "rotate")
                    };
                    actions.push(kind_action);
                }
            }
            subs.push(submission(rank, *agent, priorities[rank % 4], actions));
        }

        let arbiter = Arbiter::new();
        let reference = arbiter.arbitrate(&subs);
        for shift in 1..subs.len() {
            let mut rotated = subs.clone();
            rotated.rotate_left(shift);
            rotated.reverse();
            assert_eq!(arbiter.arbitrate(&rotated), reference);
        }
    }

    #[test]
    fn test_execution_order_is_priority_then_rank() {
        let subs = vec![
            submission(
                0,
                AgentId::Thermal,
                Priority::Low,
                vec![Action::proactive("FAN_SPEED", 0, "cool")],
            ),
            submission(
                1,
                AgentId::Battery,
                Priority::Critical,
                vec![Action::proactive("CPU_PL2", 45, "battery critical")],
            ),
        ];
        let outcome = Arbiter::new().arbitrate(&subs);
        let order: Vec<&str> = outcome.resolved.iter().map(|a| a.target()).collect();
        assert_eq!(order, vec!["CPU_PL2", "FAN_SPEED"]);
    }

    #[test]
    fn test_empty_input() {
        let outcome = Arbiter::new().arbitrate(&[]);
        assert!(outcome.resolved.is_empty());
        assert_eq!(outcome.conflicts_resolved, 0);
    }
}
