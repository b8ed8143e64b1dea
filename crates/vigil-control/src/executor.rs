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

//! Sequential batch execution with compensating rollback.

use vigil_core::{
    Action, ActionOutcome, ExecutionResult, HandlerError, HandlerRegistry, OutcomeStatus,
    ResolvedAction, ResolvedActionSet,
};

/// Applies a resolved action set through the registered handlers.
///
/// Actions run in set order. The first handler failure stops the batch:
/// the remaining actions are skipped and every action already applied is
/// restored, newest first, from the value its handler reported before the
/// change. Rollback is best-effort and never raises.
///
/// An action whose target has no handler fails on its own: it is reported as
/// failed and marks the batch unsuccessful, but it does not stop or roll back
/// the rest of the batch.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    handlers: HandlerRegistry,
}

impl ActionExecutor {
    /// Creates an executor over `handlers`.
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    /// The handler registry in use.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Executes a batch.
    pub fn execute(&self, set: ResolvedActionSet) -> ExecutionResult {
        let mut result = ExecutionResult::empty();
        let mut remaining = set.into_iter();

        while let Some(resolved) = remaining.next() {
            let ResolvedAction { agent, action, .. } = resolved;

            let Some(handler) = self.handlers.get(&action.target) else {
                let err = HandlerError::NotRegistered(action.target.clone());
                log::error!("Executor: {} (from {}), action dropped.", err, agent);
                result.success = false;
                result.outcomes.push(ActionOutcome {
                    agent,
                    action,
                    status: OutcomeStatus::Failed(err.to_string()),
                    previous: None,
                });
                continue;
            };

            match handler.apply(&action.value) {
                Ok(previous) => {
                    log::debug!(
                        "Executor: {} = {} (was {}) for {}",
                        action.target,
                        action.value,
                        previous,
                        agent
                    );
                    result.outcomes.push(ActionOutcome {
                        agent,
                        action,
                        status: OutcomeStatus::Applied,
                        previous: Some(previous),
                    });
                }
                Err(err) => {
                    log::error!(
                        "Executor: {} failed for {}: {}. Rolling back batch.",
                        action.target,
                        agent,
                        err
                    );
                    result.success = false;
                    result.outcomes.push(ActionOutcome {
                        agent,
                        action,
                        status: OutcomeStatus::Failed(err.to_string()),
                        previous: None,
                    });
                    result.skipped = remaining.by_ref().map(|r| r.action).collect();
                    self.roll_back(&mut result);
                    break;
                }
            }
        }

        result
    }

    /// Restores every applied outcome, newest first.
    fn roll_back(&self, result: &mut ExecutionResult) {
        let mut restored: Vec<Action> = Vec::new();

        for outcome in result.outcomes.iter_mut().rev() {
            if outcome.status != OutcomeStatus::Applied {
                continue;
            }
            let Some(previous) = outcome.previous.as_ref() else {
                continue;
            };
            let outcome_target = &outcome.action.target;

            let attempt = match self.handlers.get(outcome_target) {
                Some(handler) => handler.apply(previous).map(|_| ()),
                None => Err(HandlerError::NotRegistered(outcome_target.clone())),
            };
            match attempt {
                Ok(()) => {
                    log::info!("Executor: rolled back {} to {}", outcome_target, previous);
                    outcome.status = OutcomeStatus::RolledBack;
                    restored.push(outcome.action.clone());
                }
                Err(err) => {
                    log::error!(
                        "Executor: rollback of {} to {} failed: {}",
                        outcome_target,
                        previous,
                        err
                    );
                    outcome.status = OutcomeStatus::RollbackFailed(err.to_string());
                }
            }
        }

        result.rolled_back = restored;
    }
}
