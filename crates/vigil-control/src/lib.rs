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

//! # Vigil Control
//!
//! The multi-agent control plane: every tick pulls a context snapshot, asks
//! each registered agent for a proposal, arbitrates conflicts, enforces
//! safety bounds, executes with rollback, and feeds the outcome back into
//! the preference learner.

pub mod arbitration;
pub mod debounce;
pub mod diagnostics;
pub mod executor;
pub mod learning;
pub mod pipeline;
pub mod registry;
pub mod safety;
pub mod service;

pub use arbitration::{Arbiter, ArbitrationOutcome, Submission};
pub use debounce::{DebouncedTrigger, Debouncer, ReoptimizeReason};
pub use diagnostics::DiagnosticsSnapshot;
pub use executor::ActionExecutor;
pub use learning::{LearnerSummary, PreferenceLearner};
pub use pipeline::{Pipeline, TickReport, TickTrigger};
pub use registry::{AgentActivity, AgentRegistry};
pub use safety::{SafetyValidator, SafetyViolation, Verdict};
pub use service::{AgentFactory, Collaborators, LifecycleError, LifecycleState, Orchestrator};
