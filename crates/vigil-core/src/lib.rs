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

//! # Vigil Core
//!
//! Foundational crate containing the shared data model, the agent contract and
//! the interfaces of every external collaborator (context provider, action
//! handlers, persistence store) used by the optimization control plane.

#![warn(missing_docs)]

pub mod action;
pub mod agent;
pub mod config;
pub mod context;
pub mod execution;
pub mod handler;
pub mod learning;
pub mod persistence;
pub mod stats;
pub mod targets;

pub use action::{Action, ActionKind, ActionValue, Priority, Proposal, ResolvedAction, ResolvedActionSet};
pub use agent::{Agent, AgentError, AgentId};
pub use config::{ConfigError, VigilConfig};
pub use context::{ContextError, ContextProvider, ContextSignature, ContextSnapshot};
pub use execution::{ActionOutcome, ExecutionResult, OutcomeStatus};
pub use handler::{ActionHandler, HandlerError, HandlerRegistry};
pub use learning::{LearnedPreference, OverrideRecord, PreferenceView};
pub use persistence::{DocumentStore, PersistenceBackend, PersistenceError};
pub use stats::OrchestratorStatistics;
