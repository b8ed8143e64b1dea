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

//! Per-target hardware handlers.
//!
//! Handlers are the only place where the control plane touches hardware.
//! Concrete implementations (sysfs, simulated devices, vendor SDKs) live
//! outside the core.

use crate::action::ActionValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while applying a value.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler is registered for the target.
    #[error("no handler registered for target {0}")]
    NotRegistered(String),
    /// The handler cannot represent this value.
    #[error("target {target} does not accept value {value}")]
    Unsupported {
        /// Target identifier.
        target: String,
        /// Offending value.
        value: ActionValue,
    },
    /// The device refused the change.
    #[error("target {target} rejected the change: {message}")]
    Rejected {
        /// Target identifier.
        target: String,
        /// Device-provided reason.
        message: String,
    },
    /// Underlying I/O failure.
    #[error("I/O error on target {target}: {source}")]
    Io {
        /// Target identifier.
        target: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Applies values to one controllable surface.
///
/// `apply` returns the value that was in effect before the change. Rollback
/// is performed by calling `apply` again with that previous value.
pub trait ActionHandler: Send + Sync {
    /// Applies `value` and returns the previous value.
    fn apply(&self, value: &ActionValue) -> Result<ActionValue, HandlerError>;

    /// Reads the current value, if the surface is readable.
    ///
    /// Used to notice changes made behind the controller's back.
    fn current(&self) -> Option<ActionValue> {
        None
    }
}

/// Mapping from target identifier to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `target`.
    pub fn register(&mut self, target: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let target = target.into();
        log::debug!("HandlerRegistry: Registered handler for {}", target);
        self.handlers.insert(target, handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, target: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(target, handler);
        self
    }

    /// Looks up the handler for `target`.
    pub fn get(&self, target: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(target)
    }

    /// Returns `true` if a handler exists for `target`.
    pub fn contains(&self, target: &str) -> bool {
        self.handlers.contains_key(target)
    }

    /// Registered targets, sorted.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("targets", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
