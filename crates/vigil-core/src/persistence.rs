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

//! Persistence contract and the versioned document envelope.
//!
//! Backends only move bytes. [`DocumentStore`] owns the serialization format:
//! every document is stored as JSON wrapped in `{ "version": N, "data": ... }`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Well-known document keys.
pub mod keys {
    /// Bounded list of behavior samples.
    pub const BEHAVIOR_HISTORY: &str = "behavior-history";
    /// Override history and learned preferences.
    pub const USER_PREFERENCES: &str = "user-preferences";
    /// Orchestrator counters.
    pub const ORCHESTRATOR_STATISTICS: &str = "orchestrator-statistics";
    /// Bounded list of battery samples.
    pub const BATTERY_HISTORY: &str = "battery-history";
}

/// Version written into every envelope.
pub const DOCUMENT_VERSION: u32 = 1;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend I/O failed.
    #[error("I/O error for document {key}: {source}")]
    Io {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The document could not be encoded or decoded.
    #[error("serialization error for document {key}: {source}")]
    Serialization {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The document was written by an incompatible version.
    #[error("document {key} has version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Document key.
        key: String,
        /// Version found on disk.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Byte-level key/value storage.
pub trait PersistenceBackend: Send + Sync {
    /// Reads a document. `Ok(None)` means it was never written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Writes (replaces) a document.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    data: serde_json::Value,
}

/// Typed, versioned access to a [`PersistenceBackend`].
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn PersistenceBackend>,
}

impl DocumentStore {
    /// Wraps a backend.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }

    /// Loads a document. Absence is `Ok(None)`, not an error.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(bytes) = self.backend.read(key)? else {
            return Ok(None);
        };

        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })?;
        if envelope.version != DOCUMENT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                key: key.to_string(),
                found: envelope.version,
                expected: DOCUMENT_VERSION,
            });
        }

        serde_json::from_value(envelope.data)
            .map(Some)
            .map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    /// Loads a document, or its default value on first run.
    pub fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> Result<T, PersistenceError> {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Saves a document.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let envelope = EnvelopeRef {
            version: DOCUMENT_VERSION,
            data: value,
        };
        let bytes =
            serde_json::to_vec_pretty(&envelope).map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })?;
        self.backend.write(key, &bytes)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}
