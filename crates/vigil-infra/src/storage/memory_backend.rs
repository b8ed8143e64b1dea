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

//! Volatile persistence for tests and simulation runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use vigil_core::{PersistenceBackend, PersistenceError};

/// Thread-safe in-memory document store.
///
/// Writes can be made to fail on demand to exercise the orchestrator's
/// persistence error path.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .documents
            .read()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl PersistenceBackend for InMemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| PersistenceError::Backend("Failed to acquire read lock".to_string()))?;
        Ok(documents.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend(format!(
                "write of {key} refused: backend set to fail"
            )));
        }
        let mut documents = self
            .documents
            .write()
            .map_err(|_| PersistenceError::Backend("Failed to acquire write lock".to_string()))?;
        documents.insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_switch() {
        let backend = InMemoryBackend::new();
        backend.write("a", b"1").unwrap();
        backend.set_failing(true);
        assert!(matches!(backend.write("a", b"2"), Err(PersistenceError::Backend(_))));
        backend.set_failing(false);
        backend.write("b", b"3").unwrap();

        assert_eq!(backend.read("a").unwrap().unwrap(), b"1");
        assert_eq!(backend.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(backend.write_count(), 2);
    }
}
