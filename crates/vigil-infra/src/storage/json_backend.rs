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

//! One JSON file per document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use vigil_core::{PersistenceBackend, PersistenceError};

/// Stores each document as `<dir>/<key>.json`.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Creates a backend rooted at `dir`. The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The state directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn io_error(key: &str, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(key, e))?;
        let target = self.path_for(key);
        let staging = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&staging, bytes).map_err(|e| Self::io_error(key, e))?;
        fs::rename(&staging, &target).map_err(|e| Self::io_error(key, e))?;
        log::trace!("JsonFileBackend: wrote {} bytes to {:?}", bytes.len(), target);
        Ok(())
    }
}
