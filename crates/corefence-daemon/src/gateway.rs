// Copyright [2026] [Corefence Contributors]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! The namespace write gateway. For an authenticated, namespace-bound
//! request it derives the append target deterministically from the
//! namespace identifier alone, re-validates it through the containment
//! guard under three invariants (inside the caller's namespace dir,
//! inside the agents root, outside the core dir), and appends exactly
//! one line. A containment failure here is a service-configuration
//! fault, never a client error: with validated namespace identifiers no
//! attacker-controlled input reaches the target derivation.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use corefence_core::jsonl::{AppendLog, Record};
use corefence_core::safefs::WriteGuard;
use corefence_core::CoreError;

pub const ENTRIES_FILE: &str = "entries.jsonl";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid namespace configuration: {0}")]
    InvalidNamespace(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone)]
pub struct WriteGateway {
    agents_root: PathBuf,
    core_dir: PathBuf,
}

impl WriteGateway {
    pub fn new(agents_root: impl Into<PathBuf>, core_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_root: agents_root.into(),
            core_dir: core_dir.into(),
        }
    }

    pub fn agents_root(&self) -> &Path {
        &self.agents_root
    }

    /// Namespace identifiers double as directory names, so they must be
    /// simple tokens: no separators, not `.` or `..`, non-empty.
    pub fn validate_namespace(namespace: &str) -> Result<(), GatewayError> {
        if namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains('/')
            || namespace.contains('\\')
        {
            return Err(GatewayError::InvalidNamespace(format!(
                "namespace {namespace:?} is not a simple token"
            )));
        }
        Ok(())
    }

    pub fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, GatewayError> {
        Self::validate_namespace(namespace)?;
        Ok(self.agents_root.join(namespace))
    }

    /// Appends one record to the namespace's log after all three
    /// containment invariants hold. The append is a single atomic line.
    pub fn append(&self, namespace: &str, record: &Record) -> Result<PathBuf, GatewayError> {
        let namespace_dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&namespace_dir).map_err(CoreError::from)?;
        let candidate = namespace_dir.join(ENTRIES_FILE);

        // (i) inside the caller's own namespace directory, not merely
        // the shared root;
        let target = WriteGuard::new(namespace_dir.clone(), Vec::new()).check(&candidate)?;
        // (ii) inside the global agents root;
        WriteGuard::new(self.agents_root.clone(), Vec::new()).check(&candidate)?;
        // (iii) never inside the core's directory.
        WriteGuard::new(self.agents_root.clone(), vec![self.core_dir.clone()])
            .check(&candidate)?;

        AppendLog::new(&target).append(record)?;
        Ok(target)
    }
}
