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

//! The path containment guard. A [`WriteGuard`] decides whether a write
//! target is equal to or nested under one allowed root while falling
//! under none of the denied roots. Paths are fully resolved before the
//! decision: symlinks in every existing component, `.`/`..` segments in
//! the rest. Callers must write to the *resolved* path the guard hands
//! back, never to the raw candidate.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Resolves a write target that may not exist yet: the deepest existing
/// ancestor is canonicalized (symlinks resolved), the remaining tail is
/// appended lexically. `.` and `..` segments are normalized up front so
/// the tail walk never has to pop.
pub fn resolve_for_write(path: &Path) -> CoreResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normalized = normalize_lexical(&absolute);

    let mut base = normalized.clone();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        match base.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for part in tail.iter().rev() {
                    out.push(part);
                }
                return Ok(out);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let Some(name) = base.file_name().map(OsString::from) else {
                    // Ran out of components without finding anything on
                    // disk; the lexical form is the best answer we have.
                    return Ok(normalized);
                };
                tail.push(name);
                base.pop();
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct WriteGuard {
    allowed_root: PathBuf,
    deny_roots: Vec<PathBuf>,
}

impl WriteGuard {
    pub fn new(allowed_root: impl Into<PathBuf>, deny_roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
            deny_roots,
        }
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Checks containment and returns the resolved target on success.
    /// The allowed-root check runs first; deny roots win even when they
    /// sit inside the allowed root.
    pub fn check(&self, candidate: &Path) -> CoreResult<PathBuf> {
        let target = resolve_for_write(candidate)?;
        let allowed = resolve_for_write(&self.allowed_root)?;
        if !target.starts_with(&allowed) {
            return Err(CoreError::SandboxViolation(format!(
                "outside sandbox: {}",
                target.display()
            )));
        }
        for deny in &self.deny_roots {
            let deny = resolve_for_write(deny)?;
            if target.starts_with(&deny) {
                return Err(CoreError::SandboxViolation(format!(
                    "in denied root: {}",
                    target.display()
                )));
            }
        }
        Ok(target)
    }

    /// Pure predicate form of [`WriteGuard::check`].
    pub fn write_allowed(&self, candidate: &Path) -> bool {
        self.check(candidate).is_ok()
    }

    /// Guarded file creation for a path relative to the allowed root.
    /// Parent directories are created only after the target passes the
    /// containment check, and the file is opened at the resolved path.
    pub fn create_for_write(&self, rel_path: impl AsRef<Path>) -> CoreResult<File> {
        let target = self.check(&self.allowed_root.join(rel_path.as_ref()))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(&target)?)
    }
}
