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

//! The projection and aggregation engine: the one component that reads
//! across every namespace. Core records pass through verbatim; each
//! namespace entry must carry a projection using exactly the core key
//! set and is reduced to `{agent_id, kind, S, local}`. Aggregation is
//! fail-closed: one structurally invalid projection aborts the whole
//! aggregate, since a malformed entry in an append-only partition is an
//! isolation-violation signal, not a data-quality nuisance.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::dataset::{key_set_diff, CORE_KEYS};
use crate::error::{CoreError, CoreResult};
use crate::jsonl::{load_jsonl, Record};

pub const SOURCE_CORE: &str = "core";

/// Validates `entry.projection` and reduces the entry to its aggregated
/// form. `agent_id` prefers the entry's own field, falling back to the
/// server-stamped namespace; `local` defaults to an empty object.
pub fn project_entry(entry: &Record) -> CoreResult<Record> {
    let Some(projection) = entry.get("projection") else {
        return Err(CoreError::Schema(
            "entry is missing 'projection'".to_string(),
        ));
    };
    let Value::Object(projection) = projection else {
        return Err(CoreError::Schema(
            "'projection' must be a JSON object".to_string(),
        ));
    };
    validate_projection(projection)?;

    let mut s = Record::new();
    for key in CORE_KEYS {
        if let Some(value) = projection.get(key) {
            s.insert(key.to_string(), value.clone());
        }
    }

    let agent_id = entry
        .get("agent_id")
        .or_else(|| entry.get("namespace"))
        .cloned()
        .unwrap_or(Value::Null);

    let mut out = Record::new();
    out.insert("agent_id".to_string(), agent_id);
    out.insert(
        "kind".to_string(),
        entry.get("kind").cloned().unwrap_or(Value::Null),
    );
    out.insert("S".to_string(), Value::Object(s));
    out.insert(
        "local".to_string(),
        entry
            .get("local")
            .cloned()
            .unwrap_or_else(|| Value::Object(Record::new())),
    );
    Ok(out)
}

/// Rejects any projection whose key set is not exactly [`CORE_KEYS`].
pub fn validate_projection(projection: &Record) -> CoreResult<()> {
    let (missing, extra) = key_set_diff(projection);
    if !missing.is_empty() || !extra.is_empty() {
        return Err(CoreError::Schema(format!(
            "invalid projection; missing={missing:?}, extra={extra:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    core_file: PathBuf,
    agents_root: PathBuf,
}

impl Aggregator {
    pub fn new(core_file: impl Into<PathBuf>, agents_root: impl Into<PathBuf>) -> Self {
        Self {
            core_file: core_file.into(),
            agents_root: agents_root.into(),
        }
    }

    /// Merges core records (first, tagged `source="core"`) with every
    /// namespace's append log (tagged `source="agent:<ns>"`), stopping
    /// globally at `limit`. Namespace directories are visited in sorted
    /// order; entries within a namespace keep append order.
    pub fn aggregate(&self, limit: usize) -> CoreResult<Vec<Record>> {
        let mut items: Vec<Record> = Vec::new();

        if self.core_file.is_file() {
            for record in load_jsonl(&self.core_file)? {
                if items.len() >= limit {
                    break;
                }
                let mut item = Record::new();
                item.insert("source".to_string(), Value::String(SOURCE_CORE.to_string()));
                item.extend(record);
                items.push(item);
            }
        }

        for (namespace, log_path) in self.namespace_logs()? {
            if items.len() >= limit {
                break;
            }
            for entry in load_jsonl(&log_path)? {
                if items.len() >= limit {
                    break;
                }
                let reduced = project_entry(&entry).map_err(|err| match err {
                    CoreError::Schema(msg) => {
                        CoreError::Schema(format!("namespace {namespace}: {msg}"))
                    }
                    other => other,
                })?;
                let mut item = Record::new();
                item.insert(
                    "source".to_string(),
                    Value::String(format!("agent:{namespace}")),
                );
                item.extend(reduced);
                items.push(item);
            }
        }

        Ok(items)
    }

    fn namespace_logs(&self) -> CoreResult<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        if !self.agents_root.is_dir() {
            return Ok(out);
        }
        for dir_entry in std::fs::read_dir(&self.agents_root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let log_path = dir_entry.path().join("entries.jsonl");
            if !log_path.is_file() {
                continue;
            }
            out.push((dir_entry.file_name().to_string_lossy().into_owned(), log_path));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Convenience for the CLI: aggregate from explicit log paths in the
/// order given, without the core prefix.
pub fn aggregate_logs(paths: &[&Path]) -> CoreResult<Vec<Record>> {
    let mut out = Vec::new();
    for path in paths {
        for entry in load_jsonl(path)? {
            out.push(project_entry(&entry)?);
        }
    }
    Ok(out)
}
