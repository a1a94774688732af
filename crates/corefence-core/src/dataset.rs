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

//! The pinned core dataset and its verifier. The core is one JSONL file
//! plus a sidecar pin; the digest must match the pin at every
//! verification point or the dataset is unusable.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::hashing::{read_pinned_digest, sha256_file};
use crate::jsonl::{load_jsonl, Record};

/// The exact key set of every core record. `S1` conventionally acts as
/// a natural key but the core logic never relies on it.
pub const CORE_KEYS: [&str; 7] = ["S1", "S2", "S3", "S4", "S5", "S6", "S7"];

/// Key-set difference against [`CORE_KEYS`]: `(missing, extra)`.
pub fn key_set_diff(record: &Record) -> (Vec<&'static str>, Vec<String>) {
    let missing = CORE_KEYS
        .iter()
        .copied()
        .filter(|key| !record.contains_key(*key))
        .collect();
    let extra = record
        .keys()
        .filter(|key| !CORE_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    (missing, extra)
}

pub fn validate_core_records(records: &[Record]) -> CoreResult<()> {
    for (idx, record) in records.iter().enumerate() {
        let (missing, extra) = key_set_diff(record);
        if !missing.is_empty() || !extra.is_empty() {
            return Err(CoreError::Schema(format!(
                "core record {idx} violates schema; missing={missing:?}, extra={extra:?}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CoreDataset {
    pub path: PathBuf,
    pub expected_sha256: String,
}

impl CoreDataset {
    /// Binds the core file to the digest pinned in its sidecar file.
    pub fn open(core_file: impl Into<PathBuf>, pin_file: &Path) -> CoreResult<Self> {
        Ok(Self {
            path: core_file.into(),
            expected_sha256: read_pinned_digest(pin_file)?,
        })
    }

    /// Recomputes the digest and compares against the pin. Fatal on
    /// mismatch; idempotent and re-runnable at any time.
    pub fn verify_immutable(&self) -> CoreResult<()> {
        let actual = sha256_file(&self.path)?;
        if actual != self.expected_sha256 {
            return Err(CoreError::Integrity(format!(
                "core digest mismatch for {}: expected {}, actual {}",
                self.path.display(),
                self.expected_sha256,
                actual
            )));
        }
        Ok(())
    }

    /// Loads and schema-validates every core record.
    pub fn load(&self) -> CoreResult<Vec<Record>> {
        let records = load_jsonl(&self.path)?;
        validate_core_records(&records)?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn seed_core(dir: &Path, lines: &[serde_json::Value]) -> (PathBuf, PathBuf) {
        let core_file = dir.join("core.jsonl");
        let body: String = lines
            .iter()
            .map(|v| format!("{v}\n"))
            .collect();
        fs::write(&core_file, body).unwrap();
        let pin_file = dir.join("core.sha256");
        let digest = sha256_file(&core_file).unwrap();
        fs::write(&pin_file, format!("{digest}  core.jsonl\n")).unwrap();
        (core_file, pin_file)
    }

    fn full_record(id: &str) -> serde_json::Value {
        json!({
            "S1": id, "S2": "acme.widgets", "S3": "v2.1.3", "S4": "patched",
            "S5": "2026-01-10", "S6": "advisory", "S7": "high"
        })
    }

    #[test]
    fn verify_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let (core_file, pin_file) =
            seed_core(tmp.path(), &[full_record("CORE-0001"), full_record("CORE-0002")]);
        let dataset = CoreDataset::open(&core_file, &pin_file).unwrap();
        dataset.verify_immutable().unwrap();
        dataset.verify_immutable().unwrap();
        let records = dataset.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["S1"], "CORE-0002");
    }

    #[test]
    fn tampered_core_fails_verification() {
        let tmp = TempDir::new().unwrap();
        let (core_file, pin_file) = seed_core(tmp.path(), &[full_record("CORE-0001")]);
        let dataset = CoreDataset::open(&core_file, &pin_file).unwrap();
        fs::write(&core_file, "{\"oops\":true}\n").unwrap();
        assert!(matches!(
            dataset.verify_immutable().unwrap_err(),
            CoreError::Integrity(_)
        ));
    }

    #[test]
    fn missing_key_is_rejected_by_name() {
        let tmp = TempDir::new().unwrap();
        let mut partial = full_record("CORE-0001");
        partial.as_object_mut().unwrap().remove("S7");
        let (core_file, pin_file) = seed_core(tmp.path(), &[partial]);
        let dataset = CoreDataset::open(&core_file, &pin_file).unwrap();
        let err = dataset.load().unwrap_err();
        assert!(err.to_string().contains("S7"), "got: {err}");
    }

    #[test]
    fn extra_key_is_rejected_by_name() {
        let tmp = TempDir::new().unwrap();
        let mut extended = full_record("CORE-0001");
        extended
            .as_object_mut()
            .unwrap()
            .insert("S8".to_string(), json!("nope"));
        let (core_file, pin_file) = seed_core(tmp.path(), &[extended]);
        let dataset = CoreDataset::open(&core_file, &pin_file).unwrap();
        let err = dataset.load().unwrap_err();
        assert!(err.to_string().contains("S8"), "got: {err}");
    }
}
