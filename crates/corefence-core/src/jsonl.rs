//! Line-delimited JSON plumbing shared by the core dataset, the
//! namespace logs, and the aggregation engine.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// An opaque, order-preserving JSON object. Payload-bearing fields are
/// validated only at their boundaries and otherwise passed through
/// untouched.
pub type Record = serde_json::Map<String, Value>;

/// Parses each non-empty line as one JSON object. Malformed lines fail
/// with the 1-based line number and source file; non-object lines are a
/// schema violation.
pub fn load_jsonl(path: &Path) -> CoreResult<Vec<Record>> {
    let file = std::fs::File::open(path)?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(trimmed).map_err(|source| CoreError::Parse {
                file: path.display().to_string(),
                line: idx + 1,
                source,
            })?;
        let Value::Object(record) = value else {
            return Err(CoreError::Schema(format!(
                "line {} of {} is not a JSON object",
                idx + 1,
                path.display()
            )));
        };
        rows.push(record);
    }
    Ok(rows)
}

/// Append-only log of newline-terminated JSON records.
///
/// Contract: each append is a single `write_all` of one serialized,
/// `\n`-terminated record on an `O_APPEND` handle, so concurrent
/// appends to the same file interleave only at line granularity for
/// writes below the filesystem's atomic-append threshold. The handle is
/// opened per append; no state is cached between calls.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &Record) -> CoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> CoreResult<Vec<Record>> {
        load_jsonl(&self.path)
    }
}
