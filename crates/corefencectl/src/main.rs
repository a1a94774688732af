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

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use corefence_core::aggregate::{aggregate_logs, validate_projection};
use corefence_core::dataset::CoreDataset;
use corefence_core::hashing::sha256_file;
use corefence_core::jsonl::Record;
use corefence_core::safefs::WriteGuard;
use corefence_core::CoreError;

#[derive(Parser)]
#[command(name = "corefencectl")]
#[command(about = "Manage the pinned core dataset and run the isolation demo")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Core {
        #[command(subcommand)]
        cmd: CoreCmd,
    },
    /// Scripted two-agent run proving the isolation properties end to end.
    Demo {
        /// Output directory for agent sandboxes and the aggregate
        /// (default: a temp dir discarded afterwards).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CoreCmd {
    /// Seed a fresh core dataset and pin its digest.
    Init {
        #[arg(long)]
        core_dir: PathBuf,
    },
    /// Re-run the immutability check against the pin.
    Verify {
        #[arg(long)]
        core_file: PathBuf,
        #[arg(long)]
        pin_file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let out = match cli.cmd {
        Command::Core { cmd } => run_core(cmd),
        Command::Demo { out } => run_demo(out),
    };
    match out {
        Ok(v) => println!("{}", v),
        Err(msg) => {
            println!("{}", json!({"error": msg}));
            std::process::exit(1);
        }
    }
}

fn run_core(cmd: CoreCmd) -> Result<Value, String> {
    match cmd {
        CoreCmd::Init { core_dir } => {
            let (core_file, pin_file) = init_core(&core_dir).map_err(|e| e.to_string())?;
            let digest = sha256_file(&core_file).map_err(|e| e.to_string())?;
            Ok(json!({
                "status": "ok",
                "core_file": core_file.display().to_string(),
                "pin_file": pin_file.display().to_string(),
                "core_sha256": digest,
            }))
        }
        CoreCmd::Verify {
            core_file,
            pin_file,
        } => {
            let dataset =
                CoreDataset::open(&core_file, &pin_file).map_err(|e| e.to_string())?;
            dataset.verify_immutable().map_err(|e| e.to_string())?;
            let records = dataset.load().map_err(|e| e.to_string())?;
            Ok(json!({
                "status": "ok",
                "core_sha256": dataset.expected_sha256,
                "records": records.len(),
            }))
        }
    }
}

fn seed_records() -> Vec<Value> {
    vec![
        json!({
            "S1": "CORE-0001", "S2": "acme.widgets", "S3": "v2.1.2",
            "S4": "open", "S5": "2026-01-02", "S6": "advisory", "S7": "high"
        }),
        json!({
            "S1": "CORE-0002", "S2": "acme.widgets", "S3": "v2.1.3",
            "S4": "patched", "S5": "2026-01-10", "S6": "advisory", "S7": "high"
        }),
    ]
}

fn init_core(core_dir: &Path) -> Result<(PathBuf, PathBuf), CoreError> {
    fs::create_dir_all(core_dir)?;
    let core_file = core_dir.join("core.jsonl");
    let mut body = Vec::new();
    for record in seed_records() {
        body.extend_from_slice(&serde_json::to_vec(&record)?);
        body.push(b'\n');
    }
    fs::write(&core_file, body)?;

    let pin_file = core_dir.join("core.sha256");
    let digest = sha256_file(&core_file)?;
    fs::write(&pin_file, format!("{digest}  core.jsonl\n"))?;
    Ok((core_file, pin_file))
}

/// One scripted analyst: writes its entries through its own sandbox
/// guard, projecting onto the core record it analyzed.
struct DemoAgent {
    agent_id: &'static str,
    guard: WriteGuard,
}

impl DemoAgent {
    fn analyze(&self, core_records: &[Record]) -> Result<Vec<Value>, CoreError> {
        let mut entries = Vec::new();
        for record in core_records {
            if record.get("S1") != Some(&json!("CORE-0002")) {
                continue;
            }
            validate_projection(record)?;
            let local = match self.agent_id {
                "agent_alpha" => json!({
                    "assessment": "patch likely effective",
                    "confidence": 0.62,
                    "evidence": ["release notes mention fix"],
                }),
                _ => json!({
                    "assessment": "patch may be incomplete",
                    "confidence": 0.71,
                    "evidence": ["independent reproduction after patch"],
                    "repro": {
                        "steps": ["install v2.1.3", "run fuzz harness", "observe crash"],
                        "artifact": "crashlog-42.txt",
                    },
                }),
            };
            entries.push(json!({
                "agent_id": self.agent_id,
                "kind": "analysis",
                "projection": record,
                "local": local,
            }));
        }
        Ok(entries)
    }

    fn write_entries(&self, rel_path: &str, entries: &[Value]) -> Result<(), CoreError> {
        let mut file = self.guard.create_for_write(rel_path)?;
        for entry in entries {
            file.write_all(&serde_json::to_vec(entry)?)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn run_demo(out: Option<PathBuf>) -> Result<Value, String> {
    match out {
        Some(dir) => {
            fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
            demo(&dir).map_err(|e| e.to_string())
        }
        None => {
            let tmp = tempfile::TempDir::new().map_err(|e| e.to_string())?;
            demo(tmp.path()).map_err(|e| e.to_string())
        }
    }
}

fn demo(out_dir: &Path) -> Result<Value, CoreError> {
    let core_dir = out_dir.join("core");
    let (core_file, pin_file) = init_core(&core_dir)?;
    let dataset = CoreDataset::open(&core_file, &pin_file)?;

    // Baseline proof anchor.
    let before = sha256_file(&core_file)?;
    let core_records = dataset.load()?;

    let agents_root = out_dir.join("agents");
    let alpha_root = agents_root.join("agent_alpha");
    let beta_root = agents_root.join("agent_beta");

    let alpha = DemoAgent {
        agent_id: "agent_alpha",
        guard: WriteGuard::new(&alpha_root, vec![core_dir.clone(), beta_root.clone()]),
    };
    let beta = DemoAgent {
        agent_id: "agent_beta",
        guard: WriteGuard::new(&beta_root, vec![core_dir.clone(), alpha_root.clone()]),
    };

    let alpha_entries = alpha.analyze(&core_records)?;
    let beta_entries = beta.analyze(&core_records)?;
    alpha.write_entries("entries.jsonl", &alpha_entries)?;
    beta.write_entries("entries.jsonl", &beta_entries)?;

    // Deliberate break attempts; each must fail without touching disk.
    let mut violations = Vec::new();
    match alpha.guard.create_for_write("../agent_beta/pwn.jsonl") {
        Err(CoreError::SandboxViolation(msg)) => {
            violations.push(format!("alpha->beta blocked: {msg}"));
        }
        Err(other) => return Err(other),
        Ok(_) => {
            return Err(CoreError::SandboxViolation(
                "alpha->beta traversal was not blocked".to_string(),
            ))
        }
    }
    match beta.guard.create_for_write("../../../../core/core.jsonl") {
        Err(CoreError::SandboxViolation(msg)) => {
            violations.push(format!("beta->core blocked: {msg}"));
        }
        Err(other) => return Err(other),
        Ok(_) => {
            return Err(CoreError::SandboxViolation(
                "beta->core traversal was not blocked".to_string(),
            ))
        }
    }

    dataset.verify_immutable()?;
    let after = sha256_file(&core_file)?;

    let alpha_log = alpha_root.join("entries.jsonl");
    let beta_log = beta_root.join("entries.jsonl");
    let aggregated = aggregate_logs(&[alpha_log.as_path(), beta_log.as_path()])?;

    let agg_path = out_dir.join("aggregate.jsonl");
    let mut agg_file = fs::File::create(&agg_path)?;
    for item in &aggregated {
        agg_file.write_all(&serde_json::to_vec(item)?)?;
        agg_file.write_all(b"\n")?;
    }

    Ok(json!({
        "core_sha256_before": before,
        "core_sha256_after": after,
        "core_sha256_expected": dataset.expected_sha256,
        "agent_alpha_entries": alpha_entries.len(),
        "agent_beta_entries": beta_entries.len(),
        "aggregate_entries": aggregated.len(),
        "violations": violations,
        "out_dir": out_dir.display().to_string(),
        "aggregate_path": agg_path.display().to_string(),
    }))
}
