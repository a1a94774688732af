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

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use corefence_daemon::config::{AuthFile, DaemonConfig};
use corefence_daemon::http_api::{serve, AppState};

#[derive(Debug, Parser)]
#[command(name = "corefence-daemon")]
#[command(about = "Corefence operational-isolation HTTP daemon")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Defaults to <data-dir>/core/core.jsonl.
    #[arg(long)]
    core_file: Option<PathBuf>,

    /// Defaults to <data-dir>/core/core.sha256.
    #[arg(long)]
    core_sha_file: Option<PathBuf>,

    /// JSON file with token bindings and HMAC policy.
    #[arg(long)]
    auth_config: PathBuf,

    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log))
        .init();

    std::fs::create_dir_all(args.data_dir.join("agents"))?;

    let core_file = args
        .core_file
        .unwrap_or_else(|| args.data_dir.join("core/core.jsonl"));
    let core_sha_file = args
        .core_sha_file
        .unwrap_or_else(|| args.data_dir.join("core/core.sha256"));

    let identity = AuthFile::load(&args.auth_config)?.into_identity();
    let cfg = DaemonConfig::new(args.data_dir.clone(), core_file, core_sha_file, identity);

    // Refuse to start on a tampered or malformed core. The pin is the
    // deployment's statement of what the dataset must be.
    let dataset = cfg.dataset()?;
    dataset.verify_immutable()?;
    let records = dataset.load()?;
    tracing::info!(
        core = %cfg.core_file.display(),
        records = records.len(),
        "core dataset verified against its pinned digest"
    );

    let addr: std::net::SocketAddr = args.listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, data_dir = %cfg.data_dir.display(), "starting corefence HTTP server");

    let state = AppState::new(cfg);
    let telemetry = state.telemetry.clone();
    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    tracing::info!(telemetry = ?telemetry.snapshot(), "shutdown complete");
    Ok(())
}
