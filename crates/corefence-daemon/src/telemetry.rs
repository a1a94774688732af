//! In-process counters for the write and read paths. Counters are
//! cheap enough to take on every request; the snapshot form exists for
//! tests and for periodic structured logging.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default)]
struct TelemetryState {
    writes_accepted_total: BTreeMap<String, u64>,
    auth_failures_total: BTreeMap<&'static str, u64>,
    aggregate_requests_total: u64,
    core_hash_checks_total: u64,
    integrity_failures_total: u64,
    sandbox_violations_total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub writes_accepted_total: BTreeMap<String, u64>,
    pub auth_failures_total: BTreeMap<&'static str, u64>,
    pub aggregate_requests_total: u64,
    pub core_hash_checks_total: u64,
    pub integrity_failures_total: u64,
    pub sandbox_violations_total: u64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write_accepted(&self, namespace: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .writes_accepted_total
            .entry(namespace.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_auth_failure(&self, reason: &'static str) {
        let mut guard = self.state.lock();
        let entry = guard.auth_failures_total.entry(reason).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_aggregate_request(&self) {
        let mut guard = self.state.lock();
        guard.aggregate_requests_total = guard.aggregate_requests_total.saturating_add(1);
    }

    pub fn record_core_hash_check(&self) {
        let mut guard = self.state.lock();
        guard.core_hash_checks_total = guard.core_hash_checks_total.saturating_add(1);
    }

    pub fn record_integrity_failure(&self) {
        let mut guard = self.state.lock();
        guard.integrity_failures_total = guard.integrity_failures_total.saturating_add(1);
    }

    pub fn record_sandbox_violation(&self) {
        let mut guard = self.state.lock();
        guard.sandbox_violations_total = guard.sandbox_violations_total.saturating_add(1);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let guard = self.state.lock();
        TelemetrySnapshot {
            writes_accepted_total: guard.writes_accepted_total.clone(),
            auth_failures_total: guard.auth_failures_total.clone(),
            aggregate_requests_total: guard.aggregate_requests_total,
            core_hash_checks_total: guard.core_hash_checks_total,
            integrity_failures_total: guard.integrity_failures_total,
            sandbox_violations_total: guard.sandbox_violations_total,
        }
    }
}
