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

//! The HTTP surface. Handlers re-derive everything from the filesystem
//! on every call; the only shared state is configuration and counters.
//! Signature verification runs over the exact raw body bytes before any
//! JSON parsing, so handlers take `Bytes` and parse manually.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use corefence_core::aggregate::validate_projection;
use corefence_core::hashing::{read_pinned_digest, sha256_file};
use corefence_core::jsonl::{load_jsonl, Record};
use corefence_core::CoreError;

use crate::auth::PartnerContext;
use crate::config::DaemonConfig;
use crate::gateway::GatewayError;
use crate::public_error::ApiError;
use crate::telemetry::Telemetry;

pub const CORE_READ_MAX_LIMIT: usize = 10_000;
pub const CORE_READ_DEFAULT_LIMIT: usize = 200;
pub const AGGREGATE_MAX_LIMIT: usize = 200_000;
pub const AGGREGATE_DEFAULT_LIMIT: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<DaemonConfig>,
    pub telemetry: Telemetry,
}

impl AppState {
    pub fn new(cfg: DaemonConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            telemetry: Telemetry::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct WriteEntryRequest {
    pub s_bucket: String,
    pub payload: Record,
    #[serde(default)]
    pub projection: Option<Record>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub local: Option<Record>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WriteAck {
    pub ok: bool,
    pub namespace: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/core/hash", get(core_hash))
        .route("/v1/core/read", get(core_read))
        .route("/v1/agent/entries", post(write_entry))
        .route("/v1/aggregate", get(aggregate))
        .layer(RequestBodyLimitLayer::new(state.cfg.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn core_hash(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    core_hash_impl(&state).map(Json)
}

async fn core_read(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    core_read_impl(&state, query.limit).map(Json)
}

async fn write_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<WriteAck>, ApiError> {
    write_entry_impl(&state, &headers, &body, epoch_now()).map(Json)
}

async fn aggregate(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    aggregate_impl(&state, query.limit).map(Json)
}

pub fn core_hash_impl(state: &AppState) -> Result<Value, ApiError> {
    state.telemetry.record_core_hash_check();
    let pinned = read_pinned_digest(&state.cfg.core_pin_file)?;
    let current = sha256_file(&state.cfg.core_file)?;
    let matches = pinned == current;
    if !matches {
        state.telemetry.record_integrity_failure();
        tracing::error!(
            pinned = %pinned,
            current = %current,
            "core digest no longer matches its pin"
        );
    }
    Ok(json!({
        "core_sha256_current": current,
        "core_sha256_pinned": pinned,
        "matches": matches,
    }))
}

pub fn core_read_impl(state: &AppState, limit: Option<usize>) -> Result<Value, ApiError> {
    let limit = limit.unwrap_or(CORE_READ_DEFAULT_LIMIT);
    if limit < 1 || limit > CORE_READ_MAX_LIMIT {
        return Err(ApiError::Range("limit"));
    }
    let mut records = load_jsonl(&state.cfg.core_file)?;
    records.truncate(limit);
    Ok(json!({ "items": records, "limit": limit }))
}

pub fn write_entry_impl(
    state: &AppState,
    headers: &HeaderMap,
    raw_body: &[u8],
    now: i64,
) -> Result<WriteAck, ApiError> {
    let partner = state
        .cfg
        .identity
        .authorize(headers, raw_body, now)
        .map_err(|err| {
            let api: ApiError = err.into();
            state.telemetry.record_auth_failure(api.code());
            api
        })?;

    let request: WriteEntryRequest = serde_json::from_slice(raw_body)
        .map_err(|_| ApiError::InvalidInput("body must be a JSON object with s_bucket and payload"))?;
    if request.s_bucket.is_empty() {
        return Err(ApiError::InvalidInput("s_bucket must be non-empty"));
    }
    if let Some(projection) = &request.projection {
        validate_projection(projection)?;
    }

    let record = build_record(&partner, &request, now);
    state
        .cfg
        .gateway()
        .append(&partner.namespace, &record)
        .map_err(|err| match err {
            GatewayError::InvalidNamespace(detail) => {
                state.telemetry.record_sandbox_violation();
                ApiError::Sandbox(detail)
            }
            GatewayError::Core(CoreError::SandboxViolation(detail)) => {
                state.telemetry.record_sandbox_violation();
                ApiError::Sandbox(detail)
            }
            GatewayError::Core(core) => core.into(),
        })?;

    state.telemetry.record_write_accepted(&partner.namespace);
    tracing::info!(
        target: "corefence.audit",
        namespace = %partner.namespace,
        s_bucket = %request.s_bucket,
        hmac_verified = partner.provenance.is_some(),
        "entry accepted"
    );

    Ok(WriteAck {
        ok: true,
        namespace: partner.namespace,
    })
}

fn build_record(partner: &PartnerContext, request: &WriteEntryRequest, now: i64) -> Record {
    let mut record = Record::new();
    record.insert("ts".to_string(), json!(now));
    record.insert("namespace".to_string(), json!(partner.namespace));
    record.insert("s_bucket".to_string(), json!(request.s_bucket));
    record.insert("payload".to_string(), Value::Object(request.payload.clone()));
    if let Some(kind) = &request.kind {
        record.insert("kind".to_string(), json!(kind));
    }
    if let Some(projection) = &request.projection {
        record.insert("projection".to_string(), Value::Object(projection.clone()));
    }
    if let Some(local) = &request.local {
        record.insert("local".to_string(), Value::Object(local.clone()));
    }
    if let Some(provenance) = &partner.provenance {
        record.insert(
            "hmac".to_string(),
            json!({
                "alg": provenance.alg,
                "timestamp": provenance.timestamp,
                "signature": provenance.signature,
            }),
        );
    }
    record
}

pub fn aggregate_impl(state: &AppState, limit: Option<usize>) -> Result<Value, ApiError> {
    let limit = limit.unwrap_or(AGGREGATE_DEFAULT_LIMIT);
    if limit < 1 || limit > AGGREGATE_MAX_LIMIT {
        return Err(ApiError::Range("limit"));
    }
    state.telemetry.record_aggregate_request();
    // A schema violation here lives in a stored log, not in the
    // caller's request: surface it as a server fault, not a 400.
    let items = state
        .cfg
        .aggregator()
        .aggregate(limit)
        .map_err(|err| match err {
            CoreError::Schema(detail) => ApiError::CorruptLog(detail),
            other => other.into(),
        })?;
    Ok(json!({ "count": items.len(), "items": items, "limit": limit }))
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{sign_request, IdentityConfig, SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use axum::http::header::AUTHORIZATION;
    use axum::http::HeaderValue;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn seed_core(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let core_dir = dir.join("core");
        fs::create_dir_all(&core_dir).unwrap();
        let core_file = core_dir.join("core.jsonl");
        fs::write(
            &core_file,
            concat!(
                r#"{"S1":"CORE-0001","S2":"acme.widgets","S3":"v2.1.2","S4":"open","S5":"2026-01-02","S6":"advisory","S7":"high"}"#,
                "\n",
                r#"{"S1":"CORE-0002","S2":"acme.widgets","S3":"v2.1.3","S4":"patched","S5":"2026-01-10","S6":"advisory","S7":"high"}"#,
                "\n",
            ),
        )
        .unwrap();
        let pin_file = core_dir.join("core.sha256");
        let digest = sha256_file(&core_file).unwrap();
        fs::write(&pin_file, format!("{digest}  core.jsonl\n")).unwrap();
        (core_file, pin_file)
    }

    fn test_state(tmp: &TempDir, require_hmac: bool) -> AppState {
        let (core_file, pin_file) = seed_core(tmp.path());
        let identity = IdentityConfig {
            token_to_namespace: BTreeMap::from([
                ("token-a".to_string(), "partner_alpha".to_string()),
                ("token-b".to_string(), "partner_beta".to_string()),
            ]),
            hmac_secrets: BTreeMap::from([
                ("partner_alpha".to_string(), "alpha-secret".to_string()),
                ("partner_beta".to_string(), "beta-secret".to_string()),
            ]),
            require_hmac,
            hmac_max_skew_secs: 300,
        };
        AppState::new(DaemonConfig::new(
            tmp.path().join("data"),
            core_file,
            pin_file,
            identity,
        ))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn projection_json() -> Value {
        json!({
            "S1": "CORE-0002", "S2": "acme.widgets", "S3": "v2.1.3", "S4": "patched",
            "S5": "2026-01-10", "S6": "advisory", "S7": "high"
        })
    }

    #[test]
    fn core_hash_reports_match() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let value = core_hash_impl(&state).unwrap();
        assert_eq!(value["matches"], true);
        assert_eq!(value["core_sha256_current"], value["core_sha256_pinned"]);
    }

    #[test]
    fn core_read_respects_limit_bounds() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);

        let one = core_read_impl(&state, Some(1)).unwrap();
        assert_eq!(one["items"].as_array().unwrap().len(), 1);

        assert!(matches!(
            core_read_impl(&state, Some(0)).unwrap_err(),
            ApiError::Range(_)
        ));
        assert!(matches!(
            core_read_impl(&state, Some(CORE_READ_MAX_LIMIT + 1)).unwrap_err(),
            ApiError::Range(_)
        ));
    }

    #[test]
    fn write_without_credential_is_401_class() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let err = write_entry_impl(&state, &HeaderMap::new(), b"{}", 1000).unwrap_err();
        assert!(matches!(err, ApiError::AuthMissing));
        assert_eq!(state.telemetry.snapshot().auth_failures_total["AUTH_MISSING"], 1);
    }

    #[test]
    fn write_stamps_server_fields() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let body = json!({
            "s_bucket": "S4",
            "payload": {"assessment": "patch likely effective"},
            "projection": projection_json(),
        })
        .to_string();

        let ack = write_entry_impl(&state, &bearer("token-a"), body.as_bytes(), 1234).unwrap();
        assert_eq!(ack.namespace, "partner_alpha");

        let rows =
            load_jsonl(&state.cfg.agents_root().join("partner_alpha/entries.jsonl")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ts"], 1234);
        assert_eq!(rows[0]["namespace"], "partner_alpha");
        assert!(rows[0].get("hmac").is_none());
    }

    #[test]
    fn caller_cannot_choose_its_namespace() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        // A spoofed namespace field in the body must be ignored; the
        // server-resolved binding wins.
        let body = json!({
            "s_bucket": "S4",
            "payload": {},
            "namespace": "partner_beta",
        })
        .to_string();

        let ack = write_entry_impl(&state, &bearer("token-a"), body.as_bytes(), 1234).unwrap();
        assert_eq!(ack.namespace, "partner_alpha");
        let rows =
            load_jsonl(&state.cfg.agents_root().join("partner_alpha/entries.jsonl")).unwrap();
        assert_eq!(rows[0]["namespace"], "partner_alpha");
        assert!(!state.cfg.agents_root().join("partner_beta").exists());
    }

    #[test]
    fn bad_projection_is_rejected_writer_side() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let body = json!({
            "s_bucket": "S4",
            "payload": {},
            "projection": {"S1": "CORE-0002", "S8": "nope"},
        })
        .to_string();

        let err = write_entry_impl(&state, &bearer("token-a"), body.as_bytes(), 1234).unwrap_err();
        assert!(matches!(err, ApiError::Schema(_)));
        assert!(!state.cfg.agents_root().join("partner_alpha").exists());
    }

    #[test]
    fn hmac_mode_rejects_unsigned_and_accepts_signed() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, true);
        let body = json!({
            "s_bucket": "S4",
            "payload": {"assessment": "patch may be incomplete"},
            "projection": projection_json(),
        })
        .to_string();

        let err = write_entry_impl(&state, &bearer("token-b"), body.as_bytes(), 1000).unwrap_err();
        assert!(matches!(err, ApiError::SignatureMissing));

        let mut headers = bearer("token-b");
        let sig = sign_request("beta-secret", 990, body.as_bytes());
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("990"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        let ack = write_entry_impl(&state, &headers, body.as_bytes(), 1000).unwrap();
        assert_eq!(ack.namespace, "partner_beta");

        let rows =
            load_jsonl(&state.cfg.agents_root().join("partner_beta/entries.jsonl")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["hmac"]["alg"], "HMAC-SHA256");
        assert_eq!(rows[0]["hmac"]["timestamp"], 990);
        assert_eq!(rows[0]["hmac"]["signature"], sig.as_str());
    }

    #[test]
    fn two_namespace_scenario_aggregates_to_four() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let before = core_hash_impl(&state).unwrap();

        for (token, assessment) in [
            ("token-a", "patch likely effective"),
            ("token-b", "patch may be incomplete"),
        ] {
            let body = json!({
                "s_bucket": "S4",
                "payload": {"assessment": assessment},
                "kind": "analysis",
                "projection": projection_json(),
            })
            .to_string();
            write_entry_impl(&state, &bearer(token), body.as_bytes(), 1000).unwrap();
        }

        let aggregate = aggregate_impl(&state, None).unwrap();
        assert_eq!(aggregate["count"], 4);
        let items = aggregate["items"].as_array().unwrap();
        assert_eq!(items[0]["source"], "core");
        assert_eq!(items[2]["source"], "agent:partner_alpha");
        assert_eq!(items[3]["source"], "agent:partner_beta");

        let after = core_hash_impl(&state).unwrap();
        assert_eq!(before["core_sha256_current"], after["core_sha256_current"]);
        assert_eq!(after["matches"], true);
    }

    #[test]
    fn io_failure_in_the_gateway_is_not_counted_as_a_sandbox_violation() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        // A plain file where the agents root should be makes every
        // namespace-dir creation fail with an I/O error.
        fs::create_dir_all(&state.cfg.data_dir).unwrap();
        fs::write(state.cfg.agents_root(), b"not a directory").unwrap();

        let body = json!({"s_bucket": "S4", "payload": {}}).to_string();
        let err = write_entry_impl(&state, &bearer("token-a"), body.as_bytes(), 1234).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)), "got: {err:?}");
        assert_eq!(state.telemetry.snapshot().sandbox_violations_total, 0);
    }

    #[cfg(unix)]
    #[test]
    fn containment_failure_in_the_gateway_increments_the_violation_counter() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        // The namespace directory replaced by a symlink into the core.
        fs::create_dir_all(state.cfg.agents_root()).unwrap();
        std::os::unix::fs::symlink(
            state.cfg.core_dir(),
            state.cfg.agents_root().join("partner_alpha"),
        )
        .unwrap();

        let body = json!({"s_bucket": "S4", "payload": {}}).to_string();
        let err = write_entry_impl(&state, &bearer("token-a"), body.as_bytes(), 1234).unwrap_err();
        assert!(matches!(err, ApiError::Sandbox(_)), "got: {err:?}");
        assert_eq!(state.telemetry.snapshot().sandbox_violations_total, 1);
    }

    #[test]
    fn bad_stored_entry_fails_aggregation_as_a_server_fault() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        let dir = state.cfg.agents_root().join("partner_alpha");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("entries.jsonl"),
            "{\"projection\":{\"S1\":\"CORE-0001\"}}\n",
        )
        .unwrap();

        let err = aggregate_impl(&state, None).unwrap_err();
        assert!(matches!(err, ApiError::CorruptLog(_)), "got: {err:?}");
        assert!(err.status().is_server_error());
    }

    #[test]
    fn aggregate_limit_bounds_enforced() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, false);
        assert!(matches!(
            aggregate_impl(&state, Some(0)).unwrap_err(),
            ApiError::Range(_)
        ));
        assert!(matches!(
            aggregate_impl(&state, Some(AGGREGATE_MAX_LIMIT + 1)).unwrap_err(),
            ApiError::Range(_)
        ));
        let capped = aggregate_impl(&state, Some(1)).unwrap();
        assert_eq!(capped["count"], 1);
    }
}
