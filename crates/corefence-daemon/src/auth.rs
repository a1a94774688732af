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

//! The identity and provenance layer. A bearer credential binds to
//! exactly one namespace through a fixed mapping, so a valid credential
//! can never select another partner's partition. HMAC request signing
//! is an orthogonal, optional tamper-evidence layer on top: when the
//! global switch is on, every write must carry a fresh timestamp and an
//! `HMAC-SHA256(secret, "{ts}." + raw_body)` signature, verified over
//! the exact raw body bytes before any JSON parsing.

use std::collections::BTreeMap;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const HMAC_ALG: &str = "HMAC-SHA256";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid token")]
    InvalidToken,
    #[error("missing X-Timestamp and/or X-Signature")]
    MissingSignature,
    #[error("invalid X-Timestamp")]
    InvalidTimestamp,
    #[error("X-Timestamp outside allowed skew")]
    TimestampOutOfSkew,
    #[error("invalid X-Signature")]
    InvalidSignature,
    #[error("HMAC required but secret not configured for namespace")]
    SecretNotConfigured,
}

/// HMAC verification details threaded forward so the gateway can embed
/// them as provenance on the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacProvenance {
    pub alg: &'static str,
    pub timestamp: i64,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerContext {
    pub namespace: String,
    pub provenance: Option<HmacProvenance>,
}

/// Immutable identity material, built once at startup and passed
/// explicitly into every component that needs it.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    /// token -> namespace. The direction is deliberate: lookup is O(1)
    /// and callers cannot supply their own namespace.
    pub token_to_namespace: BTreeMap<String, String>,
    /// namespace -> signing secret.
    pub hmac_secrets: BTreeMap<String, String>,
    pub require_hmac: bool,
    pub hmac_max_skew_secs: i64,
}

impl IdentityConfig {
    /// Stable credential resolution; the only namespace a token can
    /// ever bind to.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.token_to_namespace.get(token).map(String::as_str)
    }

    /// Full request authorization: token presence, token resolution,
    /// then HMAC verification when the global switch is enabled.
    /// `now` is the server's epoch-seconds clock, injected for tests.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        now: i64,
    ) -> Result<PartnerContext, AuthError> {
        let token = bearer_token(headers)?;
        let namespace = self.resolve(token).ok_or(AuthError::InvalidToken)?;

        if !self.require_hmac {
            return Ok(PartnerContext {
                namespace: namespace.to_string(),
                provenance: None,
            });
        }

        let secret = self
            .hmac_secrets
            .get(namespace)
            .ok_or(AuthError::SecretNotConfigured)?;

        let (Some(ts_header), Some(sig_header)) = (
            header_str(headers, TIMESTAMP_HEADER),
            header_str(headers, SIGNATURE_HEADER),
        ) else {
            return Err(AuthError::MissingSignature);
        };
        let ts: i64 = ts_header.parse().map_err(|_| AuthError::InvalidTimestamp)?;
        // abs_diff: any client-supplied i64, including the extremes,
        // must land here as out-of-skew rather than overflow.
        if now.abs_diff(ts) > self.hmac_max_skew_secs.unsigned_abs() {
            return Err(AuthError::TimestampOutOfSkew);
        }

        let mut message = format!("{ts}.").into_bytes();
        message.extend_from_slice(raw_body);
        let expected = hmac_sha256(secret.as_bytes(), &message);
        let provided = hex::decode(sig_header).map_err(|_| AuthError::InvalidSignature)?;
        if !constant_time_eq(expected.as_slice(), provided.as_slice()) {
            return Err(AuthError::InvalidSignature);
        }

        Ok(PartnerContext {
            namespace: namespace.to_string(),
            provenance: Some(HmacProvenance {
                alg: HMAC_ALG,
                timestamp: ts,
                signature: sig_header.to_string(),
            }),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Err(AuthError::MissingCredential);
    };
    let Ok(header) = header.to_str() else {
        return Err(AuthError::MissingCredential);
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(AuthError::MissingCredential);
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;
    let mut key_block = [0u8; BLOCK_SIZE];
    if secret.len() > BLOCK_SIZE {
        let digest = Sha256::digest(secret);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..secret.len()].copy_from_slice(secret);
    }

    let mut o_key_pad = [0u8; BLOCK_SIZE];
    let mut i_key_pad = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        o_key_pad[i] = key_block[i] ^ 0x5c;
        i_key_pad[i] = key_block[i] ^ 0x36;
    }

    let mut inner = Sha256::new();
    inner.update(i_key_pad);
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(o_key_pad);
    outer.update(inner_hash);
    outer.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Signs a body the way clients must; shared with the CLI and tests.
pub fn sign_request(secret: &str, timestamp: i64, raw_body: &[u8]) -> String {
    let mut message = format!("{timestamp}.").into_bytes();
    message.extend_from_slice(raw_body);
    hex::encode(hmac_sha256(secret.as_bytes(), &message))
}
