// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HMAC-signed notification auth tokens (§4.6): bind a short-lived token to
//! `{jobID, invocationID}` so an inbound completion message can be traced
//! back to the invocation that should receive it, without trusting the
//! publisher's own identity claims.

use base64::Engine as _;
use crond_core::{InvocationId, JobId};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Current token wire version. Bump if the signed fields ever change shape.
const TOKEN_VERSION: u8 = 1;

/// Validity window from mint to expiry.
pub const TOKEN_VALIDITY_MS: u64 = 48 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature invalid")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    job_id: String,
    invocation_id: i64,
    version: u8,
    issued_at_ms: u64,
}

/// Mints and validates the HMAC-signed tokens handed to task backends via
/// `TaskController::prepare_topic` and echoed back on every notification.
/// The secret is rotatable: construct a fresh `TokenSigner` with the new
/// secret and old tokens simply fail validation once the old signer is
/// dropped, same as any rotating-key scheme without a grace overlap.
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn mint(&self, job_id: &JobId, invocation_id: InvocationId, now_ms: u64) -> Result<String, TokenError> {
        let claims = TokenClaims {
            job_id: job_id.to_string(),
            invocation_id: invocation_id.0,
            version: TOKEN_VERSION,
            issued_at_ms: now_ms,
        };
        let body = serde_json::to_vec(&claims).unwrap_or_default();
        let sig = self.sign(&body)?;
        let mut token = Vec::with_capacity(body.len() + sig.len() + 1);
        token.extend_from_slice(&(body.len() as u32).to_be_bytes());
        token.extend_from_slice(&body);
        token.extend_from_slice(&sig);
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token))
    }

    pub fn validate(&self, token: &str, now_ms: u64) -> Result<(JobId, InvocationId), TokenError> {
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if raw.len() < 4 {
            return Err(TokenError::Malformed("token too short".into()));
        }
        let body_len = u32::from_be_bytes(
            raw[0..4].try_into().map_err(|_| TokenError::Malformed("short header".into()))?,
        ) as usize;
        if raw.len() < 4 + body_len {
            return Err(TokenError::Malformed("truncated body".into()));
        }
        let body = &raw[4..4 + body_len];
        let sig = &raw[4 + body_len..];
        let expected = self.sign(body)?;
        if expected.len() != sig.len() || !constant_time_eq(&expected, sig) {
            return Err(TokenError::BadSignature);
        }
        let claims: TokenClaims =
            serde_json::from_slice(body).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if claims.version != TOKEN_VERSION {
            return Err(TokenError::Malformed(format!("unsupported token version {}", claims.version)));
        }
        if now_ms.saturating_sub(claims.issued_at_ms) > TOKEN_VALIDITY_MS {
            return Err(TokenError::Expired);
        }
        let job_id = JobId::parse(claims.job_id).map_err(|e| TokenError::Malformed(e.to_string()))?;
        Ok((job_id, InvocationId(claims.invocation_id)))
    }

    fn sign(&self, body: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Malformed(format!("invalid HMAC key: {e}")))?;
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Plain equality would short-circuit on the first mismatched byte, leaking
/// timing information about how much of a forged signature was correct.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
