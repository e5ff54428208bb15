// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire envelope wrapped around a Job's opaque `task` bytes so the
//! Engine can route to the right `TaskBackend` without interpreting the
//! payload itself — only the envelope's `backend` tag, never `payload`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("task payload is not a valid envelope: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEnvelope {
    backend: String,
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,
}

/// A Job's `task` field, decoded: which backend owns it, and the opaque
/// bytes that backend alone interprets.
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub backend: String,
    pub payload: Vec<u8>,
}

impl TaskEnvelope {
    pub fn new(backend: impl Into<String>, payload: Vec<u8>) -> Self {
        Self { backend: backend.into(), payload }
    }

    /// Produce the bytes that belong in `Job::task` / `Invocation::task`.
    pub fn encode(&self) -> Vec<u8> {
        let wire = WireEnvelope { backend: self.backend.clone(), payload: self.payload.clone() };
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    pub fn decode(task: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope =
            serde_json::from_slice(task).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(Self { backend: wire.backend, payload: wire.payload })
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
