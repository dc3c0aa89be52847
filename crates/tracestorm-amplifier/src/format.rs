// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire-format capability interface.
//!
//! The amplification engine is written once against [`TraceFormat`]; each
//! collector backend supplies one implementation. A batch leaves the engine in
//! the same wire format it arrived in.

use crate::rewriter;
use crate::span::Trace;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("failed to encode traces: {0}")]
    Encode(String),

    #[error("failed to decode traces: {0}")]
    Decode(String),
}

/// Everything the engine needs from a collector wire format.
pub trait TraceFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Content-type sent on outbound POSTs and matched on inbound requests.
    fn content_type(&self) -> &'static str;

    fn serialize(&self, traces: &[Trace]) -> Result<Vec<u8>, FormatError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<Trace>, FormatError>;

    fn count_spans(&self, traces: &[Trace]) -> usize {
        traces.iter().map(Vec::len).sum()
    }

    fn rewrite_ids(&self, traces: &mut [Trace]) {
        rewriter::rewrite_trace_ids(traces);
    }
}

/// Datadog v0.4-style msgpack encoding of `Vec<Trace>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackFormat;

impl TraceFormat for MsgpackFormat {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn serialize(&self, traces: &[Trace]) -> Result<Vec<u8>, FormatError> {
        rmp_serde::to_vec_named(traces).map_err(|e| FormatError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<Trace>, FormatError> {
        rmp_serde::from_slice(bytes).map_err(|e| FormatError::Decode(e.to_string()))
    }
}

/// JSON encoding of `Vec<Trace>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl TraceFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize(&self, traces: &[Trace]) -> Result<Vec<u8>, FormatError> {
        serde_json::to_vec(traces).map_err(|e| FormatError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<Trace>, FormatError> {
        serde_json::from_slice(bytes).map_err(|e| FormatError::Decode(e.to_string()))
    }
}
