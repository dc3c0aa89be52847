// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalized span, trace and batch types.
//!
//! Spans use the Datadog trace-agent v0.4 field layout so batches decoded from
//! a v0.4 request body re-serialize to a byte-compatible payload. The engine
//! itself is agnostic to which wire format produced a batch.

use std::collections::HashMap;

use hyper::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// One timed operation record within a trace.
///
/// `parent_id == 0` marks a root span. Non-root parent ids are expected to
/// reference another span of the same trace but are carried as-is when they
/// don't; the amplifier replays malformed linkage unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource: String,
    pub trace_id: u64,
    pub span_id: u64,
    #[serde(default)]
    pub parent_id: u64,
    /// Start time, nanoseconds since the unix epoch.
    #[serde(default)]
    pub start: i64,
    /// Duration in nanoseconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default, rename = "type")]
    pub span_type: String,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}

/// An ordered sequence of spans sharing one trace identifier.
pub type Trace = Vec<Span>;

/// One accumulated group of traces plus the transport headers carried by the
/// inbound request(s) that produced them.
///
/// A batch is mutated only through [`Batch::merge`] on the amplifier's owning
/// task; once duplicated for a dispatch worker it is private to that worker.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub traces: Vec<Trace>,
    pub headers: HeaderMap,
}

impl Batch {
    pub fn new(traces: Vec<Trace>, headers: HeaderMap) -> Self {
        Batch { traces, headers }
    }

    /// Total number of spans across all accumulated traces.
    pub fn span_count(&self) -> usize {
        self.traces.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Merges another partial batch into this one: traces are concatenated and
    /// headers merged with last-non-empty-wins per key.
    pub fn merge(&mut self, other: Batch) {
        self.traces.extend(other.traces);
        for (key, value) in &other.headers {
            if !value.is_empty() {
                self.headers.insert(key.clone(), value.clone());
            }
        }
    }

    /// Produces a structurally independent copy. Mutating the copy's span
    /// identifiers or parent links never affects this batch or sibling copies.
    pub fn duplicate(&self) -> Batch {
        self.clone()
    }

    /// Headers safe to forward on outbound resends. `host` and
    /// `content-length` belong to the original hop and are recomputed by the
    /// client for each send; `content-type` is set per send from the wire
    /// format, so the inbound one must not ride along as a duplicate.
    pub fn forward_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONTENT_TYPE);
        headers
    }
}
