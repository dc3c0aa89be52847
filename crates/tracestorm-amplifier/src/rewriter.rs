// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Identifier re-randomization between resends.
//!
//! Collector backends deduplicate by trace/span identifier, so every resend of
//! an amplified batch must carry fresh identifiers while keeping the
//! parent/child tree shape intact. Relinking applies to *all* children of a
//! rewritten span, and works regardless of span ordering within the trace: new
//! span ids are drawn in a first pass, parent links remapped in a second.

use std::collections::HashMap;

use rand::Rng;

use crate::span::Trace;

/// Assigns every trace a fresh random trace id and every span a fresh random
/// span id, remapping each span's parent id alongside.
///
/// Root spans (`parent_id == 0`) stay roots. A parent id that doesn't
/// reference any span of the trace is left untouched; malformed linkage is
/// replayed, not repaired.
pub fn rewrite_trace_ids(traces: &mut [Trace]) {
    let mut rng = rand::thread_rng();

    for trace in traces.iter_mut() {
        let new_trace_id: u64 = rng.gen();

        let mut id_map: HashMap<u64, u64> = HashMap::with_capacity(trace.len());
        for span in trace.iter_mut() {
            let new_span_id: u64 = rng.gen();
            id_map.insert(span.span_id, new_span_id);
            span.trace_id = new_trace_id;
            span.span_id = new_span_id;
        }

        for span in trace.iter_mut() {
            if span.parent_id == 0 {
                continue;
            }
            if let Some(new_parent) = id_map.get(&span.parent_id) {
                span.parent_id = *new_parent;
            }
        }
    }
}
