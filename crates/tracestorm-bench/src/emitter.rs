// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Synthesizes a trace from a call tree and submits it to the local intake.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracestorm_amplifier::format::TraceFormat;
use tracestorm_amplifier::span::{Span, Trace};
use tracing::debug;

use crate::route::CallNode;

/// Minimum synthesized span duration. Mirrors what a real instrumented
/// operation takes at the very least, so collector-side latency math stays
/// plausible.
const SPAN_FLOOR_NS: i64 = 30_000_000;

/// Gap between a parent span's start and its first child, and between the
/// last child's end and the parent's end.
const NESTING_PAD_NS: i64 = 1_000_000;

/// Builds one trace from the call tree: a fresh random trace id, fresh span
/// ids, parent links mirroring the tree and children nested strictly inside
/// their parent's time window.
pub fn build_trace(root: &CallNode) -> Trace {
    let trace_id = rand::random();
    let start = unix_now_ns();
    let mut spans = Vec::with_capacity(root.span_count());
    synthesize(root, trace_id, 0, start, &mut spans);
    spans
}

fn synthesize(node: &CallNode, trace_id: u64, parent_id: u64, start: i64, out: &mut Trace) -> i64 {
    let span_id = rand::random();
    let index = out.len();

    let mut meta = HashMap::from([
        ("id".to_string(), node.id.to_string()),
        ("service".to_string(), node.service.clone()),
        ("name".to_string(), node.name.clone()),
        ("action".to_string(), node.action.clone()),
        ("status".to_string(), node.status.clone()),
        ("message".to_string(), node.message.clone()),
    ]);
    meta.retain(|_, v| !v.is_empty());

    out.push(Span {
        service: node.service.clone(),
        name: node.name.clone(),
        resource: if node.action.is_empty() {
            node.name.clone()
        } else {
            node.action.clone()
        },
        trace_id,
        span_id,
        parent_id,
        start,
        duration: 0,
        error: i32::from(node.status == "error"),
        meta,
        metrics: HashMap::new(),
        span_type: "custom".to_string(),
    });

    let mut cursor = start + NESTING_PAD_NS;
    for child in &node.children {
        cursor += synthesize(child, trace_id, span_id, cursor, out);
    }

    let duration = (cursor + NESTING_PAD_NS - start).max(SPAN_FLOOR_NS);
    out[index].duration = duration;
    duration
}

fn unix_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Submits one synthesized trace to the intake listener in the task's wire
/// format.
pub async fn emit(
    client: &reqwest::Client,
    intake_addr: SocketAddr,
    format: &dyn TraceFormat,
    trace: Trace,
) -> anyhow::Result<()> {
    let body = format
        .serialize(std::slice::from_ref(&trace))
        .context("failed to encode synthesized trace")?;

    debug!(
        spans = trace.len(),
        format = format.name(),
        "submitting synthesized trace"
    );
    let response = client
        .post(format!("http://{intake_addr}/v0.4/traces"))
        .header("content-type", format.content_type())
        .header("x-datadog-trace-count", "1")
        .body(body)
        .send()
        .await
        .context("failed to submit trace to intake")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("intake rejected synthesized trace: {status}");
    }
    Ok(())
}
