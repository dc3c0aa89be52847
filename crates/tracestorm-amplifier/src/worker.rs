// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One unit of concurrent amplification work.
//!
//! A dispatch worker owns a private duplicate of the accumulated batch and
//! resends it `repeat` times, re-randomizing identifiers before every resend.
//! Transport and serialization failures are logged and skipped, never retried;
//! the completion report at the end is unconditional.

use std::sync::Arc;

use hyper::http::header;
use reqwest::Url;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, warn};

use crate::format::TraceFormat;
use crate::span::Batch;

/// Runs one worker's resend loop, then reports its index on `done` exactly
/// once — even if every send failed.
pub async fn dispatch(
    id: usize,
    mut batch: Batch,
    endpoint: Url,
    repeat: usize,
    client: reqwest::Client,
    format: Arc<dyn TraceFormat>,
    done: Sender<usize>,
) {
    let headers = batch.forward_headers();

    for attempt in 1..=repeat {
        match format.serialize(&batch.traces) {
            Err(e) => {
                warn!(worker = id, attempt, "skipping send, {e}");
            }
            Ok(body) => {
                let request = client
                    .post(endpoint.clone())
                    .headers(headers.clone())
                    .header(header::CONTENT_TYPE, format.content_type())
                    .body(body);
                match request.send().await {
                    Ok(response) => {
                        debug!(
                            worker = id,
                            attempt,
                            status = %response.status(),
                            "batch sent"
                        );
                    }
                    Err(e) => {
                        error!(worker = id, attempt, "send failed: {e}");
                    }
                }
            }
        }
        // fresh identifiers before the next resend so the collector can't
        // deduplicate the repeats
        format.rewrite_ids(&mut batch.traces);
    }

    if done.send(id).await.is_err() {
        debug!(worker = id, "coordination loop gone, completion report dropped");
    }
}
