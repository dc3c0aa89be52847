// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The amplification coordination loop.
//!
//! One owning task accumulates inbound trace batches, detects the span-count
//! threshold crossing exactly once, fans the frozen batch out across the
//! configured number of dispatch workers, and waits for all of them (or for
//! cancellation) before declaring the run finished.
//!
//! All appends flow through an mpsc channel into the owning task, so the
//! threshold check and the ready transition are serialized by construction —
//! no two callers can concurrently decide "threshold reached".

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{AmplifierConfig, ConfigError};
use crate::format::TraceFormat;
use crate::span::Batch;
use crate::{transport, worker};

const APPEND_CHANNEL_BUFFER_SIZE: usize = 32;

/// Seam between the intake listener and the amplification engine.
#[async_trait]
pub trait Intake: Send + Sync {
    /// Hands one decoded inbound batch to the engine.
    async fn accept(&self, batch: Batch) -> anyhow::Result<()>;
}

/// How a run terminated. There is no partial-failure outcome: a run either
/// saw every worker complete or was cancelled/closed before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All dispatch workers reported completion.
    Finished,
    /// The run was cancelled or explicitly closed; in-flight workers are
    /// abandoned (they finish their repeat loop into a buffered channel).
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Accumulating,
    AwaitingCompletion,
}

/// Cloneable producer side of one amplifier run.
#[derive(Clone)]
pub struct AmplifierHandle {
    append_tx: Sender<Batch>,
    close: CancellationToken,
}

impl AmplifierHandle {
    /// Merges a partial batch into the run's accumulated batch. Safe to call
    /// repeatedly and concurrently from the inbound-request path; the owning
    /// task serializes all threshold decisions.
    pub async fn append(&self, batch: Batch) -> anyhow::Result<()> {
        self.append_tx
            .send(batch)
            .await
            .map_err(|_| anyhow::anyhow!("amplifier run is no longer accepting traces"))
    }

    /// Requests the run to stop. Idempotent: concurrent or repeated calls
    /// fire the internal close signal at most once.
    pub fn close(&self) {
        self.close.cancel();
    }
}

#[async_trait]
impl Intake for AmplifierHandle {
    async fn accept(&self, batch: Batch) -> anyhow::Result<()> {
        self.append(batch).await
    }
}

/// The single-owner coordination state for one run.
///
/// An amplifier lives for exactly one run: construct, accumulate, dispatch,
/// await completion, terminal. It is not reused.
pub struct Amplifier {
    config: Arc<AmplifierConfig>,
    format: Arc<dyn TraceFormat>,
    client: reqwest::Client,
    cancel: CancellationToken,
    close: CancellationToken,
    append_rx: Receiver<Batch>,
    appends_open: bool,
    done_tx: Sender<usize>,
    done_rx: Receiver<usize>,
    batch: Batch,
    received_spans: usize,
    finished_workers: usize,
    phase: Phase,
}

impl Amplifier {
    /// Builds a run and its handle. Fails fast on an already cancelled token
    /// so a dead context can never launch workers.
    pub fn new(
        config: AmplifierConfig,
        format: Arc<dyn TraceFormat>,
        cancel: CancellationToken,
    ) -> Result<(Self, AmplifierHandle), ConfigError> {
        if cancel.is_cancelled() {
            return Err(ConfigError::AlreadyCancelled);
        }
        let client = transport::build_client().map_err(|e| ConfigError::Transport(e.to_string()))?;

        let (append_tx, append_rx) = mpsc::channel(APPEND_CHANNEL_BUFFER_SIZE);
        // sized to the worker count so a completion report arriving after
        // cancellation never blocks the reporting worker
        let (done_tx, done_rx) = mpsc::channel(config.threads);
        let close = CancellationToken::new();

        let amplifier = Amplifier {
            config: Arc::new(config),
            format,
            client,
            cancel,
            close: close.clone(),
            append_rx,
            appends_open: true,
            done_tx,
            done_rx,
            batch: Batch::default(),
            received_spans: 0,
            finished_workers: 0,
            phase: Phase::Accumulating,
        };
        let handle = AmplifierHandle { append_tx, close };
        Ok((amplifier, handle))
    }

    /// The coordination loop. Blocks until cancellation, explicit close, or
    /// the last worker completion; only the latter yields
    /// [`RunOutcome::Finished`].
    pub async fn run(mut self) -> RunOutcome {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("amplifier run cancelled");
                    return RunOutcome::Cancelled;
                }
                _ = self.close.cancelled() => {
                    info!("amplifier run closed");
                    return RunOutcome::Cancelled;
                }
                maybe_part = self.append_rx.recv(), if self.appends_open => {
                    match maybe_part {
                        Some(part) => self.on_append(part),
                        // every handle dropped; keep waiting on the other events
                        None => self.appends_open = false,
                    }
                }
                Some(id) = self.done_rx.recv(), if self.phase == Phase::AwaitingCompletion => {
                    self.finished_workers += 1;
                    debug!(
                        worker = id,
                        finished = self.finished_workers,
                        threads = self.config.threads,
                        "dispatch worker finished"
                    );
                    if self.finished_workers == self.config.threads {
                        info!(threads = self.config.threads, "all dispatch workers finished");
                        return RunOutcome::Finished;
                    }
                }
            }
        }
    }

    fn on_append(&mut self, part: Batch) {
        let spans = part.span_count();
        self.received_spans += spans;
        self.batch.merge(part);
        debug!(spans, total = self.received_spans, "accumulated inbound batch");

        // at-most-once: the first append to reach the threshold freezes the
        // batch and launches the workers; later appends are accepted but can
        // never re-trigger
        if self.phase == Phase::Accumulating && self.received_spans >= self.config.expected_spans {
            self.dispatch_workers();
            self.phase = Phase::AwaitingCompletion;
        }
    }

    fn dispatch_workers(&mut self) {
        let frozen = std::mem::take(&mut self.batch);
        info!(
            spans = self.received_spans,
            threshold = self.config.expected_spans,
            threads = self.config.threads,
            repeat = self.config.repeat,
            "span threshold reached, launching dispatch workers"
        );
        for id in 1..=self.config.threads {
            tokio::spawn(worker::dispatch(
                id,
                frozen.duplicate(),
                self.config.endpoint.clone(),
                self.config.repeat,
                self.client.clone(),
                Arc::clone(&self.format),
                self.done_tx.clone(),
            ));
        }
    }
}
