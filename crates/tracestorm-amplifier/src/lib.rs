// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace amplification engine.
//!
//! Accumulates trace batches received over HTTP until a configured span-count
//! threshold is met, then fans the frozen batch out across a pool of dispatch
//! workers that each resend mutated copies to a target collector endpoint.
//! Trace and span identifiers are re-randomized between sends so the collector
//! ingests every repeat as a distinct trace.
//!
//! Modules:
//! - [`span`]: the normalized span/trace/batch data model
//! - [`format`]: the wire-format capability trait and its msgpack/JSON impls
//! - [`rewriter`]: identifier re-randomization between resends
//! - [`amplifier`]: the accumulate → fan-out → fan-in coordination loop
//! - [`worker`]: one concurrent resend loop over a private batch copy
//! - [`listener`]: the trace intake HTTP server feeding the amplifier
//! - [`transport`]: the pooled HTTP client shared by one run's workers

pub mod amplifier;
pub mod config;
pub mod format;
pub mod http_utils;
pub mod listener;
pub mod rewriter;
pub mod span;
pub mod transport;
pub mod worker;
