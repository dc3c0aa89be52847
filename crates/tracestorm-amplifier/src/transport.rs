// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pooled HTTP client construction.
//!
//! A run sends `threads * repeat` POSTs to a single collector host; the client
//! must reuse connections rather than dial per request. One client is built
//! per amplifier run and shared read-only by all of its workers.

use std::time::Duration;

const MAX_IDLE_CONNS_PER_HOST: usize = 100;
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Builds the connection-pooled client tuned for sustained high-volume POSTs
/// to one destination host.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .pool_idle_timeout(IDLE_CONN_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .build()
}
