// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace intake HTTP server.
//!
//! Receives trace payloads from tracer clients, decodes them into the
//! normalized batch model and hands them to the [`Intake`] seam (the amplifier
//! handle). The listener recognizes the collector wire format from the request
//! path and content-type; the engine behind the seam is format-agnostic.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::amplifier::Intake;
use crate::format::{JsonFormat, MsgpackFormat, TraceFormat};
use crate::http_utils::{
    create_traces_success_http_response, log_and_create_http_response, media_type,
    verify_request_content_length, Body,
};
use crate::span::Batch;

const TRACE_V04_ENDPOINT_PATH: &str = "/v0.4/traces";
const TRACE_API_ENDPOINT_PATH: &str = "/api/traces";
const INFO_ENDPOINT_PATH: &str = "/info";
const TRACE_COUNT_HEADER: &str = "x-datadog-trace-count";
const MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes

/// HTTP server accepting trace payloads for one amplifier run.
pub struct TraceListener {
    listener: TcpListener,
    intake: Arc<dyn Intake>,
}

impl TraceListener {
    /// Binds the intake socket. Use port 0 for an ephemeral local port and
    /// read it back through [`TraceListener::local_addr`].
    pub async fn bind(addr: SocketAddr, intake: Arc<dyn Intake>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TraceListener { listener, intake })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the cancellation token fires; connection-level
    /// errors are logged and survived.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.listener.local_addr()?;
        info!("trace intake listening on {addr}");

        let intake = self.intake;
        let service = service_fn(move |req| {
            let intake = intake.clone();
            Self::endpoint_handler(req, intake)
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("trace intake shutting down");
                    return Ok(());
                }
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("intake server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("connection handler panicked: {e:?}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("intake connection error: {e}");
                }
            });
        }
    }

    async fn endpoint_handler(
        req: Request<Incoming>,
        intake: Arc<dyn Intake>,
    ) -> http::Result<Response<Body>> {
        match (req.method(), req.uri().path()) {
            (&Method::PUT | &Method::POST, TRACE_V04_ENDPOINT_PATH) => {
                let format: Arc<dyn TraceFormat> =
                    match media_type(req.headers(), "application/json").as_str() {
                        "application/msgpack" => Arc::new(MsgpackFormat),
                        "application/json" | "test/json" => Arc::new(JsonFormat),
                        other => {
                            return log_and_create_http_response(
                                &format!("Error processing traces: unrecognized media type: {other}"),
                                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                            );
                        }
                    };
                Self::handle_traces(req, intake, format).await
            }
            (&Method::POST, TRACE_API_ENDPOINT_PATH) => {
                Self::handle_traces(req, intake, Arc::new(JsonFormat)).await
            }
            (_, INFO_ENDPOINT_PATH) => Self::info_handler(),
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    async fn handle_traces(
        req: Request<Incoming>,
        intake: Arc<dyn Intake>,
        format: Arc<dyn TraceFormat>,
    ) -> http::Result<Response<Body>> {
        debug!(format = format.name(), "received traces to process");
        let (parts, body) = req.into_parts();

        // tracer clients announce an empty payload up front
        if parts
            .headers
            .get(TRACE_COUNT_HEADER)
            .is_some_and(|v| v.to_str().ok() == Some("0"))
        {
            return create_traces_success_http_response("Empty trace payload announced, nothing to do");
        }

        if let Some(response) = verify_request_content_length(
            &parts.headers,
            MAX_REQUEST_CONTENT_LENGTH,
            "Error processing traces",
        ) {
            return response;
        }

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading traces request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let traces = match format.deserialize(&body_bytes) {
            Ok(traces) => traces,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error deserializing trace from request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };
        if traces.iter().all(Vec::is_empty) {
            return create_traces_success_http_response("Empty traces, nothing to amplify");
        }

        match intake.accept(Batch::new(traces, parts.headers)).await {
            Ok(()) => {
                create_traces_success_http_response("Successfully buffered traces to be amplified")
            }
            Err(e) => log_and_create_http_response(
                &format!("Error handing traces to the amplifier: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }

    fn info_handler() -> http::Result<Response<Body>> {
        let response_json = json!({
            "endpoints": [
                TRACE_V04_ENDPOINT_PATH,
                TRACE_API_ENDPOINT_PATH,
                INFO_ENDPOINT_PATH,
            ],
        });
        Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes::Bytes::from(response_json.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::testutil::test_span;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records every accepted batch, or rejects them all.
    struct RecordingIntake {
        batches: Mutex<Vec<Batch>>,
        fail: bool,
    }

    impl RecordingIntake {
        fn new() -> Self {
            RecordingIntake {
                batches: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Intake for RecordingIntake {
        async fn accept(&self, batch: Batch) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("intake rejected"));
            }
            self.batches.lock().await.push(batch);
            Ok(())
        }
    }

    async fn start_listener(intake: Arc<RecordingIntake>) -> (SocketAddr, CancellationToken) {
        let listener = TraceListener::bind("127.0.0.1:0".parse().unwrap(), intake)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = listener.serve(serve_cancel).await;
        });
        (addr, cancel)
    }

    fn traces_payload() -> Vec<Vec<crate::span::Span>> {
        vec![vec![test_span(1, 1, 0), test_span(1, 2, 1)]]
    }

    #[tokio::test]
    async fn test_v04_msgpack_intake() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let body = rmp_serde::to_vec_named(&traces_payload()).unwrap();
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.4/traces"))
            .header("content-type", "application/msgpack")
            .header("x-datadog-trace-count", "1")
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "{}");

        let batches = intake.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].span_count(), 2);
        assert_eq!(
            batches[0].headers.get("x-datadog-trace-count").unwrap(),
            "1"
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_v04_json_intake_by_content_type() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.4/traces"))
            .header("content-type", "application/json")
            .body(serde_json::to_vec(&traces_payload()).unwrap())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(intake.batches.lock().await.len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_api_traces_json_intake() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/traces"))
            .body(serde_json::to_vec(&traces_payload()).unwrap())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(intake.batches.lock().await.len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_zero_trace_count_short_circuits() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.4/traces"))
            .header("x-datadog-trace-count", "0")
            .body("")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert!(intake.batches.lock().await.is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.4/traces"))
            .header("content-type", "application/msgpack")
            .body(&b"\xc1garbage"[..])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        assert!(intake.batches.lock().await.is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unsupported_media_type() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.4/traces"))
            .header("content-type", "application/x-thrift")
            .body("whatever")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 415);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/v0.9/traces"))
            .body("")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 404);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_rejected_intake_is_server_error() {
        let intake = Arc::new(RecordingIntake {
            batches: Mutex::new(Vec::new()),
            fail: true,
        });
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/traces"))
            .body(serde_json::to_vec(&traces_payload()).unwrap())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_info_lists_endpoints() {
        let intake = Arc::new(RecordingIntake::new());
        let (addr, cancel) = start_listener(intake.clone()).await;

        let resp = reqwest::Client::new()
            .get(format!("http://{addr}/info"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let info: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
        assert!(info["endpoints"]
            .as_array()
            .unwrap()
            .contains(&json!("/v0.4/traces")));
        cancel.cancel();
    }
}
