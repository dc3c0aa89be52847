// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod cli;
mod config;
mod emitter;
mod route;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tracestorm_amplifier::amplifier::Amplifier;
use tracestorm_amplifier::config::AmplifierConfig;
use tracestorm_amplifier::listener::TraceListener;

use crate::cli::Cli;
use crate::config::{BenchConfig, TaskConfig};

const LOG_LEVEL_ENV: &str = "TRACESTORM_LOG_LEVEL";

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();

    let bench_config = match BenchConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load benchmark configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(bench_config.disable_log);

    let tasks = bench_config.select_tasks(&cli.task);
    if tasks.is_empty() {
        error!("no benchmark tasks configured");
        return;
    }

    if cli.show {
        match serde_json::to_string_pretty(&tasks) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => error!("failed to render tasks: {e}"),
        }
        return;
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after in-flight sends");
            signal_cancel.cancel();
        }
    });

    // tasks run one at a time: parallel amplification would distort the load
    // each task is meant to measure
    for task in &tasks {
        if cancel.is_cancelled() {
            break;
        }
        info!(
            task = %task.name,
            threads = task.threads,
            repeat = task.repeat,
            collector = %task.collector_url,
            "starting benchmark task"
        );
        if let Err(e) = run_task(task, cancel.clone()).await {
            error!(task = %task.name, "task failed: {e:#}");
        }
    }
}

fn init_logging(disable_log: bool) {
    let log_level = env::var(LOG_LEVEL_ENV)
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = if disable_log {
        "off".to_string()
    } else {
        format!("h2=off,hyper=off,rustls=off,{log_level}")
    };

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Runs one task to completion: amplifier and intake listener come up on an
/// ephemeral local port, the synthesized trace is submitted once, and the run
/// ends when every dispatch worker has reported or the token is cancelled.
async fn run_task(task: &TaskConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let hops = route::load_route(&task.route)?;
    let tree = route::build_tree(&hops)?;
    let expected_spans = tree.span_count();
    let format = task.wire_format()?;

    let amplifier_config =
        AmplifierConfig::new(&task.collector_url, task.threads, task.repeat, expected_spans)?;
    let (amplifier, handle) = Amplifier::new(amplifier_config, format.clone(), cancel.clone())?;
    let run = tokio::spawn(amplifier.run());

    let bind_addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let listener = TraceListener::bind(bind_addr, Arc::new(handle)).await?;
    let intake_addr = listener.local_addr()?;
    let listener_cancel = cancel.child_token();
    let serve_cancel = listener_cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.serve(serve_cancel).await {
            error!("intake listener failed: {e}");
        }
    });

    let client = reqwest::Client::new();
    let trace = emitter::build_trace(&tree);
    emitter::emit(&client, intake_addr, format.as_ref(), trace).await?;

    let outcome = run.await.context("amplifier run panicked")?;
    info!(task = %task.name, ?outcome, spans = expected_spans, "benchmark task complete");

    listener_cancel.cancel();
    Ok(())
}
