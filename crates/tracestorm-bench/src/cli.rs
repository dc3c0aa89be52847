// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;

/// Replays synthetic call trees through the trace amplifier against a
/// collector backend.
#[derive(Debug, Parser)]
#[command(name = "tracestorm-bench", version, about)]
pub struct Cli {
    /// Benchmark configuration file in JSON format
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Run only the named task(s); defaults to every configured task
    #[arg(long, short = 't')]
    pub task: Vec<String>,

    /// Print the resolved task configuration and exit
    #[arg(long)]
    pub show: bool,
}
