// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use clinicsync::config::{log_path, resolve_data_dir};
use clinicsync::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `watch` runs unattended and logs to a file; everything else to stderr.
    let log_file = match cli.command {
        Command::Watch => resolve_data_dir(cli.dir.as_deref())
            .ok()
            .map(|dir| log_path(&dir)),
        _ => None,
    };
    setup_logging(log_file);

    if let Err(e) = clinicsync::run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn setup_logging(log_path: Option<PathBuf>) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    let file = log_path.and_then(|path| {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
