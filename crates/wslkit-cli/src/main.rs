//! # wslkit — WSL templates and images
//!
//! Keeps a catalog of root-filesystem archives and materializes them as
//! WSL instances with recorded provenance.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wslkit_common::error::WslkitError;

use crate::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = commands::execute(cli).await;
    if let Err(e) = &result {
        if let Some(hint) = e.downcast_ref::<WslkitError>().and_then(output::hint) {
            eprintln!("hint: {hint}");
        }
    }
    result
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
