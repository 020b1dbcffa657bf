use std::process;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wbxml::cli::Cli;

fn main() {
    // Diagnostics go to stderr; stdout carries only converted output
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = Cli::run() {
        eprintln!("Error: {e} [{} {}]", e.code(), e.message());
        process::exit(1);
    }
}
