use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use wallet_ledger::{bin_utils::Service, config::LedgerConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let filename = args
        .next()
        .context("Expected a file name as the first argument")?;
    let config = match args.next() {
        Some(path) => LedgerConfig::load(Path::new(&path))?,
        None => LedgerConfig::default(),
    }
    .with_env_overrides()?;

    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        config,
        error_printer: Box::new(|line, err| {
            // declines and insufficient funds are answers, not failures
            if !err.is_business_outcome() {
                eprintln!("Error at line {line}: {err}")
            }
        }),
    };
    service.run()
}
