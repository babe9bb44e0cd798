//! # mw-sink
//!
//! Command-line entrypoint for the maxwell CDC sink. Loads a TOML config
//! (plus `AD_`-prefixed environment overrides) and runs one of two
//! backends to completion: `ldb` (embedded KV store with a query HTTP
//! surface) or `es` (Elasticsearch bulk indexing).
//!
//! Neither subcommand daemonises or exposes a graceful shutdown path (§7,
//! §6) — a fatal error terminates the process with a non-zero exit code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mw_core::config::load_config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mw-sink")]
#[command(about = "Maxwell CDC sink: project a Kafka change stream into Elasticsearch or an embedded LDB store")]
struct Args {
    #[command(subcommand)]
    backend: Backend,

    /// Path to the TOML config file.
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Backend {
    /// Project into an embedded sled-backed KV store, with a query HTTP surface.
    Ldb,
    /// Project into Elasticsearch via the bulk API.
    Es,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    match args.backend {
        Backend::Ldb => mw_io::supervisor::run_ldb(config).await,
        Backend::Es => mw_io::supervisor::run_es(config).await,
    }
}
