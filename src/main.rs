//! Audition CLI
//!
//! Loads one source into a session on the simulated engine and drives it
//! from stdin.

use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use audition::cli::commands::{run_console, HELP};
use audition::cli::Cli;
use audition::engine::{AudioContext, SimulatedEngine};
use audition::session::AudioControlSession;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Audition v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.session_config()?;
    let engine = SimulatedEngine::with_latency(Duration::from_millis(cli.latency_ms));
    let context = Rc::new(AudioContext::new(engine));
    let session = AudioControlSession::new(context);

    if let Err(err) = session.initialize(&config.source, config.params).await {
        eprintln!("error: {}", err.friendly_message());
    }

    println!("{}", HELP);
    run_console(
        &session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    session.teardown();
    Ok(())
}
