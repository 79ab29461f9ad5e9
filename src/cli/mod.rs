//! CLI Module
//!
//! Console front end: loads one source into a session on the simulated
//! engine and reads control commands from stdin.

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::error::Result;

/// Audition - play one audio source through live pitch, reverb and EQ
#[derive(Parser, Debug)]
#[command(name = "audition")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Audio source to load (overrides the config file)
    #[arg(short, long)]
    pub source: Option<String>,

    /// JSON file with the source and initial parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Artificial latency for engine loads and reverb generation
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_flag_overrides_default() {
        let cli = Cli::parse_from(["audition", "--source", "take2.wav", "--latency-ms", "20"]);
        let config = cli.session_config().unwrap();

        assert_eq!(config.source, "take2.wav");
        assert_eq!(cli.latency_ms, 20);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["audition"]);
        assert_eq!(cli.session_config().unwrap(), SessionConfig::default());
        assert!(!cli.verbose);
    }
}
