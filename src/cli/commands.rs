//! Console commands
//!
//! One command per line, mirroring the buttons and sliders of the panel.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::config::{SessionConfig, DEFAULT_SOURCE};
use crate::controls::{Control, ControlPanel};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::params::EqBand;
use crate::session::AudioControlSession;

pub const HELP: &str = "\
commands:
  play | toggle          start or pause playback
  rate <0.5..2>          playback speed
  pitch <-12..12>        transpose in semitones
  decay <0..5>           reverb decay in seconds
  eq <low|mid|high> <db> equalizer band gain (-30..30)
  reset                  restore default parameters
  dismiss                clear the error banner
  status                 print the session as JSON
  panel                  print the control panel
  save <path>            write the source and parameters as a config file
  quit";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0} (type 'help' for commands)")]
pub struct ParseCommandError(String);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Toggle,
    Set(Control, f32),
    Reset,
    Dismiss,
    Status,
    Panel,
    Save(PathBuf),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let number = |word: Option<&&str>| -> std::result::Result<f32, ParseCommandError> {
            let word = word.ok_or_else(|| ParseCommandError("missing value".to_string()))?;
            word.parse::<f32>()
                .map_err(|_| ParseCommandError(format!("'{}' is not a number", word)))
        };

        match words.as_slice() {
            ["play"] | ["pause"] | ["toggle"] => Ok(Command::Toggle),
            ["rate", rest @ ..] => Ok(Command::Set(Control::PlaybackRate, number(rest.first())?)),
            ["pitch", rest @ ..] => Ok(Command::Set(Control::Pitch, number(rest.first())?)),
            ["decay", rest @ ..] => Ok(Command::Set(Control::ReverbDecay, number(rest.first())?)),
            ["eq", band, rest @ ..] => {
                let band = band
                    .parse::<EqBand>()
                    .map_err(|_| ParseCommandError(format!("unknown band '{}'", band)))?;
                Ok(Command::Set(Control::Equalizer(band), number(rest.first())?))
            }
            ["reset"] => Ok(Command::Reset),
            ["dismiss"] => Ok(Command::Dismiss),
            ["status"] => Ok(Command::Status),
            ["panel"] => Ok(Command::Panel),
            ["save", path] => Ok(Command::Save(PathBuf::from(path))),
            ["save"] => Err(ParseCommandError("missing path".to_string())),
            ["help"] => Ok(Command::Help),
            ["quit"] | ["exit"] => Ok(Command::Quit),
            [] => Err(ParseCommandError("empty command".to_string())),
            _ => Err(ParseCommandError(format!("unknown command '{}'", line.trim()))),
        }
    }
}

/// Run one command, returning the text to print
pub async fn execute<E: AudioEngine>(
    session: &AudioControlSession<E>,
    command: Command,
) -> Result<String> {
    debug!(?command, "executing");
    match command {
        Command::Toggle => {
            let state = session.toggle_playback().await?;
            Ok(state.to_string())
        }
        Command::Set(control, value) => {
            control.apply(session, value).await?;
            Ok(format!(
                "{}: {}",
                control.spec().label,
                control.format_value(&session.params())
            ))
        }
        Command::Reset => {
            session.reset_to_defaults().await?;
            Ok("Parameters reset".to_string())
        }
        Command::Dismiss => {
            session.dismiss_error();
            Ok(String::new())
        }
        Command::Status => Ok(serde_json::to_string_pretty(&session.snapshot())?),
        Command::Panel => Ok(ControlPanel::from_session(session).render()),
        Command::Save(path) => {
            let snapshot = session.snapshot();
            let config = SessionConfig {
                source: snapshot
                    .source_url
                    .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                params: snapshot.params,
            };
            config.save(&path)?;
            Ok(format!("Saved {}", path.display()))
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok(String::new()),
    }
}

/// Read commands until `quit` or end of input
pub async fn run_console<E, R, W>(
    session: &AudioControlSession<E>,
    input: R,
    mut output: W,
) -> Result<()>
where
    E: AudioEngine,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let text = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => match execute(session, command).await {
                Ok(text) => text,
                Err(err) => {
                    if err.is_recoverable() {
                        warn!(code = err.error_code(), "command failed: {}", err);
                    } else {
                        error!(code = err.error_code(), "command failed: {}", err);
                    }
                    format!("error: {}", err.friendly_message())
                }
            },
            Err(err) => format!("error: {}", err),
        };
        if !text.is_empty() {
            output.write_all(text.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
    }
    output.flush().await?;
    Ok(())
}
