//! Audition - live effect audition for a single audio source
//!
//! A session loads one source and routes it through a fixed chain:
//! source -> pitch shift -> reverb -> 3-band EQ -> output.
//! User controls (rate, pitch, reverb decay, EQ bands) are validated and
//! pushed into the live nodes as they change.
//!
//! # Architecture
//!
//! - `engine`: the `AudioEngine` trait the DSP backend implements, plus a
//!   simulated backend
//! - `session`: the chain lifecycle and parameter synchronization
//! - `controls`: slider descriptions and the panel model for front ends

pub mod cli;
pub mod config;
pub mod controls;
pub mod engine;
pub mod error;
pub mod params;
pub mod session;

pub use config::SessionConfig;
pub use engine::{AudioContext, AudioEngine};
pub use error::{AuditionError, Result};
pub use params::{EqBand, Equalizer, SessionParams};
pub use session::{AudioControlSession, PlaybackState, SessionSnapshot};
