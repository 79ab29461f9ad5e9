//! Audio Engine Module
//!
//! The external engine that owns every audio node and does all DSP.
//! This crate only talks to it through the `AudioEngine` trait:
//! - Node construction (source, pitch shift, reverb, equalizer)
//! - Parameter updates on live nodes
//! - Transport start/stop and the one-time unlock

pub mod simulated;

use std::fmt;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::params::{EqBand, Equalizer};

pub use simulated::{EngineEvent, Fault, SimulatedEngine, SimulatedNode};

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by an engine implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Opaque reference to a node owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Kinds of node in the audition chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    PitchShift,
    Reverb,
    Equalizer,
    Output,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source => write!(f, "source"),
            NodeKind::PitchShift => write!(f, "pitch shift"),
            NodeKind::Reverb => write!(f, "reverb"),
            NodeKind::Equalizer => write!(f, "equalizer"),
            NodeKind::Output => write!(f, "output"),
        }
    }
}

/// Operations the session needs from an audio engine
///
/// Engines are driven from a single thread; futures are not required
/// to be `Send`.
#[allow(async_fn_in_trait)]
pub trait AudioEngine {
    /// Allow the engine to produce sound.
    ///
    /// Hosts may refuse this until the user has interacted with the page.
    async fn unlock(&self) -> EngineResult<()>;

    /// Fetch and decode a source, returning its player node
    async fn load_source(&self, source_url: &str) -> EngineResult<NodeHandle>;

    fn create_pitch_shift(&self, semitones: i32) -> EngineResult<NodeHandle>;

    /// Create a reverb node. It is silent until `generate_reverb` completes.
    fn create_reverb(&self, decay_secs: f32) -> EngineResult<NodeHandle>;

    /// Set the decay of a reverb and (re)compute its impulse response
    async fn generate_reverb(&self, reverb: NodeHandle, decay_secs: f32) -> EngineResult<()>;

    fn create_equalizer(&self, gains: Equalizer) -> EngineResult<NodeHandle>;

    /// Connect `chain` in order, the last node feeding the default output
    fn connect_to_output(&self, chain: &[NodeHandle]) -> EngineResult<()>;

    fn set_playback_rate(&self, source: NodeHandle, rate: f32) -> EngineResult<()>;

    fn set_pitch(&self, pitch_shift: NodeHandle, semitones: i32) -> EngineResult<()>;

    fn set_equalizer_gain(
        &self,
        equalizer: NodeHandle,
        band: EqBand,
        gain_db: i32,
    ) -> EngineResult<()>;

    fn start(&self, source: NodeHandle) -> EngineResult<()>;

    fn stop(&self, source: NodeHandle) -> EngineResult<()>;

    /// Release a node. Unknown or already released handles are ignored.
    fn dispose(&self, node: NodeHandle);
}

/// An engine plus its process-wide unlock state
///
/// Sessions share one context through `Rc`.
pub struct AudioContext<E> {
    engine: E,
    unlocked: OnceCell<()>,
}

impl<E: AudioEngine> AudioContext<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            unlocked: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Unlock the engine once.
    ///
    /// Later calls return immediately. A failed attempt leaves the context
    /// locked so the next user gesture can retry.
    pub async fn unlock(&self) -> EngineResult<()> {
        self.unlocked
            .get_or_try_init(|| self.engine.unlock())
            .await
            .map(|_| ())
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.initialized()
    }
}
