//! Effect chain construction and release
//!
//! The chain is always: source -> pitch shift -> reverb -> equalizer -> output.
//! Nodes belong to the engine; the chain only holds their handles.

use tracing::debug;

use crate::engine::{AudioEngine, EngineError, NodeHandle, NodeKind};
use crate::error::{AuditionError, Result};
use crate::params::SessionParams;

/// Handles to a fully built and connected chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectChain {
    source: NodeHandle,
    pitch_shift: NodeHandle,
    reverb: NodeHandle,
    equalizer: NodeHandle,
}

impl EffectChain {
    /// Load `source_url` and build the chain configured with `params`.
    ///
    /// The source decode and the reverb impulse generation run together;
    /// both must finish before the chain is returned. On any failure every
    /// node acquired so far is disposed.
    pub async fn build<E: AudioEngine>(
        engine: &E,
        source_url: &str,
        params: &SessionParams,
    ) -> Result<Self> {
        let mut guard = PartialChain::new(engine);

        let pitch_shift = guard.adopt(
            engine
                .create_pitch_shift(params.pitch_semitones)
                .map_err(init_error(NodeKind::PitchShift))?,
        );
        let reverb = guard.adopt(
            engine
                .create_reverb(params.reverb_decay_secs)
                .map_err(init_error(NodeKind::Reverb))?,
        );
        let equalizer = guard.adopt(
            engine
                .create_equalizer(params.equalizer)
                .map_err(init_error(NodeKind::Equalizer))?,
        );

        let (loaded, generated) = tokio::join!(
            engine.load_source(source_url),
            engine.generate_reverb(reverb, params.reverb_decay_secs),
        );
        // Adopt before inspecting either error so a decoded source is never leaked
        let source = loaded
            .map(|node| guard.adopt(node))
            .map_err(|source| AuditionError::Load {
                source_url: source_url.to_string(),
                source,
            })?;
        generated.map_err(init_error(NodeKind::Reverb))?;

        let chain = Self {
            source,
            pitch_shift,
            reverb,
            equalizer,
        };
        engine
            .connect_to_output(&chain.nodes())
            .map_err(init_error(NodeKind::Output))?;
        engine
            .set_playback_rate(source, params.playback_rate)
            .map_err(init_error(NodeKind::Source))?;

        guard.finish();
        Ok(chain)
    }

    pub fn source(&self) -> NodeHandle {
        self.source
    }

    pub fn pitch_shift(&self) -> NodeHandle {
        self.pitch_shift
    }

    pub fn reverb(&self) -> NodeHandle {
        self.reverb
    }

    pub fn equalizer(&self) -> NodeHandle {
        self.equalizer
    }

    /// Nodes in signal order, source first
    pub fn nodes(&self) -> [NodeHandle; 4] {
        [self.source, self.pitch_shift, self.reverb, self.equalizer]
    }

    /// Dispose every node. The caller stops playback first.
    pub fn release<E: AudioEngine>(self, engine: &E) {
        for node in self.nodes() {
            engine.dispose(node);
        }
        debug!(source = %self.source, "effect chain released");
    }
}

fn init_error(node: NodeKind) -> impl FnOnce(EngineError) -> AuditionError {
    move |source| AuditionError::Init { node, source }
}

/// Nodes acquired during a build that has not completed yet.
///
/// Dropping it disposes them, newest first, unless `finish` was called.
struct PartialChain<'a, E: AudioEngine> {
    engine: &'a E,
    acquired: Vec<NodeHandle>,
}

impl<'a, E: AudioEngine> PartialChain<'a, E> {
    fn new(engine: &'a E) -> Self {
        Self {
            engine,
            acquired: Vec::with_capacity(4),
        }
    }

    fn adopt(&mut self, node: NodeHandle) -> NodeHandle {
        self.acquired.push(node);
        node
    }

    fn finish(mut self) {
        self.acquired.clear();
    }
}

impl<E: AudioEngine> Drop for PartialChain<'_, E> {
    fn drop(&mut self) {
        if self.acquired.is_empty() {
            return;
        }
        debug!(nodes = self.acquired.len(), "releasing partially built chain");
        for node in self.acquired.drain(..).rev() {
            self.engine.dispose(node);
        }
    }
}
