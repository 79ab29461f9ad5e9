//! Audio Control Session
//!
//! Mediates between user-facing parameters and the engine's stateful nodes:
//! - Builds the effect chain once per loaded source
//! - Pushes rate, pitch and EQ changes into live nodes in place
//! - Regenerates the reverb impulse when the decay changes
//! - Releases every node on teardown, re-initialization and drop
//!
//! All methods take `&self` so a teardown can run while an initialization
//! is suspended. Each asynchronous step records a generation number before
//! it suspends and discards its result if the number moved in the meantime.

mod chain;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{AudioContext, AudioEngine, EngineResult};
use crate::error::{AuditionError, Result};
use crate::params::{
    validate_eq_gain, validate_pitch, validate_playback_rate, validate_reverb_decay, EqBand,
    SessionParams,
};

pub use chain::EffectChain;

/// Transport state reported by `toggle_playback`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Paused,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Paused => write!(f, "Paused"),
            PlaybackState::Playing => write!(f, "Playing"),
        }
    }
}

/// Read-only view of a session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub ready: bool,
    pub loading: bool,
    pub playing: bool,
    pub source_url: Option<String>,
    pub params: SessionParams,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    params: SessionParams,
    chain: Option<EffectChain>,
    source_url: Option<String>,
    loading: bool,
    playing: bool,
    last_error: Option<String>,
    /// Decay of the impulse currently on the live reverb node
    applied_decay: Option<f32>,
    /// Bumped by every initialize and teardown
    init_generation: u64,
    /// Bumped by every reverb regeneration request, initialize and teardown
    reverb_generation: u64,
}

/// Clears `loading` when an initialization ends, including when its future
/// is dropped part way through the build
struct LoadingFlag<'a> {
    state: &'a RefCell<SessionState>,
    generation: u64,
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if state.init_generation == self.generation {
                state.loading = false;
            }
        }
    }
}

/// One audio source auditioned through pitch shift, reverb and EQ
pub struct AudioControlSession<E: AudioEngine> {
    id: Uuid,
    context: Rc<AudioContext<E>>,
    state: RefCell<SessionState>,
    init_lock: Mutex<()>,
    init_cancel: Notify,
    reverb_lock: Mutex<()>,
}

impl<E: AudioEngine> AudioControlSession<E> {
    /// Create an idle session. Nothing is loaded until `initialize`.
    pub fn new(context: Rc<AudioContext<E>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            state: RefCell::new(SessionState::default()),
            init_lock: Mutex::new(()),
            init_cancel: Notify::new(),
            reverb_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load `source_url` and build the effect chain with `params`.
    ///
    /// Any chain from a previous call is released first, and a build still
    /// in flight is abandoned (its nodes disposed) before this one creates
    /// anything. A call superseded by `teardown` or a newer `initialize`
    /// returns `AuditionError::Cancelled` without touching the error banner.
    pub async fn initialize(&self, source_url: &str, params: SessionParams) -> Result<()> {
        self.validated(params.validate())?;

        let generation = {
            let mut state = self.state.borrow_mut();
            self.release_chain(&mut state);
            state.init_generation += 1;
            state.reverb_generation += 1;
            state.params = params;
            state.source_url = Some(source_url.to_string());
            state.loading = true;
            state.init_generation
        };
        let _loading = LoadingFlag {
            state: &self.state,
            generation,
        };
        self.init_cancel.notify_waiters();

        let building = self.init_lock.lock().await;
        if self.state.borrow().init_generation != generation {
            return Err(AuditionError::Cancelled);
        }
        info!(session = %self.id, source_url, "building effect chain");

        let built = tokio::select! {
            biased;
            () = self.init_cancel.notified() => None,
            built = EffectChain::build(self.context.engine(), source_url, &params) => Some(built),
        };
        let Some(built) = built else {
            debug!(session = %self.id, source_url, "abandoned superseded initialization");
            return Err(AuditionError::Cancelled);
        };

        let pending = {
            let mut state = self.state.borrow_mut();
            if state.init_generation != generation {
                debug!(session = %self.id, source_url, "discarding stale initialization");
                if let Ok(chain) = built {
                    chain.release(self.context.engine());
                }
                return Err(AuditionError::Cancelled);
            }
            state.loading = false;
            match built {
                Ok(chain) => {
                    state.chain = Some(chain);
                    state.applied_decay = Some(params.reverb_decay_secs);
                    state.params
                }
                Err(err) => {
                    drop(state);
                    return self.fail(err);
                }
            }
        };
        drop(building);
        info!(session = %self.id, source_url, "session ready");

        // Setters called during the load only updated the stored params
        if pending == params {
            return Ok(());
        }
        let synced = self.sync_in_place(&pending, &params);
        let regenerated = self.regenerate_reverb(pending.reverb_decay_secs).await;
        synced.and(regenerated)
    }

    /// Stop playback and release every node.
    ///
    /// Safe to call at any time and any number of times. In-flight
    /// initialization and reverb regeneration become stale.
    pub fn teardown(&self) {
        let mut state = self.state.borrow_mut();
        state.init_generation += 1;
        state.reverb_generation += 1;
        state.loading = false;
        if state.chain.is_some() {
            info!(session = %self.id, "tearing down session");
        }
        self.release_chain(&mut state);
        self.init_cancel.notify_waiters();
    }

    fn release_chain(&self, state: &mut SessionState) {
        let engine = self.context.engine();
        if let Some(chain) = state.chain.take() {
            if state.playing {
                if let Err(err) = engine.stop(chain.source()) {
                    warn!(session = %self.id, error = %err, "failed to stop source during release");
                }
            }
            chain.release(engine);
        }
        state.playing = false;
        state.applied_decay = None;
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start playback if paused, stop it if playing.
    ///
    /// Unlocks the engine first; call this from a user gesture.
    pub async fn toggle_playback(&self) -> Result<PlaybackState> {
        if let Err(source) = self.context.unlock().await {
            return self.fail(AuditionError::EngineUnlock { source });
        }

        let mut state = self.state.borrow_mut();
        let Some(source) = state.chain.as_ref().map(EffectChain::source) else {
            drop(state);
            return self.fail(AuditionError::NotReady);
        };

        let engine = self.context.engine();
        let next = if state.playing {
            engine.stop(source).map(|()| PlaybackState::Paused)
        } else {
            engine
                .set_playback_rate(source, state.params.playback_rate)
                .and_then(|()| engine.start(source))
                .map(|()| PlaybackState::Playing)
        };

        match next {
            Ok(next) => {
                state.playing = next == PlaybackState::Playing;
                info!(session = %self.id, state = %next, "transport");
                Ok(next)
            }
            Err(source) => {
                drop(state);
                self.fail(AuditionError::Playback { source })
            }
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================
    //
    // Rate, pitch and EQ are stored only once the live node has accepted
    // them, so `params()` never reports a value the chain does not have.
    // The reverb decay is stored on request and rolled back if the
    // regeneration fails.

    /// Set the playback rate (0.5 to 2.0), applied to the live source
    pub fn set_playback_rate(&self, rate: f32) -> Result<()> {
        let rate = self.validated(validate_playback_rate(rate))?;
        self.apply_in_place("playback_rate", |engine, chain| {
            engine.set_playback_rate(chain.source(), rate)
        })?;
        self.state.borrow_mut().params.playback_rate = rate;
        Ok(())
    }

    /// Set the pitch shift (-12 to 12 semitones), applied in place
    pub fn set_pitch(&self, semitones: i32) -> Result<()> {
        let semitones = self.validated(validate_pitch(semitones))?;
        self.apply_in_place("pitch_semitones", |engine, chain| {
            engine.set_pitch(chain.pitch_shift(), semitones)
        })?;
        self.state.borrow_mut().params.pitch_semitones = semitones;
        Ok(())
    }

    /// Set one equalizer band (-30 to 30 dB), applied in place
    pub fn set_equalizer_band(&self, band: EqBand, gain_db: i32) -> Result<()> {
        let gain_db = self.validated(validate_eq_gain(band, gain_db))?;
        self.apply_in_place(&format!("equalizer.{}", band), |engine, chain| {
            engine.set_equalizer_gain(chain.equalizer(), band, gain_db)
        })?;
        self.state
            .borrow_mut()
            .params
            .equalizer
            .set_gain(band, gain_db);
        Ok(())
    }

    /// Set the reverb decay (0 to 5 seconds) and regenerate the impulse.
    ///
    /// Resolves once the live reverb is usable again. If a newer decay
    /// arrives first, this call resolves without applying anything.
    pub async fn set_reverb_decay(&self, decay_secs: f32) -> Result<()> {
        let decay_secs = self.validated(validate_reverb_decay(decay_secs))?;
        self.state.borrow_mut().params.reverb_decay_secs = decay_secs;
        self.regenerate_reverb(decay_secs).await
    }

    /// Restore rate 1.0, pitch 0, decay 1.5s and a flat EQ.
    ///
    /// Playback keeps running (or stays paused). Every parameter is
    /// attempted even if an earlier one fails; the first failure is
    /// returned. Calling it again retries whatever did not apply.
    pub async fn reset_to_defaults(&self) -> Result<()> {
        let defaults = SessionParams::default();
        let previous = {
            let mut state = self.state.borrow_mut();
            let previous = state.params;
            state.params.reverb_decay_secs = defaults.reverb_decay_secs;
            previous
        };
        debug!(session = %self.id, "resetting parameters to defaults");

        let synced = self.sync_in_place(&defaults, &previous);
        let regenerated = self.regenerate_reverb(defaults.reverb_decay_secs).await;
        synced.and(regenerated)
    }

    /// Push rate, pitch and EQ from `target` to the live chain.
    ///
    /// Each value that applies is stored; each that fails keeps its
    /// `fallback` value, which must be what the node currently holds.
    fn sync_in_place(&self, target: &SessionParams, fallback: &SessionParams) -> Result<()> {
        let mut first_error = None;
        let mut applied = |result: Result<()>| match result {
            Ok(()) => true,
            Err(err) => {
                first_error.get_or_insert(err);
                false
            }
        };

        let mut synced = *fallback;
        if applied(self.apply_in_place("playback_rate", |engine, chain| {
            engine.set_playback_rate(chain.source(), target.playback_rate)
        })) {
            synced.playback_rate = target.playback_rate;
        }
        if applied(self.apply_in_place("pitch_semitones", |engine, chain| {
            engine.set_pitch(chain.pitch_shift(), target.pitch_semitones)
        })) {
            synced.pitch_semitones = target.pitch_semitones;
        }
        for band in EqBand::ALL {
            let gain_db = target.equalizer.gain(band);
            if applied(self.apply_in_place(&format!("equalizer.{}", band), |engine, chain| {
                engine.set_equalizer_gain(chain.equalizer(), band, gain_db)
            })) {
                synced.equalizer.set_gain(band, gain_db);
            }
        }

        {
            let mut state = self.state.borrow_mut();
            synced.reverb_decay_secs = state.params.reverb_decay_secs;
            state.params = synced;
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run `apply` against the live chain, if there is one
    fn apply_in_place<F>(&self, param: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&E, &EffectChain) -> EngineResult<()>,
    {
        let result = {
            let state = self.state.borrow();
            match &state.chain {
                Some(chain) => apply(self.context.engine(), chain),
                None => Ok(()),
            }
        };
        result.or_else(|source| {
            self.fail(AuditionError::ParameterApply {
                param: param.to_string(),
                source,
            })
        })
    }

    /// At most one regeneration runs at a time. A queued request that has
    /// been superseded by the time it gets the lock is skipped, and so is
    /// one whose decay is already on the node.
    async fn regenerate_reverb(&self, decay_secs: f32) -> Result<()> {
        let generation = {
            let mut state = self.state.borrow_mut();
            state.reverb_generation += 1;
            state.reverb_generation
        };
        let _in_flight = self.reverb_lock.lock().await;

        let reverb = {
            let state = self.state.borrow();
            if state.reverb_generation != generation {
                return Ok(());
            }
            match state.chain.as_ref() {
                Some(_) if state.applied_decay == Some(decay_secs) => return Ok(()),
                Some(chain) => chain.reverb(),
                None => return Ok(()),
            }
        };
        debug!(session = %self.id, decay_secs, "regenerating reverb");

        let result = self
            .context
            .engine()
            .generate_reverb(reverb, decay_secs)
            .await;

        let mut state = self.state.borrow_mut();
        let same_node = state.chain.as_ref().map(EffectChain::reverb) == Some(reverb);
        if same_node && result.is_ok() {
            state.applied_decay = Some(decay_secs);
        }
        if state.reverb_generation != generation {
            debug!(session = %self.id, decay_secs, "discarding stale reverb regeneration");
            return Ok(());
        }
        match result {
            Ok(()) => Ok(()),
            Err(source) => {
                if let Some(applied) = state.applied_decay {
                    state.params.reverb_decay_secs = applied;
                }
                drop(state);
                self.fail(AuditionError::Regeneration { decay_secs, source })
            }
        }
    }

    // ========================================================================
    // Error banner
    // ========================================================================

    /// Record `err` as the current error (unless it is a cancellation)
    fn fail<T>(&self, err: AuditionError) -> Result<T> {
        if err.is_reportable() {
            warn!(session = %self.id, code = err.error_code(), "{}", err);
            self.state.borrow_mut().last_error = Some(err.friendly_message());
        }
        Err(err)
    }

    fn validated<T>(&self, result: Result<T>) -> Result<T> {
        result.or_else(|err| self.fail(err))
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state.borrow_mut().last_error = None;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_ready(&self) -> bool {
        self.state.borrow().chain.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn playback_state(&self) -> PlaybackState {
        if self.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    pub fn params(&self) -> SessionParams {
        self.state.borrow().params
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.borrow();
        SessionSnapshot {
            ready: state.chain.is_some(),
            loading: state.loading,
            playing: state.playing,
            source_url: state.source_url.clone(),
            params: state.params,
            last_error: state.last_error.clone(),
        }
    }
}

impl<E: AudioEngine> Drop for AudioControlSession<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
