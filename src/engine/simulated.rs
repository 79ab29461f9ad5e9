//! Simulated audio engine
//!
//! Implements `AudioEngine` without producing sound: it keeps a table of
//! live nodes and their parameters plus a log of every call. Faults can be
//! injected per operation, and loads and reverb generations can be held at
//! a gate so tests can interleave teardown with in-flight work.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use super::{AudioEngine, EngineError, EngineResult, NodeHandle, NodeKind};
use crate::params::{EqBand, Equalizer};

/// Most recent calls kept in the event log; older ones are dropped
pub const EVENT_LOG_CAPACITY: usize = 1024;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Unlock,
    Load,
    CreatePitchShift,
    CreateReverb,
    GenerateReverb,
    CreateEqualizer,
    Connect,
    Start,
    Stop,
    /// Every in-place parameter update
    SetParameter,
    /// Pitch updates only
    SetPitch,
}

/// A successful engine call, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Unlocked,
    Loaded {
        node: NodeHandle,
        source_url: String,
    },
    Created {
        node: NodeHandle,
        kind: NodeKind,
    },
    ReverbGenerated {
        node: NodeHandle,
        decay_secs: f32,
    },
    Connected {
        chain: Vec<NodeHandle>,
    },
    PlaybackRateSet {
        node: NodeHandle,
        rate: f32,
    },
    PitchSet {
        node: NodeHandle,
        semitones: i32,
    },
    EqualizerGainSet {
        node: NodeHandle,
        band: EqBand,
        gain_db: i32,
    },
    Started(NodeHandle),
    Stopped(NodeHandle),
    Disposed(NodeHandle),
}

/// State of one live node
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedNode {
    Source {
        source_url: String,
        playback_rate: f32,
        playing: bool,
    },
    PitchShift {
        semitones: i32,
    },
    Reverb {
        decay_secs: f32,
        generated: bool,
    },
    Equalizer {
        gains: Equalizer,
    },
}

impl SimulatedNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            SimulatedNode::Source { .. } => NodeKind::Source,
            SimulatedNode::PitchShift { .. } => NodeKind::PitchShift,
            SimulatedNode::Reverb { .. } => NodeKind::Reverb,
            SimulatedNode::Equalizer { .. } => NodeKind::Equalizer,
        }
    }
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    nodes: BTreeMap<NodeHandle, SimulatedNode>,
    connected: Vec<NodeHandle>,
    faults: HashSet<Fault>,
    events: VecDeque<EngineEvent>,
    peak_nodes: usize,
    unlock_attempts: usize,
    load_gate: Option<Rc<Semaphore>>,
    reverb_gate: Option<Rc<Semaphore>>,
}

impl SimState {
    fn allocate(&mut self, node: SimulatedNode) -> NodeHandle {
        self.next_id += 1;
        let handle = NodeHandle(self.next_id);
        self.nodes.insert(handle, node);
        self.peak_nodes = self.peak_nodes.max(self.nodes.len());
        handle
    }

    fn node_mut(&mut self, handle: NodeHandle, kind: NodeKind) -> EngineResult<&mut SimulatedNode> {
        match self.nodes.get_mut(&handle) {
            Some(node) if node.kind() == kind => Ok(node),
            Some(node) => Err(EngineError::new(format!(
                "{} is a {} node, expected {}",
                handle,
                node.kind(),
                kind
            ))),
            None => Err(EngineError::new(format!("{} has been disposed", handle))),
        }
    }
}

/// In-process engine used by tests and the console
#[derive(Default)]
pub struct SimulatedEngine {
    state: RefCell<SimState>,
    latency: Duration,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every asynchronous operation by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.state.borrow_mut().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state.borrow_mut().faults.remove(&fault);
    }

    /// Make every subsequent load wait until `release_load` is called
    pub fn hold_loads(&self) {
        self.state.borrow_mut().load_gate = Some(Rc::new(Semaphore::new(0)));
    }

    /// Let one held load proceed
    pub fn release_load(&self) {
        if let Some(gate) = &self.state.borrow().load_gate {
            gate.add_permits(1);
        }
    }

    /// Make every subsequent reverb generation wait for `release_reverb_generation`
    pub fn hold_reverb_generation(&self) {
        self.state.borrow_mut().reverb_gate = Some(Rc::new(Semaphore::new(0)));
    }

    /// Let one held reverb generation proceed
    pub fn release_reverb_generation(&self) {
        if let Some(gate) = &self.state.borrow().reverb_gate {
            gate.add_permits(1);
        }
    }

    /// Logged calls, oldest first (at most `EVENT_LOG_CAPACITY`)
    pub fn events(&self) -> Vec<EngineEvent> {
        self.state.borrow().events.iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn unlock_attempts(&self) -> usize {
        self.state.borrow().unlock_attempts
    }

    /// Number of nodes created and not yet disposed
    pub fn live_nodes(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    /// Largest number of nodes that were live at the same time
    pub fn peak_live_nodes(&self) -> usize {
        self.state.borrow().peak_nodes
    }

    pub fn node(&self, handle: NodeHandle) -> Option<SimulatedNode> {
        self.state.borrow().nodes.get(&handle).cloned()
    }

    /// Live nodes of one kind, oldest first
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeHandle> {
        self.state
            .borrow()
            .nodes
            .iter()
            .filter(|(_, node)| node.kind() == kind)
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// The most recently connected chain, if all of its nodes are still live
    pub fn connected_chain(&self) -> Vec<NodeHandle> {
        let state = self.state.borrow();
        if state.connected.iter().all(|h| state.nodes.contains_key(h)) {
            state.connected.clone()
        } else {
            Vec::new()
        }
    }

    fn check_fault(&self, fault: Fault) -> EngineResult<()> {
        if self.state.borrow().faults.contains(&fault) {
            return Err(EngineError::new(format!("simulated {:?} failure", fault)));
        }
        Ok(())
    }

    fn record(&self, event: EngineEvent) {
        debug!(?event, "simulated engine");
        let mut state = self.state.borrow_mut();
        if state.events.len() == EVENT_LOG_CAPACITY {
            state.events.pop_front();
        }
        state.events.push_back(event);
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn pass_gate(gate: Option<Rc<Semaphore>>) -> EngineResult<()> {
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| EngineError::new("engine gate closed"))?
                .forget();
        }
        Ok(())
    }
}

impl AudioEngine for SimulatedEngine {
    async fn unlock(&self) -> EngineResult<()> {
        self.state.borrow_mut().unlock_attempts += 1;
        self.check_fault(Fault::Unlock)?;
        self.record(EngineEvent::Unlocked);
        Ok(())
    }

    async fn load_source(&self, source_url: &str) -> EngineResult<NodeHandle> {
        self.simulate_latency().await;
        let gate = self.state.borrow().load_gate.clone();
        Self::pass_gate(gate).await?;
        self.check_fault(Fault::Load)?;

        if source_url.trim().is_empty() {
            return Err(EngineError::new("empty source url"));
        }

        let node = self.state.borrow_mut().allocate(SimulatedNode::Source {
            source_url: source_url.to_string(),
            playback_rate: 1.0,
            playing: false,
        });
        self.record(EngineEvent::Loaded {
            node,
            source_url: source_url.to_string(),
        });
        Ok(node)
    }

    fn create_pitch_shift(&self, semitones: i32) -> EngineResult<NodeHandle> {
        self.check_fault(Fault::CreatePitchShift)?;
        let node = self
            .state
            .borrow_mut()
            .allocate(SimulatedNode::PitchShift { semitones });
        self.record(EngineEvent::Created {
            node,
            kind: NodeKind::PitchShift,
        });
        Ok(node)
    }

    fn create_reverb(&self, decay_secs: f32) -> EngineResult<NodeHandle> {
        self.check_fault(Fault::CreateReverb)?;
        let node = self.state.borrow_mut().allocate(SimulatedNode::Reverb {
            decay_secs,
            generated: false,
        });
        self.record(EngineEvent::Created {
            node,
            kind: NodeKind::Reverb,
        });
        Ok(node)
    }

    async fn generate_reverb(&self, reverb: NodeHandle, decay_secs: f32) -> EngineResult<()> {
        self.simulate_latency().await;
        let gate = self.state.borrow().reverb_gate.clone();
        Self::pass_gate(gate).await?;
        self.check_fault(Fault::GenerateReverb)?;

        {
            let mut state = self.state.borrow_mut();
            if let SimulatedNode::Reverb {
                decay_secs: decay,
                generated,
            } = state.node_mut(reverb, NodeKind::Reverb)?
            {
                *decay = decay_secs;
                *generated = true;
            }
        }
        self.record(EngineEvent::ReverbGenerated {
            node: reverb,
            decay_secs,
        });
        Ok(())
    }

    fn create_equalizer(&self, gains: Equalizer) -> EngineResult<NodeHandle> {
        self.check_fault(Fault::CreateEqualizer)?;
        let node = self
            .state
            .borrow_mut()
            .allocate(SimulatedNode::Equalizer { gains });
        self.record(EngineEvent::Created {
            node,
            kind: NodeKind::Equalizer,
        });
        Ok(node)
    }

    fn connect_to_output(&self, chain: &[NodeHandle]) -> EngineResult<()> {
        self.check_fault(Fault::Connect)?;
        {
            let mut state = self.state.borrow_mut();
            if let Some(missing) = chain.iter().find(|h| !state.nodes.contains_key(*h)) {
                return Err(EngineError::new(format!("{} has been disposed", missing)));
            }
            state.connected = chain.to_vec();
        }
        self.record(EngineEvent::Connected {
            chain: chain.to_vec(),
        });
        Ok(())
    }

    fn set_playback_rate(&self, source: NodeHandle, rate: f32) -> EngineResult<()> {
        self.check_fault(Fault::SetParameter)?;
        if let SimulatedNode::Source { playback_rate, .. } =
            self.state.borrow_mut().node_mut(source, NodeKind::Source)?
        {
            *playback_rate = rate;
        }
        self.record(EngineEvent::PlaybackRateSet { node: source, rate });
        Ok(())
    }

    fn set_pitch(&self, pitch_shift: NodeHandle, semitones: i32) -> EngineResult<()> {
        self.check_fault(Fault::SetParameter)?;
        self.check_fault(Fault::SetPitch)?;
        if let SimulatedNode::PitchShift { semitones: current } = self
            .state
            .borrow_mut()
            .node_mut(pitch_shift, NodeKind::PitchShift)?
        {
            *current = semitones;
        }
        self.record(EngineEvent::PitchSet {
            node: pitch_shift,
            semitones,
        });
        Ok(())
    }

    fn set_equalizer_gain(
        &self,
        equalizer: NodeHandle,
        band: EqBand,
        gain_db: i32,
    ) -> EngineResult<()> {
        self.check_fault(Fault::SetParameter)?;
        if let SimulatedNode::Equalizer { gains } = self
            .state
            .borrow_mut()
            .node_mut(equalizer, NodeKind::Equalizer)?
        {
            gains.set_gain(band, gain_db);
        }
        self.record(EngineEvent::EqualizerGainSet {
            node: equalizer,
            band,
            gain_db,
        });
        Ok(())
    }

    fn start(&self, source: NodeHandle) -> EngineResult<()> {
        self.check_fault(Fault::Start)?;
        if let SimulatedNode::Source { playing, .. } =
            self.state.borrow_mut().node_mut(source, NodeKind::Source)?
        {
            *playing = true;
        }
        self.record(EngineEvent::Started(source));
        Ok(())
    }

    fn stop(&self, source: NodeHandle) -> EngineResult<()> {
        self.check_fault(Fault::Stop)?;
        if let SimulatedNode::Source { playing, .. } =
            self.state.borrow_mut().node_mut(source, NodeKind::Source)?
        {
            *playing = false;
        }
        self.record(EngineEvent::Stopped(source));
        Ok(())
    }

    fn dispose(&self, node: NodeHandle) {
        if self.state.borrow_mut().nodes.remove(&node).is_some() {
            self.record(EngineEvent::Disposed(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_load_creates_source_node() {
        let engine = SimulatedEngine::new();
        let node = engine.load_source("a.mp3").await.unwrap();

        assert_eq!(
            engine.node(node),
            Some(SimulatedNode::Source {
                source_url: "a.mp3".to_string(),
                playback_rate: 1.0,
                playing: false,
            })
        );
        assert_eq!(engine.live_nodes(), 1);
    }

    #[tokio::test]
    async fn test_empty_source_url_fails() {
        let engine = SimulatedEngine::new();
        assert!(engine.load_source("  ").await.is_err());
        assert_eq!(engine.live_nodes(), 0);
    }

    #[tokio::test]
    async fn test_reverb_generation_marks_node_ready() {
        let engine = SimulatedEngine::new();
        let reverb = engine.create_reverb(1.5).unwrap();
        engine.generate_reverb(reverb, 3.0).await.unwrap();

        assert_eq!(
            engine.node(reverb),
            Some(SimulatedNode::Reverb {
                decay_secs: 3.0,
                generated: true,
            })
        );
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let engine = SimulatedEngine::new();
        let node = engine.create_pitch_shift(0).unwrap();

        engine.dispose(node);
        engine.dispose(node);
        engine.dispose(NodeHandle(999));

        assert_eq!(engine.live_nodes(), 0);
        let disposals = engine
            .events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Disposed(_)))
            .count();
        assert_eq!(disposals, 1);
    }

    #[test]
    fn test_operations_on_disposed_node_fail() {
        let engine = SimulatedEngine::new();
        let eq = engine.create_equalizer(Equalizer::FLAT).unwrap();
        engine.dispose(eq);

        assert!(engine.set_equalizer_gain(eq, EqBand::Low, 3).is_err());
    }

    #[test]
    fn test_wrong_node_kind_fails() {
        let engine = SimulatedEngine::new();
        let pitch = engine.create_pitch_shift(0).unwrap();
        let err = engine.start(pitch).unwrap_err();
        assert!(err.message.contains("expected source"));
    }

    #[test]
    fn test_injected_fault() {
        let engine = SimulatedEngine::new();
        engine.inject_fault(Fault::CreateEqualizer);
        assert!(engine.create_equalizer(Equalizer::FLAT).is_err());

        engine.clear_fault(Fault::CreateEqualizer);
        assert!(engine.create_equalizer(Equalizer::FLAT).is_ok());
    }

    #[tokio::test]
    async fn test_held_load_waits_for_release() {
        let engine = SimulatedEngine::new();
        engine.hold_loads();

        let (loaded, ()) = tokio::join!(engine.load_source("a.mp3"), async {
            tokio::task::yield_now().await;
            assert_eq!(engine.live_nodes(), 0);
            engine.release_load();
        });

        assert!(loaded.is_ok());
        assert_eq!(engine.live_nodes(), 1);
    }

    #[test]
    fn test_event_log_is_bounded() {
        let engine = SimulatedEngine::new();
        let pitch = engine.create_pitch_shift(0).unwrap();
        for semitones in 0..(EVENT_LOG_CAPACITY as i32 + 10) {
            engine.set_pitch(pitch, semitones % 12).unwrap();
        }

        let events = engine.events();
        assert_eq!(events.len(), EVENT_LOG_CAPACITY);
        assert!(!events.contains(&EngineEvent::Created {
            node: pitch,
            kind: NodeKind::PitchShift,
        }));
    }

    #[test]
    fn test_peak_live_nodes_survives_disposal() {
        let engine = SimulatedEngine::new();
        let a = engine.create_pitch_shift(0).unwrap();
        let b = engine.create_reverb(1.5).unwrap();
        engine.dispose(a);
        engine.dispose(b);
        engine.create_equalizer(Equalizer::FLAT).unwrap();

        assert_eq!(engine.live_nodes(), 1);
        assert_eq!(engine.peak_live_nodes(), 2);
    }
}
