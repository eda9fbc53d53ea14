//! Orchestrator
//!
//! Consumes the parsed AST and drives the audio backend: builds and wires
//! the per-invocation signal graph, captures buffers offline, schedules
//! envelopes and transitions, and tears everything down on stop. One
//! session at a time; the engine is an explicit object owned by the host,
//! not a singleton.
//!
//! Control flow is single-threaded and cooperative. The backend owns any
//! real-time rendering thread; the engine only issues declarative
//! scheduling calls. The one blocking boundary is offline buffer capture,
//! which must complete before a dependent live chain is built.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::ast::{AstNode, GeneratorKind, Param, SynthNode, Transition};
use crate::backend::{AudioBackend, AudioBuffer, BackendState, NodeHandle, ParamKind, ParamRef};
use crate::defaults::REGISTRY;
use crate::error::SynoError;
use crate::node_factory;
use crate::processors::{self, ChopTimer};
use crate::transitions::TransitionManager;

/// Fallback lifetime for voices without a volume ramp.
const DEFAULT_NOTE_SECS: f64 = 20.0;
/// Modulator volume is reinterpreted as FM depth and scaled by this.
const FM_DEPTH_SCALE: f64 = 1000.0;
/// Coarse gain-to-meter scale used by the VU approximation.
const VU_SCALE: f64 = 18.0;
/// How far ahead chop gates are scheduled between ticks.
const CHOP_LOOKAHEAD_SECS: f64 = 2.0;
/// Lowpass resonance.
const FILTER_Q: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Building,
    Playing,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VuLevels {
    pub left: f64,
    pub right: f64,
}

/// Everything built for one voice, kept for metering and teardown.
#[derive(Debug)]
struct VoiceBundle {
    source: NodeHandle,
    gain: NodeHandle,
    pan: NodeHandle,
    chop: Option<NodeHandle>,
    chop_timer: Option<ChopTimer>,
    reverb: Option<NodeHandle>,
    filter: Option<NodeHandle>,
    modulators: Vec<VoiceBundle>,
    end_time: f64,
    /// Envelope release seconds, applied when the source ends naturally.
    release_secs: Option<f64>,
    released: bool,
}

/// Where a chain's tail connects.
#[derive(Debug, Clone, Copy)]
enum ChainTarget {
    Master(NodeHandle),
    /// Offline capture root.
    Destination,
    /// FM: into a carrier's scalar control.
    Modulation(ParamRef),
}

/// The per-session audio orchestrator.
pub struct AudioEngine<B: AudioBackend> {
    backend: B,
    master: Option<NodeHandle>,
    active: Vec<VoiceBundle>,
    buffers: HashMap<u8, AudioBuffer>,
    transitions: TransitionManager,
    state: EngineState,
}

impl<B: AudioBackend> AudioEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            master: None,
            active: Vec::new(),
            buffers: HashMap::new(),
            transitions: TransitionManager::new(),
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn active_voices(&self) -> usize {
        self.active.len()
    }

    /// Lazily set up the master bus and bring the context to running.
    /// Idempotent; failure to reach the running state is fatal for the
    /// current play() call.
    fn ensure_context(&mut self) -> Result<(), SynoError> {
        match self.backend.state() {
            BackendState::Closed => {
                error!("backend context is closed");
                return Err(SynoError::BackendState(BackendState::Closed));
            }
            BackendState::Suspended => self.backend.resume(),
            BackendState::Running => {}
        }
        if self.backend.state() != BackendState::Running {
            let state = self.backend.state();
            error!(?state, "backend failed to reach running state");
            return Err(SynoError::BackendState(state));
        }
        if self.master.is_none() {
            let master = self.backend.create_gain();
            let volume = (REGISTRY.master.volume / 9.0).clamp(0.0, 1.0);
            self.backend
                .set_value(ParamRef::new(master, ParamKind::Gain), volume);
            self.backend.connect_to_destination(master);
            self.master = Some(master);
        }
        Ok(())
    }

    /// Build and start the signal graph for one parsed node sequence.
    ///
    /// Nodes are visited in declaration order. Master nodes mutate the bus
    /// gain in place. A node carrying `recursion` whose predecessor was
    /// tagged to populate a buffer forces a blocking offline capture of
    /// that predecessor before its own live chain goes up.
    pub fn play(&mut self, nodes: &[AstNode]) -> Result<(), SynoError> {
        if !self.active.is_empty() {
            self.stop();
        }
        self.ensure_context()?;
        self.state = EngineState::Building;
        // Session-scoped state starts fresh on every play.
        self.buffers.clear();
        self.transitions.clear();
        let master = self.master.expect("master bus exists after ensure_context");
        let session_start = self.backend.current_time();

        let mut prev: Option<&SynthNode> = None;
        for node in nodes {
            match node {
                AstNode::Master(m) => {
                    let volume = (m.volume / 9.0).clamp(0.0, 1.0);
                    self.backend
                        .set_value(ParamRef::new(master, ParamKind::Gain), volume);
                }
                AstNode::Synth(s) => {
                    if s.capture_only {
                        self.capture(s.buffer.unwrap_or(0), s);
                        prev = Some(s);
                        continue;
                    }
                    if !s.recursion.is_empty() {
                        if let Some(p) = prev {
                            if let Some(slot) = p.buffer {
                                if !self.buffers.contains_key(&slot) {
                                    self.capture(slot, p);
                                }
                            }
                        }
                    }
                    let bundle = build_chain(
                        &mut self.backend,
                        s,
                        session_start,
                        &mut self.transitions,
                        &self.buffers,
                        ChainTarget::Master(master),
                        1.0,
                    );
                    if let Some(bundle) = bundle {
                        self.active.push(bundle);
                    }
                    prev = Some(s);
                }
            }
        }

        self.state = EngineState::Playing;
        Ok(())
    }

    /// Blocking offline render of one node's chain into a slot cache entry.
    fn capture(&mut self, slot: u8, node: &SynthNode) {
        let duration = node.start_time + effective_duration(node);
        debug!(slot, duration, "offline buffer capture");
        let mut offline = self.backend.offline(duration);
        // Offline transitions are throwaway; they never reach the display.
        let mut scratch = TransitionManager::new();
        build_chain(
            offline.as_mut(),
            node,
            0.0,
            &mut scratch,
            &self.buffers,
            ChainTarget::Destination,
            1.0,
        );
        let buffer = offline.finish();
        self.buffers.insert(slot, buffer);
    }

    /// Tear the session down: hard-mute and disconnect every bundle, clear
    /// the buffer cache and transition list, suspend the context.
    /// Idempotent; tolerates partially built bundles.
    pub fn stop(&mut self) {
        self.state = EngineState::Stopping;
        let now = self.backend.current_time();
        let bundles: Vec<VoiceBundle> = self.active.drain(..).collect();
        for bundle in bundles {
            teardown_bundle(&mut self.backend, bundle, now);
        }
        self.buffers.clear();
        self.transitions.clear();
        if self.backend.state() == BackendState::Running {
            self.backend.suspend();
        }
        self.state = EngineState::Idle;
    }

    /// Release the backend context entirely. Host-teardown only.
    pub fn cleanup(&mut self) {
        self.stop();
        self.backend.close();
        self.master = None;
    }

    /// Poll driver: applies due envelope releases, re-arms chop gates, and
    /// retires voices past their end. The host's metering loop calls this
    /// (indirectly through `vu_levels`) and may stop polling once the
    /// active graph empties.
    pub fn tick(&mut self) {
        if self.active.is_empty() {
            return;
        }
        let now = self.backend.current_time();
        let Self {
            backend, active, ..
        } = self;

        for bundle in active.iter_mut() {
            tick_bundle(backend, bundle, now);
        }

        let mut i = 0;
        while i < active.len() {
            let b = &active[i];
            let linger = b.release_secs.unwrap_or(0.0);
            if now >= b.end_time + linger {
                let done = active.remove(i);
                teardown_bundle(backend, done, now);
            } else {
                i += 1;
            }
        }
    }

    /// Coarse polling VU approximation: per voice, gain value weighted by
    /// pan, averaged across voices, scaled by the master gain. Never NaN
    /// or negative; `{0, 0}` whenever nothing is active.
    pub fn vu_levels(&mut self) -> VuLevels {
        self.tick();
        let master = match self.master {
            Some(m) if !self.active.is_empty() => m,
            _ => return VuLevels::default(),
        };

        let mut left = 0.0;
        let mut right = 0.0;
        for bundle in &self.active {
            let gain = self
                .backend
                .value(ParamRef::new(bundle.gain, ParamKind::Gain))
                * VU_SCALE;
            let pan = self
                .backend
                .value(ParamRef::new(bundle.pan, ParamKind::Pan))
                .clamp(-1.0, 1.0);
            left += gain * (1.0 - pan).max(0.0);
            right += gain * (1.0 + pan).max(0.0);
        }
        let count = self.active.len() as f64;
        let master_gain = self
            .backend
            .value(ParamRef::new(master, ParamKind::Gain));
        let sanitize = |v: f64| {
            if v.is_finite() {
                v.max(0.0)
            } else {
                0.0
            }
        };
        VuLevels {
            left: sanitize(left / count * master_gain),
            right: sanitize(right / count * master_gain),
        }
    }

    /// Elapsed whole seconds of the in-flight transitions, display only.
    pub fn timers(&mut self) -> Vec<i64> {
        let now = self.backend.current_time();
        self.transitions
            .active_timers(now)
            .into_iter()
            .filter(|t| *t >= 0)
            .collect()
    }
}

/// Volume ramp duration when present, else the fixed fallback.
fn effective_duration(node: &SynthNode) -> f64 {
    match &node.volume {
        Param::Ramp(t) => t.duration,
        Param::Fixed(_) => DEFAULT_NOTE_SECS,
    }
}

fn norm_volume(value: f64) -> f64 {
    (value / 9.0).clamp(0.0, 1.0)
}

fn cutoff_hz(value: f64) -> f64 {
    value.clamp(0.0, 9.0) * 100.0
}

fn decode_adsr(code: &str) -> (f64, f64, f64, f64) {
    let mut digits = code.chars().filter_map(|c| c.to_digit(10));
    let mut next = || digits.next().unwrap_or(0) as f64;
    let attack = next() * 0.1;
    let decay = next() * 0.1;
    let sustain = next() / 9.0;
    let release = next() * 0.1;
    (attack, decay, sustain, release)
}

/// Build one voice chain: source, gain (ramp or envelope), then the fixed
/// effect order pan, chop, reverb, filter, then the target. Recursion
/// children are built as modulation chains into the source's frequency or
/// playback-rate control. Returns `None` when the node must be skipped.
fn build_chain<B: AudioBackend + ?Sized>(
    backend: &mut B,
    node: &SynthNode,
    session_start: f64,
    transitions: &mut TransitionManager,
    buffers: &HashMap<u8, AudioBuffer>,
    target: ChainTarget,
    vol_scale: f64,
) -> Option<VoiceBundle> {
    let begin = session_start + node.start_time;
    let duration = effective_duration(node);
    let is_modulator = matches!(target, ChainTarget::Modulation(_));

    let source = match node.kind {
        GeneratorKind::BufferRef => {
            let slot = node.buffer.unwrap_or(0);
            let Some(buffer) = buffers.get(&slot) else {
                // Uncaptured slot: the node is skipped, not fatal.
                warn!("skipping node: {}", SynoError::BufferNotFound(slot));
                return None;
            };
            backend.create_buffer_source(buffer.clone(), is_modulator)
        }
        _ => match node_factory::create_node(backend, node) {
            Some(handle) => handle,
            None => {
                warn!(tag = %node.kind.tag(), "factory produced no source, skipping node");
                return None;
            }
        },
    };

    // Frequency automation for oscillators, playback-rate glissando for
    // buffer playback. Noise loops have neither.
    match node.kind {
        GeneratorKind::Sine
        | GeneratorKind::Square
        | GeneratorKind::Sawtooth
        | GeneratorKind::Triangle => {
            if let Param::Ramp(t) = node.freq {
                let param = ParamRef::new(source, ParamKind::Frequency);
                transitions.schedule(backend, param, t.start, t.end, t.duration, begin, t.middle);
            }
        }
        GeneratorKind::BufferRef => {
            if let Some(t) = node.glissando {
                let param = ParamRef::new(source, ParamKind::PlaybackRate);
                transitions.schedule(backend, param, t.start, t.end, t.duration, begin, t.middle);
            }
        }
        GeneratorKind::Noise => {}
    }

    let gain = backend.create_gain();
    let gain_param = ParamRef::new(gain, ParamKind::Gain);
    let mut release_secs = None;
    match node.volume {
        Param::Ramp(t) => {
            let scaled = scale_transition(&t, vol_scale);
            transitions.schedule(
                backend,
                gain_param,
                scaled.start,
                scaled.end,
                scaled.duration,
                begin,
                scaled.middle,
            );
        }
        Param::Fixed(v) => {
            let level = norm_volume(v) * vol_scale;
            if is_modulator {
                // FM depth is static; envelopes stay on audible chains.
                backend.set_value(gain_param, level);
            } else {
                let (attack, decay, sustain, release) = decode_adsr(&node.envelope);
                backend.set_value_at(gain_param, 0.0, begin);
                backend.ramp_to_value_at(gain_param, level, begin + attack);
                backend.ramp_to_value_at(gain_param, level * sustain, begin + attack + decay);
                release_secs = Some(release);
            }
        }
    }
    backend.connect(source, gain);
    let mut last = gain;

    let pan = backend.create_stereo_panner();
    let pan_param = ParamRef::new(pan, ParamKind::Pan);
    match node.pan {
        Param::Fixed(v) => backend.set_value(pan_param, v.clamp(-1.0, 1.0)),
        Param::Ramp(t) => {
            transitions.schedule(
                backend,
                pan_param,
                t.start.clamp(-1.0, 1.0),
                t.end.clamp(-1.0, 1.0),
                t.duration,
                begin,
                t.middle.map(|m| m.clamp(-1.0, 1.0)),
            );
        }
    }
    backend.connect(last, pan);
    last = pan;

    let mut chop = None;
    let mut chop_timer = None;
    if let Some(rate) = node.chop {
        let (gate, mut timer) = processors::apply_chop(backend, last, rate, begin);
        let horizon = if matches!(target, ChainTarget::Destination) {
            // Offline contexts get no ticks; arm the whole lifetime now.
            begin + duration
        } else {
            begin + CHOP_LOOKAHEAD_SECS
        };
        timer.arm_until(backend, horizon);
        last = gate;
        chop = Some(gate);
        chop_timer = Some(timer);
    }

    let mut reverb = None;
    if let Some(decay) = node.reverb {
        let tail = processors::apply_reverb(backend, last, decay);
        last = tail;
        reverb = Some(tail);
    }

    let mut filter = None;
    if let Some(p) = node.filter {
        let handle = backend.create_lowpass_filter(cutoff_hz(p.initial()), FILTER_Q);
        if let Param::Ramp(t) = p {
            let param = ParamRef::new(handle, ParamKind::Cutoff);
            transitions.schedule(
                backend,
                param,
                cutoff_hz(t.start),
                cutoff_hz(t.end),
                t.duration,
                begin,
                t.middle.map(cutoff_hz),
            );
        }
        backend.connect(last, handle);
        last = handle;
        filter = Some(handle);
    }

    let mut modulators = Vec::new();
    if !node.recursion.is_empty() {
        let carrier = match node.kind {
            GeneratorKind::BufferRef | GeneratorKind::Noise => {
                ParamRef::new(source, ParamKind::PlaybackRate)
            }
            _ => ParamRef::new(source, ParamKind::Frequency),
        };
        for child in &node.recursion {
            let built = build_chain(
                backend,
                child,
                begin,
                transitions,
                buffers,
                ChainTarget::Modulation(carrier),
                FM_DEPTH_SCALE,
            );
            if let Some(bundle) = built {
                modulators.push(bundle);
            }
        }
    }

    match target {
        ChainTarget::Master(master) => backend.connect(last, master),
        ChainTarget::Destination => backend.connect_to_destination(last),
        ChainTarget::Modulation(param) => backend.connect_to_param(last, param),
    }

    backend.start(source, begin);
    backend.stop(source, begin + duration);

    Some(VoiceBundle {
        source,
        gain,
        pan,
        chop,
        chop_timer,
        reverb,
        filter,
        modulators,
        end_time: begin + duration,
        release_secs,
        released: false,
    })
}

fn scale_transition(t: &Transition, vol_scale: f64) -> Transition {
    Transition {
        start: norm_volume(t.start) * vol_scale,
        middle: t.middle.map(|m| norm_volume(m) * vol_scale),
        end: norm_volume(t.end) * vol_scale,
        duration: t.duration,
    }
}

/// Per-voice poll step: deferred envelope release and chop re-arming.
fn tick_bundle<B: AudioBackend + ?Sized>(backend: &mut B, bundle: &mut VoiceBundle, now: f64) {
    if let Some(release) = bundle.release_secs {
        if !bundle.released && now >= bundle.end_time {
            // Ramp down from whatever gain is live right now; the release
            // is never prescheduled.
            let param = ParamRef::new(bundle.gain, ParamKind::Gain);
            let live = backend.value(param);
            backend.cancel_scheduled(param, now);
            backend.set_value_at(param, live, now);
            backend.ramp_to_value_at(param, 0.0, now + release);
            bundle.released = true;
        }
    }
    if let Some(timer) = bundle.chop_timer.as_mut() {
        let horizon = (now + CHOP_LOOKAHEAD_SECS).min(bundle.end_time);
        if timer.scheduled_until() < horizon {
            timer.arm_until(backend, horizon);
        }
    }
    for modulator in bundle.modulators.iter_mut() {
        tick_bundle(backend, modulator, now);
    }
}

/// Cancel, mute, halt, and disconnect one bundle. Used both by stop() and
/// when a voice retires naturally.
fn teardown_bundle<B: AudioBackend + ?Sized>(backend: &mut B, bundle: VoiceBundle, now: f64) {
    let gain_param = ParamRef::new(bundle.gain, ParamKind::Gain);
    backend.cancel_scheduled(gain_param, now);
    // Hard mute: this is an explicit user action, no ramp.
    backend.set_value(gain_param, 0.0);
    backend.stop(bundle.source, now);
    backend.disconnect(bundle.source);
    backend.disconnect(bundle.gain);
    backend.disconnect(bundle.pan);
    if let Some(h) = bundle.chop {
        backend.disconnect(h);
    }
    if let Some(h) = bundle.reverb {
        backend.disconnect(h);
    }
    if let Some(h) = bundle.filter {
        backend.disconnect(h);
    }
    for modulator in bundle.modulators {
        teardown_bundle(backend, modulator, now);
    }
}
