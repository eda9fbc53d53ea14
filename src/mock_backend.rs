//! Scripted in-memory backend
//!
//! `MockBackend` records every call the orchestrator makes and evaluates
//! scheduled automation curves at query time, so tests can assert both the
//! exact call sequence and the live value of any control. The clock only
//! moves when `advance()` is called.

use std::collections::HashMap;

use crate::backend::{
    AudioBackend, AudioBuffer, BackendState, NodeHandle, OfflineRender, ParamKind, ParamRef,
    Waveform,
};

/// One recorded backend call, in invocation order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateOscillator(NodeHandle, Waveform, f64),
    CreateBufferSource(NodeHandle, usize, bool),
    CreateGain(NodeHandle),
    CreateStereoPanner(NodeHandle),
    CreateLowpassFilter(NodeHandle, f64, f64),
    CreateConvolver(NodeHandle, usize),
    Connect(NodeHandle, NodeHandle),
    ConnectToParam(NodeHandle, ParamRef),
    ConnectToDestination(NodeHandle),
    Disconnect(NodeHandle),
    Start(NodeHandle, f64),
    Stop(NodeHandle, f64),
    SetValue(ParamRef, f64),
    SetValueAt(ParamRef, f64, f64),
    RampToValueAt(ParamRef, f64, f64),
    CancelScheduled(ParamRef, f64),
    OfflineRender(f64),
    Resume,
    Suspend,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct ParamEvent {
    time: f64,
    value: f64,
    ramp: bool,
}

#[derive(Debug, Clone)]
struct ParamTrack {
    default: f64,
    events: Vec<ParamEvent>,
}

impl ParamTrack {
    fn new(default: f64) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    fn push(&mut self, event: ParamEvent) {
        // Keep events ordered by time; scheduling is append-mostly.
        let at = self
            .events
            .iter()
            .position(|e| e.time > event.time)
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    fn cancel_from(&mut self, time: f64) {
        self.events.retain(|e| e.time < time);
    }

    fn value_at(&self, now: f64) -> f64 {
        let mut value = self.default;
        let mut value_time: Option<f64> = None;
        for e in &self.events {
            if e.time <= now {
                value = e.value;
                value_time = Some(e.time);
            } else {
                if e.ramp {
                    let t0 = value_time.unwrap_or(now);
                    let span = e.time - t0;
                    if span > 0.0 {
                        let frac = ((now - t0) / span).clamp(0.0, 1.0);
                        return value + (e.value - value) * frac;
                    }
                }
                break;
            }
        }
        value
    }
}

#[derive(Debug, Clone, Default)]
struct MockNode {
    params: HashMap<ParamKind, ParamTrack>,
}

/// Call-recording backend with a manually advanced clock.
pub struct MockBackend {
    nodes: Vec<MockNode>,
    now: f64,
    sample_rate: u32,
    state: BackendState,
    resumable: bool,
    offline_duration: Option<f64>,
    pub calls: Vec<BackendCall>,
}

impl MockBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            nodes: Vec::new(),
            now: 0.0,
            sample_rate,
            state: BackendState::Suspended,
            resumable: true,
            offline_duration: None,
            calls: Vec::new(),
        }
    }

    /// Move the backend clock forward.
    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    /// When false, `resume()` leaves the context suspended, simulating a
    /// host that refuses to start audio.
    pub fn set_resumable(&mut self, resumable: bool) {
        self.resumable = resumable;
    }

    fn push_node(&mut self, node: MockNode) -> NodeHandle {
        self.nodes.push(node);
        NodeHandle(self.nodes.len() as u32 - 1)
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut MockNode {
        &mut self.nodes[handle.0 as usize]
    }

    fn track_mut(&mut self, param: ParamRef) -> &mut ParamTrack {
        self.node_mut(param.node)
            .params
            .entry(param.kind)
            .or_insert_with(|| ParamTrack::new(0.0))
    }
}

impl AudioBackend for MockBackend {
    fn create_oscillator(&mut self, waveform: Waveform, freq: f64) -> NodeHandle {
        let mut node = MockNode::default();
        node.params
            .insert(ParamKind::Frequency, ParamTrack::new(freq));
        let h = self.push_node(node);
        self.calls.push(BackendCall::CreateOscillator(h, waveform, freq));
        h
    }

    fn create_buffer_source(&mut self, buffer: AudioBuffer, looped: bool) -> NodeHandle {
        let mut node = MockNode::default();
        node.params
            .insert(ParamKind::PlaybackRate, ParamTrack::new(1.0));
        let len = buffer.len();
        let h = self.push_node(node);
        self.calls.push(BackendCall::CreateBufferSource(h, len, looped));
        h
    }

    fn create_gain(&mut self) -> NodeHandle {
        let mut node = MockNode::default();
        node.params.insert(ParamKind::Gain, ParamTrack::new(1.0));
        let h = self.push_node(node);
        self.calls.push(BackendCall::CreateGain(h));
        h
    }

    fn create_stereo_panner(&mut self) -> NodeHandle {
        let mut node = MockNode::default();
        node.params.insert(ParamKind::Pan, ParamTrack::new(0.0));
        let h = self.push_node(node);
        self.calls.push(BackendCall::CreateStereoPanner(h));
        h
    }

    fn create_lowpass_filter(&mut self, cutoff: f64, q: f64) -> NodeHandle {
        let mut node = MockNode::default();
        node.params
            .insert(ParamKind::Cutoff, ParamTrack::new(cutoff));
        let h = self.push_node(node);
        self.calls
            .push(BackendCall::CreateLowpassFilter(h, cutoff, q));
        h
    }

    fn create_convolver(&mut self, impulse: AudioBuffer) -> NodeHandle {
        let len = impulse.len();
        let h = self.push_node(MockNode::default());
        self.calls.push(BackendCall::CreateConvolver(h, len));
        h
    }

    fn connect(&mut self, from: NodeHandle, to: NodeHandle) {
        self.calls.push(BackendCall::Connect(from, to));
    }

    fn connect_to_param(&mut self, from: NodeHandle, target: ParamRef) {
        self.calls.push(BackendCall::ConnectToParam(from, target));
    }

    fn connect_to_destination(&mut self, from: NodeHandle) {
        self.calls.push(BackendCall::ConnectToDestination(from));
    }

    fn disconnect(&mut self, node: NodeHandle) {
        self.calls.push(BackendCall::Disconnect(node));
    }

    fn start(&mut self, node: NodeHandle, time: f64) {
        self.calls.push(BackendCall::Start(node, time));
    }

    fn stop(&mut self, node: NodeHandle, time: f64) {
        self.calls.push(BackendCall::Stop(node, time));
    }

    fn set_value(&mut self, param: ParamRef, value: f64) {
        let now = self.now;
        let track = self.track_mut(param);
        track.push(ParamEvent {
            time: now,
            value,
            ramp: false,
        });
        self.calls.push(BackendCall::SetValue(param, value));
    }

    fn set_value_at(&mut self, param: ParamRef, value: f64, time: f64) {
        self.track_mut(param).push(ParamEvent {
            time,
            value,
            ramp: false,
        });
        self.calls.push(BackendCall::SetValueAt(param, value, time));
    }

    fn ramp_to_value_at(&mut self, param: ParamRef, value: f64, time: f64) {
        self.track_mut(param).push(ParamEvent {
            time,
            value,
            ramp: true,
        });
        self.calls
            .push(BackendCall::RampToValueAt(param, value, time));
    }

    fn cancel_scheduled(&mut self, param: ParamRef, time: f64) {
        self.track_mut(param).cancel_from(time);
        self.calls.push(BackendCall::CancelScheduled(param, time));
    }

    fn value(&self, param: ParamRef) -> f64 {
        self.nodes
            .get(param.node.0 as usize)
            .and_then(|n| n.params.get(&param.kind))
            .map(|t| t.value_at(self.now))
            .unwrap_or(0.0)
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> BackendState {
        self.state
    }

    fn resume(&mut self) {
        self.calls.push(BackendCall::Resume);
        if self.resumable && self.state == BackendState::Suspended {
            self.state = BackendState::Running;
        }
    }

    fn suspend(&mut self) {
        self.calls.push(BackendCall::Suspend);
        if self.state == BackendState::Running {
            self.state = BackendState::Suspended;
        }
    }

    fn close(&mut self) {
        self.calls.push(BackendCall::Close);
        self.state = BackendState::Closed;
    }

    fn offline(&mut self, duration_secs: f64) -> Box<dyn OfflineRender> {
        self.calls.push(BackendCall::OfflineRender(duration_secs));
        let mut offline = MockBackend::new(self.sample_rate);
        offline.state = BackendState::Running;
        offline.offline_duration = Some(duration_secs);
        Box::new(offline)
    }
}

impl OfflineRender for MockBackend {
    fn finish(self: Box<Self>) -> AudioBuffer {
        let secs = self.offline_duration.unwrap_or(0.0).max(0.0);
        let len = (secs * self.sample_rate as f64) as usize;
        AudioBuffer::mono(vec![0.0; len], self.sample_rate)
    }
}
