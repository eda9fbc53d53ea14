//! Abstract audio backend interface
//!
//! The orchestrator never generates samples itself. It drives an abstract
//! backend through declarative scheduling calls: create nodes, wire them,
//! start/stop them at a time, and ramp scalar params to values at a time.
//! The backend owns whatever real-time rendering thread exists; the core
//! only ever talks to it from the control thread.

/// Opaque handle to a backend node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Running,
    Suspended,
    Closed,
}

/// Which scalar control of a node a scheduling call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Frequency,
    Gain,
    Pan,
    Cutoff,
    PlaybackRate,
}

/// A rampable scalar control on a backend node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub node: NodeHandle,
    pub kind: ParamKind,
}

impl ParamRef {
    pub fn new(node: NodeHandle, kind: ParamKind) -> Self {
        Self { node, kind }
    }
}

/// A fixed-length rendered waveform, mono or stereo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![left, right],
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The full surface the orchestrator needs from an audio host.
///
/// Scheduling calls take absolute times on the backend clock
/// (`current_time`). Implementations are expected to tolerate times in the
/// past by applying the value immediately.
pub trait AudioBackend {
    fn create_oscillator(&mut self, waveform: Waveform, freq: f64) -> NodeHandle;
    fn create_buffer_source(&mut self, buffer: AudioBuffer, looped: bool) -> NodeHandle;
    fn create_gain(&mut self) -> NodeHandle;
    fn create_stereo_panner(&mut self) -> NodeHandle;
    fn create_lowpass_filter(&mut self, cutoff: f64, q: f64) -> NodeHandle;
    fn create_convolver(&mut self, impulse: AudioBuffer) -> NodeHandle;

    fn connect(&mut self, from: NodeHandle, to: NodeHandle);
    /// Audio-rate connection into a scalar control (FM).
    fn connect_to_param(&mut self, from: NodeHandle, target: ParamRef);
    /// Connection to the context's final output.
    fn connect_to_destination(&mut self, from: NodeHandle);
    fn disconnect(&mut self, node: NodeHandle);

    fn start(&mut self, node: NodeHandle, time: f64);
    fn stop(&mut self, node: NodeHandle, time: f64);

    /// Immediate value assignment.
    fn set_value(&mut self, param: ParamRef, value: f64);
    fn set_value_at(&mut self, param: ParamRef, value: f64, time: f64);
    /// Linear ramp from the previous scheduled point, ending at `time`.
    fn ramp_to_value_at(&mut self, param: ParamRef, value: f64, time: f64);
    /// Drop every scheduled event at or after `time`.
    fn cancel_scheduled(&mut self, param: ParamRef, time: f64);
    /// Current live value of the control.
    fn value(&self, param: ParamRef) -> f64;

    fn current_time(&self) -> f64;
    fn sample_rate(&self) -> u32;
    fn state(&self) -> BackendState;
    fn resume(&mut self);
    fn suspend(&mut self);
    fn close(&mut self);

    /// Open a separate non-real-time context of the given length. The
    /// caller builds a graph into it and then calls [`OfflineRender::finish`]
    /// for a blocking render-to-completion.
    fn offline(&mut self, duration_secs: f64) -> Box<dyn OfflineRender>;
}

/// A one-shot offline rendering context.
pub trait OfflineRender: AudioBackend {
    fn finish(self: Box<Self>) -> AudioBuffer;
}
