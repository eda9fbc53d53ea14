//! Effect processors
//!
//! The chop gate and the convolution reverb. Both insert a stage behind an
//! existing node and hand the new chain tail back to the orchestrator.

use rand::Rng;

use crate::backend::{AudioBackend, AudioBuffer, NodeHandle, ParamKind, ParamRef};

/// Shortest gate period in seconds.
const CHOP_MIN_SECS: f64 = 0.1;
/// Longest gate period in seconds.
const CHOP_MAX_SECS: f64 = 0.9;

/// Map an author-facing 0-9 rate onto the bounded gate window.
pub fn chop_period(rate: f64) -> f64 {
    CHOP_MIN_SECS + rate.clamp(0.0, 9.0) * (CHOP_MAX_SECS - CHOP_MIN_SECS) / 9.0
}

/// Re-armable gate schedule for one chop stage.
///
/// The gate gain toggles 1 -> 0 -> 1 once per period. Scheduling is pushed
/// ahead in batches; the orchestrator's recurring tick re-arms the timer
/// before the scheduled horizon runs out.
#[derive(Debug, Clone, Copy)]
pub struct ChopTimer {
    pub gate: ParamRef,
    pub period: f64,
    next_time: f64,
}

impl ChopTimer {
    /// Schedule gate toggles up to `horizon`.
    pub fn arm_until<B: AudioBackend + ?Sized>(&mut self, backend: &mut B, horizon: f64) {
        while self.next_time < horizon {
            let t = self.next_time;
            backend.set_value_at(self.gate, 1.0, t);
            backend.set_value_at(self.gate, 0.0, t + self.period / 2.0);
            backend.set_value_at(self.gate, 1.0, t + self.period);
            self.next_time += self.period;
        }
    }

    pub fn scheduled_until(&self) -> f64 {
        self.next_time
    }
}

/// Insert a periodically toggled gain stage behind `source`.
pub fn apply_chop<B: AudioBackend + ?Sized>(
    backend: &mut B,
    source: NodeHandle,
    rate: f64,
    start_time: f64,
) -> (NodeHandle, ChopTimer) {
    let gain = backend.create_gain();
    backend.connect(source, gain);
    let timer = ChopTimer {
        gate: ParamRef::new(gain, ParamKind::Gain),
        period: chop_period(rate),
        next_time: start_time,
    };
    (gain, timer)
}

/// Insert a convolution reverb behind `source`.
pub fn apply_reverb<B: AudioBackend + ?Sized>(
    backend: &mut B,
    source: NodeHandle,
    decay_secs: f64,
) -> NodeHandle {
    let impulse = reverb_impulse(backend.sample_rate(), decay_secs);
    let convolver = backend.create_convolver(impulse);
    backend.connect(source, convolver);
    convolver
}

/// Stereo noise impulse shaped by `(1 - i/len)^decay` per sample.
pub fn reverb_impulse(sample_rate: u32, decay_secs: f64) -> AudioBuffer {
    let len = ((sample_rate as f64 * decay_secs) as usize).max(1);
    let mut rng = rand::thread_rng();
    let mut shaped = |i: usize| {
        let fade = (1.0 - i as f64 / len as f64).powf(decay_secs) as f32;
        rng.gen_range(-1.0f32..=1.0) * fade
    };
    let left: Vec<f32> = (0..len).map(&mut shaped).collect();
    let right: Vec<f32> = (0..len).map(&mut shaped).collect();
    AudioBuffer::stereo(left, right, sample_rate)
}
