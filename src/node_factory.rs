//! Node factory
//!
//! Maps generator tags to backend primitives. The four periodic tags become
//! oscillators; the noise tag renders one of four algorithms into a fixed
//! 2-second looped buffer. Buffer references are not built here: the
//! orchestrator constructs their playback nodes straight from the slot
//! cache.

use rand::Rng;
use tracing::warn;

use crate::ast::{GeneratorKind, SynthNode};
use crate::backend::{AudioBackend, AudioBuffer, NodeHandle, Waveform};

/// Length of the looped noise buffer.
pub const NOISE_BUFFER_SECS: f64 = 2.0;

/// Build the source node for a parsed generator, or `None` when the
/// orchestrator has to handle it (buffer references) or skip it.
pub fn create_node<B: AudioBackend + ?Sized>(
    backend: &mut B,
    node: &SynthNode,
) -> Option<NodeHandle> {
    let waveform = match node.kind {
        GeneratorKind::Sine => Waveform::Sine,
        GeneratorKind::Square => Waveform::Square,
        GeneratorKind::Sawtooth => Waveform::Sawtooth,
        GeneratorKind::Triangle => Waveform::Triangle,
        GeneratorKind::Noise => {
            let variant = NoiseVariant::from_field(node.freq.initial());
            let buffer = noise_buffer(variant, backend.sample_rate());
            return Some(backend.create_buffer_source(buffer, true));
        }
        GeneratorKind::BufferRef => return None,
    };
    Some(backend.create_oscillator(waveform, node.freq.initial()))
}

/// The noise algorithm, selected by the integer part of the freq field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseVariant {
    White,
    Pink,
    Brown,
    Gray,
}

impl NoiseVariant {
    pub fn from_field(value: f64) -> Self {
        match value as i64 {
            1 => Self::Pink,
            2 => Self::Brown,
            3 => Self::Gray,
            0 => Self::White,
            other => {
                warn!(variant = other, "unknown noise variant, using white");
                Self::White
            }
        }
    }
}

/// Render a 2-second noise loop with the given algorithm.
pub fn noise_buffer(variant: NoiseVariant, sample_rate: u32) -> AudioBuffer {
    let len = (NOISE_BUFFER_SECS * sample_rate as f64) as usize;
    let samples = match variant {
        NoiseVariant::White => white_noise(len),
        NoiseVariant::Pink => pink_noise(len),
        NoiseVariant::Brown => brown_noise(len),
        NoiseVariant::Gray => gray_noise(len, sample_rate),
    };
    AudioBuffer::mono(samples, sample_rate)
}

/// Independent uniform samples in [-1, 1].
fn white_noise(len: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-1.0f32..=1.0)).collect()
}

/// Six leaky integrators approximating Kellet's pink filter, summed and
/// scaled down to roughly unit peak.
fn pink_noise(len: usize) -> Vec<f32> {
    const POLES: [(f32, f32); 6] = [
        (0.99886, 0.0555179),
        (0.99332, 0.0750759),
        (0.96900, 0.1538520),
        (0.86650, 0.3104856),
        (0.55000, 0.5329522),
        (0.11770, 0.1151300),
    ];
    let mut rng = rand::thread_rng();
    let mut state = [0.0f32; 6];
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let w: f32 = rng.gen_range(-1.0..=1.0);
        let mut sum = 0.0;
        for (i, (feedback, gain)) in POLES.iter().enumerate() {
            state[i] = feedback * state[i] + w * gain;
            sum += state[i];
        }
        out.push((sum * 0.11).clamp(-1.0, 1.0));
    }
    out
}

/// Running integration of white noise with a bounded step, clamped.
fn brown_noise(len: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let mut level = 0.0f32;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let w: f32 = rng.gen_range(-1.0..=1.0);
        level = (level + w * 0.02).clamp(-1.0, 1.0);
        out.push(level);
    }
    out
}

/// Coarse psychoacoustic shape: boost below 500 Hz and above 5 kHz,
/// attenuate the band between. Two one-pole splits, not true spectral
/// filtering.
fn gray_noise(len: usize, sample_rate: u32) -> Vec<f32> {
    const LOW_SPLIT_HZ: f32 = 500.0;
    const HIGH_SPLIT_HZ: f32 = 5000.0;
    let dt = 1.0 / sample_rate as f32;
    let alpha = |hz: f32| {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * hz);
        dt / (dt + rc)
    };
    let low_a = alpha(LOW_SPLIT_HZ);
    let high_a = alpha(HIGH_SPLIT_HZ);

    let mut rng = rand::thread_rng();
    let mut low = 0.0f32;
    let mut high_lp = 0.0f32;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let w: f32 = rng.gen_range(-1.0..=1.0);
        low += low_a * (w - low);
        high_lp += high_a * (w - high_lp);
        let high = w - high_lp;
        let mid = w - low - high;
        out.push((1.6 * low + 1.6 * high + 0.4 * mid).clamp(-1.0, 1.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ParamKind;
    use crate::defaults::REGISTRY;
    use crate::mock_backend::{BackendCall, MockBackend};

    fn synth(kind: GeneratorKind, freq: f64) -> SynthNode {
        let d = REGISTRY.generator(kind);
        SynthNode {
            kind,
            start_time: 0.0,
            freq: crate::ast::Param::Fixed(freq),
            volume: crate::ast::Param::Fixed(d.volume),
            pan: crate::ast::Param::Fixed(d.pan),
            filter: None,
            chop: None,
            reverb: None,
            envelope: d.envelope.to_string(),
            glissando: None,
            recursion: Vec::new(),
            buffer: None,
            capture_only: false,
        }
    }

    #[test]
    fn periodic_tags_map_to_waveforms() {
        let cases = [
            (GeneratorKind::Sine, Waveform::Sine),
            (GeneratorKind::Square, Waveform::Square),
            (GeneratorKind::Sawtooth, Waveform::Sawtooth),
            (GeneratorKind::Triangle, Waveform::Triangle),
        ];
        for (kind, waveform) in cases {
            let mut backend = MockBackend::new(44100);
            let handle = create_node(&mut backend, &synth(kind, 220.0)).unwrap();
            assert_eq!(
                backend.calls[0],
                BackendCall::CreateOscillator(handle, waveform, 220.0)
            );
            assert_eq!(
                backend.value(crate::backend::ParamRef::new(handle, ParamKind::Frequency)),
                220.0
            );
        }
    }

    #[test]
    fn noise_builds_looped_two_second_buffer() {
        let mut backend = MockBackend::new(8000);
        let handle = create_node(&mut backend, &synth(GeneratorKind::Noise, 0.5)).unwrap();
        assert_eq!(
            backend.calls[0],
            BackendCall::CreateBufferSource(handle, 16000, true)
        );
    }

    #[test]
    fn buffer_ref_is_left_to_the_orchestrator() {
        let mut backend = MockBackend::new(44100);
        assert!(create_node(&mut backend, &synth(GeneratorKind::BufferRef, 0.0)).is_none());
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn variant_selection_floors_and_clamps() {
        assert_eq!(NoiseVariant::from_field(0.5), NoiseVariant::White);
        assert_eq!(NoiseVariant::from_field(1.0), NoiseVariant::Pink);
        assert_eq!(NoiseVariant::from_field(2.9), NoiseVariant::Brown);
        assert_eq!(NoiseVariant::from_field(3.0), NoiseVariant::Gray);
        assert_eq!(NoiseVariant::from_field(7.0), NoiseVariant::White);
    }

    #[test]
    fn white_noise_spans_both_polarities() {
        let buf = noise_buffer(NoiseVariant::White, 8000);
        let samples = &buf.channels[0];
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(samples.iter().any(|s| *s > 0.5));
        assert!(samples.iter().any(|s| *s < -0.5));
    }

    #[test]
    fn brown_noise_steps_are_bounded() {
        let buf = noise_buffer(NoiseVariant::Brown, 8000);
        let samples = &buf.channels[0];
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        for pair in samples.windows(2) {
            assert!(
                (pair[1] - pair[0]).abs() <= 0.02 + 1e-6,
                "integration step exceeded bound"
            );
        }
    }

    #[test]
    fn pink_and_gray_stay_in_range() {
        for variant in [NoiseVariant::Pink, NoiseVariant::Gray] {
            let buf = noise_buffer(variant, 8000);
            assert!(buf.channels[0].iter().all(|s| (-1.0..=1.0).contains(s)));
            let energy: f32 = buf.channels[0].iter().map(|s| s * s).sum();
            assert!(energy > 0.0, "{variant:?} produced silence");
        }
    }
}
