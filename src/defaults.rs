//! Read-only defaults registry
//!
//! Per-generator-tag defaults consulted by the parser for every omitted
//! field, plus the master bus default and the default ramp duration.

use crate::ast::GeneratorKind;
use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy)]
pub struct GeneratorDefaults {
    pub freq: f64,
    /// 0-9 author scale.
    pub volume: f64,
    pub pan: f64,
    /// 4-digit ADSR code.
    pub envelope: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct MasterDefaults {
    /// 0-9 author scale.
    pub volume: f64,
    /// Reserved 10-band EQ values.
    pub eq: [f64; 10],
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionDefaults {
    /// Ramp duration in seconds when a token omits `'duration`.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Registry {
    sine: GeneratorDefaults,
    square: GeneratorDefaults,
    sawtooth: GeneratorDefaults,
    triangle: GeneratorDefaults,
    noise: GeneratorDefaults,
    buffer: GeneratorDefaults,
    pub master: MasterDefaults,
    pub transitions: TransitionDefaults,
}

impl Registry {
    pub fn generator(&self, kind: GeneratorKind) -> &GeneratorDefaults {
        match kind {
            GeneratorKind::Sine => &self.sine,
            GeneratorKind::Square => &self.square,
            GeneratorKind::Sawtooth => &self.sawtooth,
            GeneratorKind::Triangle => &self.triangle,
            GeneratorKind::Noise => &self.noise,
            GeneratorKind::BufferRef => &self.buffer,
        }
    }
}

const OSC_DEFAULTS: GeneratorDefaults = GeneratorDefaults {
    freq: 440.0,
    volume: 5.0,
    pan: 0.0,
    envelope: "0155",
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry {
        sine: OSC_DEFAULTS,
        square: OSC_DEFAULTS,
        sawtooth: OSC_DEFAULTS,
        triangle: OSC_DEFAULTS,
        noise: GeneratorDefaults {
            // The noise freq field carries the algorithm variant, not Hz.
            freq: 0.5,
            volume: 5.0,
            pan: 0.0,
            envelope: "0155",
        },
        buffer: GeneratorDefaults {
            freq: 0.0,
            volume: 5.0,
            pan: 0.0,
            envelope: "0155",
        },
        master: MasterDefaults {
            volume: 8.0,
            eq: [5.0; 10],
        },
        transitions: TransitionDefaults { duration: 4.0 },
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oscillator_tags_share_defaults() {
        for kind in [
            GeneratorKind::Sine,
            GeneratorKind::Square,
            GeneratorKind::Sawtooth,
            GeneratorKind::Triangle,
        ] {
            let d = REGISTRY.generator(kind);
            assert_eq!(d.freq, 440.0);
            assert_eq!(d.volume, 5.0);
            assert_eq!(d.pan, 0.0);
            assert_eq!(d.envelope, "0155");
        }
    }

    #[test]
    fn master_and_transition_defaults() {
        assert_eq!(REGISTRY.master.volume, 8.0);
        assert_eq!(REGISTRY.master.eq, [5.0; 10]);
        assert_eq!(REGISTRY.transitions.duration, 4.0);
    }

    #[test]
    fn noise_variant_default_is_white() {
        let d = REGISTRY.generator(GeneratorKind::Noise);
        assert!(d.freq < 1.0, "default noise variant should floor to white");
    }
}
