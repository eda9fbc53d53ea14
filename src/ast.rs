//! Abstract syntax tree for the Syno notation
//!
//! The parser turns each whitespace-delimited token into one node. Token
//! order is declaration order: it governs implicit buffer numbering and
//! display order, not audible ordering (each node carries its own
//! `start_time`).

/// The closed set of generator tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
    /// Plays back a captured buffer slot.
    BufferRef,
}

impl GeneratorKind {
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            's' => Some(Self::Sine),
            'q' => Some(Self::Square),
            'a' => Some(Self::Sawtooth),
            't' => Some(Self::Triangle),
            'n' => Some(Self::Noise),
            'b' => Some(Self::BufferRef),
            _ => None,
        }
    }

    pub fn tag(&self) -> char {
        match self {
            Self::Sine => 's',
            Self::Square => 'q',
            Self::Sawtooth => 'a',
            Self::Triangle => 't',
            Self::Noise => 'n',
            Self::BufferRef => 'b',
        }
    }
}

/// A deterministic ramp applied to one scalar control: one linear segment
/// (start to end), or two when `middle` is present (start to middle over
/// half the duration, middle to end over the rest).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub start: f64,
    pub middle: Option<f64>,
    pub end: f64,
    pub duration: f64,
}

/// A scalar control: either a fixed value or a scheduled transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    Fixed(f64),
    Ramp(Transition),
}

impl Param {
    /// Value the control holds at the start of the node's life.
    pub fn initial(&self) -> f64 {
        match self {
            Param::Fixed(v) => *v,
            Param::Ramp(t) => t.start,
        }
    }

}

/// One generator voice: a source plus its effect fields.
///
/// `buffer` names a slot. For `BufferRef` nodes it is the slot to play;
/// for every other kind it is the slot this node populates when captured.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthNode {
    pub kind: GeneratorKind,
    /// Scheduling offset in seconds from session start.
    pub start_time: f64,
    pub freq: Param,
    /// Author-facing 0-9 scale; normalized at the orchestrator boundary.
    pub volume: Param,
    pub pan: Param,
    pub filter: Option<Param>,
    /// Gate rate, mapped onto a bounded 0.1-0.9s window.
    pub chop: Option<f64>,
    /// Reverb decay in seconds.
    pub reverb: Option<f64>,
    /// 4-digit ADSR code.
    pub envelope: String,
    /// Playback-rate ramp, buffer playback only.
    pub glissando: Option<Transition>,
    /// Ordered FM modulators / buffer inputs.
    pub recursion: Vec<SynthNode>,
    pub buffer: Option<u8>,
    /// `bN=<token>` definitions: captured offline, never played live.
    pub capture_only: bool,
}

/// Global bus volume override, 0-9 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterNode {
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Synth(SynthNode),
    Master(MasterNode),
}

impl AstNode {
    pub fn as_synth(&self) -> Option<&SynthNode> {
        match self {
            AstNode::Synth(s) => Some(s),
            AstNode::Master(_) => None,
        }
    }
}
