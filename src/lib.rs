//! # Syno - Live Coding Audio DSL
//!
//! Syno compiles a terse textual notation into a graph of signal
//! generators and processors that produce scheduled, automatable sound.
//! Tokens like `s440v2>8'3` become oscillator voices with gain ramps;
//! buffer slots capture rendered audio offline and feed it back as
//! playback or FM modulation.
//!
//! ## Quick start
//!
//! ```rust
//! use syno::engine::AudioEngine;
//! use syno::mock_backend::MockBackend;
//! use syno::parser::Parser;
//!
//! let parser = Parser::new();
//! let report = parser.parse("master v7\ns440v2>8'3 q220p-0.5");
//! assert!(report.errors.is_empty());
//!
//! let mut engine = AudioEngine::new(MockBackend::new(44100));
//! engine.play(&report.nodes).unwrap();
//!
//! // Poll while playing; these two calls are the whole UI contract.
//! let levels = engine.vu_levels();
//! assert!(levels.left >= 0.0 && levels.right >= 0.0);
//! let _elapsed = engine.timers();
//!
//! engine.stop();
//! ```
//!
//! ## Notation
//!
//! - **`s q a t n b`** - sine, square, sawtooth, triangle, noise, buffer
//! - **`s440`** - frequency; **`s100>300'2`** - frequency ramp over 2s
//! - **`v0>5>0'4`** - three-point volume ramp (0-9 scale)
//! - **`p-1`..`p1`** - pan; **`h5`** - chop gate; **`r2`** - reverb decay
//! - **`f0>9'3`** - lowpass sweep; **`e1234`** - 4-digit ADSR code
//! - **`2.5s440`** - start 2.5 seconds into the session
//! - **`b0=s440`** - capture a token into a buffer slot;
//!   **`b0\0.5>2'4`** - replay it with a rate ramp;
//!   **`{b0}t300`** - use it as an FM modulator
//! - **`master v8`** - master bus volume; **`#`** starts a comment
//!
//! ## Architecture
//!
//! 1. [`parser`] turns text into an ordered AST, consulting [`defaults`]
//!    for omitted fields; bad tokens are dropped, never fatal.
//! 2. [`engine`] walks the AST per play() call: [`node_factory`] builds
//!    sources, [`processors`] insert chop/reverb stages, and
//!    [`transitions`] schedules automation curves.
//! 3. Everything renders through the abstract [`backend`] interface; the
//!    core never touches the real-time thread directly.
//!
//! The engine is a per-session object owned by the host. State lives for
//! one play()-stop() cycle: stopping clears the active graph, the buffer
//! cache, and the transition list.

pub mod ast;
pub mod backend;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod mock_backend;
pub mod node_factory;
pub mod parser;
pub mod processors;
pub mod transitions;

pub use ast::{AstNode, GeneratorKind, MasterNode, Param, SynthNode, Transition};
pub use engine::{AudioEngine, EngineState, VuLevels};
pub use error::SynoError;
pub use parser::{ParseReport, Parser};
