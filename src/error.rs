//! Error taxonomy for the Syno core
//!
//! Parse and build failures are per-token/per-node and non-fatal: they are
//! logged, collected, and the offending token or node is skipped. Only a
//! backend that cannot reach the running state aborts a `play()` call.

use crate::backend::BackendState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynoError {
    /// Token matched neither the master nor the generator shape.
    #[error("invalid syntax: {0}")]
    Grammar(String),

    /// Recognized token shape but an unsupported generator tag.
    #[error("unknown generator tag: {0}")]
    UnknownGenerator(char),

    /// Reference to a buffer slot that was never captured.
    #[error("buffer slot b{0} has not been captured")]
    BufferNotFound(u8),

    /// The audio backend cannot reach the running state. Fatal for the
    /// current play() call; the caller decides what to do next.
    #[error("audio backend cannot run (state: {0:?})")]
    BackendState(BackendState),
}
