//! Error taxonomy for the protocol engine.
//!
//! Spawn, framing, and transport failures are errors here; per-case outcomes
//! (timeouts, expectation mismatches) are data on the
//! [`Verdict`](lspect_types::Verdict) instead.

use crate::codec::FramingError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The server binary is missing or could not be launched. Fatal — no
    /// cases run.
    #[error("cannot launch `{command}`: {message}")]
    Spawn { command: String, message: String },

    /// Malformed header or truncated stream. Terminates the session.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Broken pipe, unexpected process exit, or a dropped response channel.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The `initialize` exchange completed but the server rejected it.
    #[error("initialize handshake failed: {0}")]
    Handshake(String),
}

/// A recorded session fault, kept cloneable so every later case can echo it.
///
/// Set once by the reader task (or the first failed send) and never
/// overwritten; the executor checks it before each case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: FaultKind,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    Framing,
    Transport,
}

impl Fault {
    #[must_use]
    pub fn framing(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Framing,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Transport,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_framing(&self) -> bool {
        self.kind == FaultKind::Framing
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FaultKind::Framing => write!(f, "framing error: {}", self.message),
            FaultKind::Transport => write!(f, "transport error: {}", self.message),
        }
    }
}
