//! Protocol engine for the lspect conformance harness.
//!
//! Spawns a language-server process, speaks Content-Length framed JSON-RPC
//! over its stdin/stdout, and drives [`TestCase`](lspect_types::TestCase)s
//! against it. One background reader task per [`Session`] dispatches frames;
//! everything else is sequential.

pub mod codec;
pub mod diagnostics;
pub mod error;
pub mod runner;
pub mod session;

pub(crate) mod protocol;

pub use codec::{FrameReader, FrameWriter, FramingError};
pub use diagnostics::{DiagnosticsStore, WaitOutcome};
pub use error::{Fault, HarnessError};
pub use runner::TestRunner;
pub use session::{ServerCommand, Session};
