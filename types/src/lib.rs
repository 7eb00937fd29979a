//! Shared data model for the lspect conformance harness.
//!
//! These types define the interface between `lspect-harness` (the protocol
//! engine) and its consumers: the harness produces [`Verdict`]s and a
//! [`Report`], the CLI formats them. Nothing in this crate performs I/O.

mod case;
mod diagnostic;
mod report;

pub use case::{FailureReason, TestCase, Verdict};
pub use diagnostic::{Diagnostic, Severity};
pub use report::{FailureBreakdown, Report};
