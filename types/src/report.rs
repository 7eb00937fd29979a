//! Aggregated run results, handed to an external formatter.

use crate::case::{FailureReason, Verdict};

/// Failure counts by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureBreakdown {
    pub timeouts: usize,
    pub count_mismatches: usize,
    pub message_mismatches: usize,
    pub transport_errors: usize,
}

/// Pure aggregation over the verdicts of one run. No I/O.
#[derive(Debug, Clone, Default)]
pub struct Report {
    verdicts: Vec<Verdict>,
}

impl Report {
    #[must_use]
    pub fn from_verdicts(verdicts: Vec<Verdict>) -> Self {
        Self { verdicts }
    }

    #[must_use]
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.total() - self.passed_count()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    /// The failing verdicts, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed())
    }

    #[must_use]
    pub fn breakdown(&self) -> FailureBreakdown {
        let mut breakdown = FailureBreakdown::default();
        for verdict in self.failures() {
            match verdict.failure() {
                Some(FailureReason::Timeout) => breakdown.timeouts += 1,
                Some(FailureReason::CountMismatch { .. }) => breakdown.count_mismatches += 1,
                Some(FailureReason::MessageMismatch { .. }) => breakdown.message_mismatches += 1,
                Some(FailureReason::SessionUnavailable { .. }) => breakdown.transport_errors += 1,
                None => {}
            }
        }
        breakdown
    }
}
