//! Test executor — drives cases through a session and collects verdicts.
//!
//! Cases run strictly in order against one session. Every case gets a fresh
//! URI so diagnostics can never bleed between cases, and the executor
//! subscribes to the store before sending `didOpen` so a fast server's
//! publish is never missed.

use std::time::Duration;

use lspect_types::{FailureReason, Report, TestCase, Verdict};

use crate::diagnostics::WaitOutcome;
use crate::error::Fault;
use crate::session::Session;

const DEFAULT_CASE_TIMEOUT_SECS: u64 = 5;

/// Runs an ordered list of cases against one live session.
pub struct TestRunner {
    session: Session,
    language_id: String,
    case_timeout: Duration,
}

impl TestRunner {
    #[must_use]
    pub fn new(session: Session, language_id: &str) -> Self {
        Self {
            session,
            language_id: language_id.to_string(),
            case_timeout: Duration::from_secs(DEFAULT_CASE_TIMEOUT_SECS),
        }
    }

    /// Override the per-case diagnostics deadline.
    #[must_use]
    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Run every case in order, then shut the server down.
    ///
    /// Never aborts mid-suite: once the session faults, the remaining cases
    /// fail fast with `SessionUnavailable` instead of waiting out their
    /// timeouts.
    pub async fn run(mut self, cases: &[TestCase]) -> Report {
        let mut verdicts = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let verdict = self.run_case(index, case).await;
            if verdict.passed() {
                tracing::info!("PASS {}", case.name());
            } else if let Some(reason) = verdict.failure() {
                tracing::warn!("FAIL {}: {reason}", case.name());
            }
            verdicts.push(verdict);
        }
        self.session.shutdown().await;
        Report::from_verdicts(verdicts)
    }

    async fn run_case(&mut self, index: usize, case: &TestCase) -> Verdict {
        if let Some(fault) = self.session.fault() {
            return Verdict::fail(
                case.clone(),
                vec![],
                FailureReason::SessionUnavailable {
                    reason: fault.to_string(),
                },
            );
        }

        let uri = case_uri(index, case.name());

        // Subscribe before didOpen: a server that publishes before we start
        // waiting must still count.
        let store = self.session.diagnostics().clone();
        let subscription = store.subscribe(&uri);

        if let Err(e) = self
            .session
            .open_document(&uri, &self.language_id, case.source())
            .await
        {
            self.session.record_fault(Fault::transport(e.to_string()));
            return Verdict::fail(
                case.clone(),
                vec![],
                FailureReason::SessionUnavailable {
                    reason: e.to_string(),
                },
            );
        }

        let outcome = subscription.wait(self.case_timeout).await;
        evaluate(case, outcome)
    }
}

/// Compare what the server published (or didn't) against the expectation.
///
/// Silence counts as agreement only when zero diagnostics were expected and
/// none are on record; otherwise it is a timeout failure.
fn evaluate(case: &TestCase, outcome: WaitOutcome) -> Verdict {
    if !outcome.updated() {
        if case.expected_count() == 0 && outcome.diagnostics().is_empty() {
            return Verdict::pass(case.clone(), outcome.into_diagnostics());
        }
        return Verdict::fail(case.clone(), outcome.into_diagnostics(), FailureReason::Timeout);
    }

    if outcome.diagnostics().len() != case.expected_count() {
        let actual = outcome.diagnostics().len();
        return Verdict::fail(
            case.clone(),
            outcome.into_diagnostics(),
            FailureReason::CountMismatch {
                expected: case.expected_count(),
                actual,
            },
        );
    }

    for needle in case.message_contains() {
        if !outcome
            .diagnostics()
            .iter()
            .any(|d| d.message().contains(needle.as_str()))
        {
            return Verdict::fail(
                case.clone(),
                outcome.into_diagnostics(),
                FailureReason::MessageMismatch {
                    missing: needle.clone(),
                },
            );
        }
    }

    Verdict::pass(case.clone(), outcome.into_diagnostics())
}

/// Per-case synthetic URI. Cases never share a document, so stale
/// diagnostics from one case cannot satisfy (or fail) the next.
fn case_uri(index: usize, name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("file:///lspect/case-{index:03}-{slug}.av")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspect_types::{Diagnostic, Severity};

    fn make_diag(msg: &str) -> Diagnostic {
        Diagnostic::new(Severity::Error, msg.to_string(), 0, 0, "test".to_string())
    }

    fn case(name: &str, expected: usize) -> TestCase {
        TestCase::new(name, "let x = 5 in x", expected)
    }

    #[test]
    fn test_evaluate_pass_on_matching_count() {
        let outcome = WaitOutcome::new(vec![make_diag("undefined variable `y`")], true);
        let verdict = evaluate(&case("one-error", 1), outcome);
        assert!(verdict.passed());
        assert_eq!(verdict.diagnostics().len(), 1);
    }

    #[test]
    fn test_evaluate_count_mismatch() {
        let outcome = WaitOutcome::new(vec![make_diag("a"), make_diag("b")], true);
        let verdict = evaluate(&case("one-error", 1), outcome);
        assert_eq!(
            verdict.failure(),
            Some(&FailureReason::CountMismatch {
                expected: 1,
                actual: 2,
            })
        );
        // The observed diagnostics travel with the verdict for reporting.
        assert_eq!(verdict.diagnostics().len(), 2);
    }

    #[test]
    fn test_evaluate_message_substring_match() {
        let outcome = WaitOutcome::new(vec![make_diag("undefined variable `y`")], true);
        let verdict = evaluate(
            &case("substr", 1).expecting_message("undefined variable"),
            outcome,
        );
        assert!(verdict.passed());
    }

    #[test]
    fn test_evaluate_message_mismatch_names_missing_substring() {
        let outcome = WaitOutcome::new(vec![make_diag("type error")], true);
        let verdict = evaluate(
            &case("substr", 1).expecting_message("undefined variable"),
            outcome,
        );
        assert_eq!(
            verdict.failure(),
            Some(&FailureReason::MessageMismatch {
                missing: "undefined variable".to_string(),
            })
        );
    }

    #[test]
    fn test_evaluate_substring_can_match_any_diagnostic() {
        let outcome = WaitOutcome::new(vec![make_diag("first"), make_diag("undefined `z`")], true);
        let verdict = evaluate(&case("any", 2).expecting_message("undefined"), outcome);
        assert!(verdict.passed());
    }

    #[test]
    fn test_evaluate_every_expected_substring_must_appear() {
        let outcome = WaitOutcome::new(vec![make_diag("undefined `z`")], true);
        let verdict = evaluate(
            &case("multi", 1)
                .expecting_message("undefined")
                .expecting_message("type error"),
            outcome,
        );
        assert_eq!(
            verdict.failure(),
            Some(&FailureReason::MessageMismatch {
                missing: "type error".to_string(),
            })
        );
    }

    #[test]
    fn test_evaluate_timeout_with_expected_zero_passes() {
        // No publish at all still satisfies "expect clean".
        let outcome = WaitOutcome::new(vec![], false);
        let verdict = evaluate(&case("clean", 0), outcome);
        assert!(verdict.passed());
    }

    #[test]
    fn test_evaluate_timeout_with_expected_errors_fails() {
        let outcome = WaitOutcome::new(vec![], false);
        let verdict = evaluate(&case("should-error", 1), outcome);
        assert_eq!(verdict.failure(), Some(&FailureReason::Timeout));
    }

    #[test]
    fn test_evaluate_explicit_empty_publish_passes_expected_zero() {
        // The server affirmatively said "no diagnostics".
        let outcome = WaitOutcome::new(vec![], true);
        let verdict = evaluate(&case("clean", 0), outcome);
        assert!(verdict.passed());
    }

    #[test]
    fn test_case_uri_is_unique_per_index() {
        let a = case_uri(0, "undefined variable");
        let b = case_uri(1, "undefined variable");
        assert_ne!(a, b);
        assert!(a.starts_with("file:///lspect/case-000-"));
    }

    #[test]
    fn test_case_uri_slugs_unfriendly_characters() {
        let uri = case_uri(2, "Template / Lambda!");
        assert_eq!(uri, "file:///lspect/case-002-template---lambda-.av");
    }
}
