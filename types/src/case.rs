//! Test cases and their verdicts.

use serde::Deserialize;

use crate::diagnostic::Diagnostic;

/// One conformance case: a source snippet with diagnostic expectations.
///
/// Immutable once defined. Deserializable so a corpus can be loaded from a
/// TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    name: String,
    source: String,
    /// Number of diagnostics the server is expected to publish.
    expected_count: usize,
    /// Substrings that must each appear in some diagnostic message.
    #[serde(default)]
    message_contains: Vec<String>,
    #[serde(default)]
    description: String,
}

impl TestCase {
    #[must_use]
    pub fn new(name: &str, source: &str, expected_count: usize) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            expected_count,
            message_contains: Vec::new(),
            description: String::new(),
        }
    }

    /// Require `substring` to appear in at least one diagnostic message.
    #[must_use]
    pub fn expecting_message(mut self, substring: &str) -> Self {
        self.message_contains.push(substring.to_string());
        self
    }

    #[must_use]
    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    #[must_use]
    pub fn message_contains(&self) -> &[String] {
        &self.message_contains
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Why a case failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No diagnostics update arrived within the per-case budget.
    Timeout,
    /// An update arrived but the diagnostic count disagreed.
    CountMismatch { expected: usize, actual: usize },
    /// Counts agreed but an expected message substring was absent.
    MessageMismatch { missing: String },
    /// The session was already broken when the case began; no I/O attempted.
    SessionUnavailable { reason: String },
}

impl FailureReason {
    /// Short category label used for the report breakdown.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::CountMismatch { .. } => "count-mismatch",
            Self::MessageMismatch { .. } => "message-mismatch",
            Self::SessionUnavailable { .. } => "transport-error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "no diagnostics within timeout"),
            Self::CountMismatch { expected, actual } => {
                write!(f, "expected {expected} diagnostics, got {actual}")
            }
            Self::MessageMismatch { missing } => {
                write!(f, "no diagnostic message contains {missing:?}")
            }
            Self::SessionUnavailable { reason } => {
                write!(f, "session unavailable: {reason}")
            }
        }
    }
}

/// The outcome of executing one [`TestCase`]. Produced once, never mutated.
#[derive(Debug, Clone)]
pub struct Verdict {
    case: TestCase,
    diagnostics: Vec<Diagnostic>,
    failure: Option<FailureReason>,
}

impl Verdict {
    #[must_use]
    pub fn pass(case: TestCase, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            case,
            diagnostics,
            failure: None,
        }
    }

    #[must_use]
    pub fn fail(case: TestCase, diagnostics: Vec<Diagnostic>, reason: FailureReason) -> Self {
        Self {
            case,
            diagnostics,
            failure: Some(reason),
        }
    }

    #[must_use]
    pub fn case(&self) -> &TestCase {
        &self.case
    }

    /// The diagnostics actually observed for the case (possibly empty).
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;

    #[test]
    fn test_case_builder() {
        let case = TestCase::new("undefined_variable", "let x = 5 in x + y", 1)
            .expecting_message("undefined")
            .described("Should error on undefined variable 'y'");
        assert_eq!(case.name(), "undefined_variable");
        assert_eq!(case.expected_count(), 1);
        assert_eq!(case.message_contains(), ["undefined"]);
        assert!(case.description().starts_with("Should error"));
    }

    #[test]
    fn test_case_deserializes_from_toml() {
        let case: TestCase = toml::from_str(
            r#"
            name = "valid_let_cascade"
            source = "let x = 5 in let y = 10 in x + y"
            expected_count = 0
            "#,
        )
        .unwrap();
        assert_eq!(case.name(), "valid_let_cascade");
        assert_eq!(case.expected_count(), 0);
        assert!(case.message_contains().is_empty());
        assert!(case.description().is_empty());
    }

    #[test]
    fn test_verdict_pass_has_no_failure() {
        let verdict = Verdict::pass(TestCase::new("ok", "1 + 1", 0), vec![]);
        assert!(verdict.passed());
        assert!(verdict.failure().is_none());
    }

    #[test]
    fn test_verdict_fail_carries_reason_and_diagnostics() {
        let diag = Diagnostic::new(Severity::Error, "boom".into(), 0, 0, "test".into());
        let verdict = Verdict::fail(
            TestCase::new("bad", "x", 0),
            vec![diag],
            FailureReason::CountMismatch {
                expected: 0,
                actual: 1,
            },
        );
        assert!(!verdict.passed());
        assert_eq!(verdict.diagnostics().len(), 1);
        assert_eq!(verdict.failure().unwrap().category(), "count-mismatch");
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::CountMismatch {
            expected: 1,
            actual: 3,
        };
        assert_eq!(reason.to_string(), "expected 1 diagnostics, got 3");
        assert_eq!(FailureReason::Timeout.category(), "timeout");
    }
}
