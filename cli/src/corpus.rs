//! Case corpora: the built-in suite and TOML-defined custom suites.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use lspect_types::TestCase;

/// The built-in suite. Exercises scoping, templates, multi-line constructs,
/// and builtins of the avon language; counts refer to diagnostics the
/// reference server publishes for each snippet.
#[must_use]
pub fn builtin_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("undefined_variable", "let x = 5 in x + y", 1)
            .expecting_message("undefined")
            .described("Should error on undefined variable 'y'"),
        TestCase::new("valid_let_cascade", "let x = 5 in let y = 10 in x + y", 0)
            .described("Should allow cascading let bindings"),
        TestCase::new("single_brace_template", "@out.txt {\"Hello {name}\"}", 0)
            .described("Should allow single-brace templates"),
        TestCase::new("double_brace_template", "@out.txt {{\"Hello {{x}}\"}}", 0)
            .described("Should allow double-brace templates"),
        TestCase::new("triple_brace_template", "@out.txt {{{\"Content\nHere\"}}}", 0)
            .described("Should allow triple-brace templates"),
        TestCase::new("multiline_if", "if x > 5\nthen 10\nelse 20", 1)
            .described("Should allow multi-line if statements, 'x' is undefined"),
        TestCase::new("lambda_multiline", "let f = \\x \\y\n  x + y\nin f 5 10", 0)
            .described("Should track lambda parameters across lines"),
        TestCase::new(
            "dict_access",
            "let config = {host: \"localhost\", port: 8080} in config.host",
            0,
        )
        .described("Should allow dict field access"),
        TestCase::new("pipe_operator", "[1,2,3] -> length", 0)
            .described("Should recognize pipe operators"),
        TestCase::new("builtin_functions", "length [1,2,3]", 0)
            .described("Should recognize builtin functions"),
    ]
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(rename = "case")]
    cases: Vec<TestCase>,
}

/// Load a suite from a TOML file with one `[[case]]` table per case.
pub fn load_cases(path: &Path) -> anyhow::Result<Vec<TestCase>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read corpus file {}", path.display()))?;
    let file: CorpusFile = toml::from_str(&text)
        .with_context(|| format!("invalid corpus file {}", path.display()))?;
    anyhow::ensure!(!file.cases.is_empty(), "corpus file defines no cases");
    Ok(file.cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_corpus_shape() {
        let cases = builtin_cases();
        assert_eq!(cases.len(), 10);
        assert_eq!(cases[0].name(), "undefined_variable");
        assert_eq!(cases[0].expected_count(), 1);
        assert_eq!(cases[0].message_contains(), ["undefined"]);
        // Most of the suite expects a clean bill of health.
        assert_eq!(cases.iter().filter(|c| c.expected_count() == 0).count(), 8);
    }

    #[test]
    fn test_load_cases_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[case]]
            name = "undef"
            source = "let x = 5 in y"
            expected_count = 1
            message_contains = ["undefined"]

            [[case]]
            name = "clean"
            source = "let x = 5 in x"
            expected_count = 0
            "#
        )
        .unwrap();

        let cases = load_cases(file.path()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name(), "undef");
        assert_eq!(cases[1].expected_count(), 0);
    }

    #[test]
    fn test_load_cases_rejects_empty_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "case = []").unwrap();
        assert!(load_cases(file.path()).is_err());
    }

    #[test]
    fn test_load_cases_rejects_missing_file() {
        let err = load_cases(Path::new("/nonexistent/corpus.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read corpus file"));
    }
}
