mod html_css;
mod javascript;
mod node;
mod python;
mod pytorch;
mod react;
mod typescript;

use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::models::{Exercise, TestFailure, TestResult, Toolchain};
use crate::process::{self, ProcessError};

/// Counts and failures scraped from one test report. Every field is best
/// effort; [`TestResult::from_counts`] applies the safe fallbacks.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub failures: Vec<TestFailure>,
}

type Parser = fn(&str, bool) -> Tally;

/// Runs and parses tests for one toolchain kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adapter {
    toolchain: Toolchain,
}

impl Adapter {
    pub fn for_toolchain(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    pub fn name(&self) -> &'static str {
        match self.toolchain {
            Toolchain::Python => "Python (pytest)",
            Toolchain::PyTorch => "PyTorch (pytest)",
            Toolchain::JavaScript => "JavaScript (vitest/jest)",
            Toolchain::TypeScript => "TypeScript (tsc + vitest)",
            Toolchain::React => "React (vitest + testing-library)",
            Toolchain::HtmlCss => "HTML/CSS (Playwright)",
        }
    }

    /// Invocation used when the exercise doesn't set `test_command`.
    pub fn default_command(&self, exercise: &Exercise) -> String {
        match self.toolchain {
            Toolchain::Python | Toolchain::PyTorch => python::default_command(exercise),
            Toolchain::JavaScript | Toolchain::TypeScript => javascript::default_command(exercise),
            Toolchain::React => react::default_command(exercise),
            Toolchain::HtmlCss => html_css::default_command(exercise),
        }
    }

    pub fn command_for(&self, exercise: &Exercise) -> String {
        exercise
            .test_command
            .clone()
            .unwrap_or_else(|| self.default_command(exercise))
    }

    /// Runs the exercise's tests. Never fails: timeouts, missing tools and
    /// unparseable output all come back as a failed [`TestResult`].
    pub async fn run_tests(&self, exercise: &Exercise, timeout: Duration) -> TestResult {
        let command = self.command_for(exercise);
        match self.toolchain {
            Toolchain::Python => python::run_tests(exercise, &command, timeout).await,
            Toolchain::PyTorch => pytorch::run_tests(exercise, &command, timeout).await,
            Toolchain::JavaScript => javascript::run_tests(exercise, &command, timeout).await,
            Toolchain::TypeScript => typescript::run_tests(exercise, &command, timeout).await,
            Toolchain::React => react::run_tests(exercise, &command, timeout).await,
            Toolchain::HtmlCss => html_css::run_tests(exercise, &command, timeout).await,
        }
    }

    /// Whether the external toolchain looks installed. Diagnostics only; a
    /// run is attempted regardless.
    pub async fn is_available(&self) -> bool {
        match self.toolchain {
            Toolchain::Python => which::which("pytest").is_ok(),
            Toolchain::PyTorch => pytorch::is_available().await,
            Toolchain::JavaScript | Toolchain::TypeScript | Toolchain::React => {
                which::which("npm").is_ok()
            }
            Toolchain::HtmlCss => which::which("npx").is_ok(),
        }
    }
}

/// Spawns `command`, then parses whatever it printed. Shared by every adapter
/// so timeouts and launch errors map to results the same way everywhere.
pub(crate) async fn execute(
    command: &str,
    cwd: &Path,
    env: &[(OsString, OsString)],
    timeout: Duration,
    parse: Parser,
) -> TestResult {
    match process::run_shell(command, cwd, env, timeout).await {
        Ok(run) => {
            let success = run.success();
            let tally = parse(&run.output, success);
            debug!(
                command,
                success,
                passed = tally.passed,
                failed = tally.failed,
                "parsed test output"
            );
            TestResult::from_counts(
                success,
                tally.passed,
                tally.failed,
                tally.failures,
                run.output,
                run.elapsed,
            )
        }
        Err(e) => from_process_error(e),
    }
}

pub(crate) fn from_process_error(e: ProcessError) -> TestResult {
    match e {
        ProcessError::TimedOut { limit, elapsed, .. } => TestResult::timeout(limit, elapsed),
        other => {
            let elapsed = other.elapsed();
            TestResult::error(other.to_string(), elapsed)
        }
    }
}

static COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+([A-Za-z]+)").unwrap());

/// Last `<n> <word>` count in `text`, e.g. `count_before(out, "passed")`.
/// `word` matches case-insensitively as a prefix, so `error` also counts
/// `2 errors`.
pub(crate) fn count_before(text: &str, word: &str) -> Option<usize> {
    COUNT
        .captures_iter(text)
        .filter(|caps| caps[2].to_ascii_lowercase().starts_with(word))
        .last()
        .and_then(|caps| caps[1].parse().ok())
}

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:AssertionError|Error):\s*(.+)$").unwrap());

/// Pairs `Error: ...` lines with failures still carrying the generic
/// placeholder message, in order of appearance.
pub(crate) fn attach_error_messages(failures: &mut [TestFailure], output: &str, placeholder: &str) {
    let mut messages = ERROR_LINE
        .captures_iter(output)
        .map(|caps| caps[1].trim().to_string());
    for failure in failures.iter_mut().filter(|f| f.message == placeholder) {
        match messages.next() {
            Some(message) => *failure = TestFailure::new(failure.name.clone(), message),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_before_takes_last_match() {
        let out = "tests/a.py::t1 PASSED\n1 passed earlier\n==== 2 failed, 5 passed in 0.3s ====";
        assert_eq!(count_before(out, "passed"), Some(5));
        assert_eq!(count_before(out, "failed"), Some(2));
        assert_eq!(count_before(out, "skipped"), None);
    }

    #[test]
    fn test_count_before_matches_word_prefix() {
        assert_eq!(count_before("=== 1 failed, 3 Errors in 0.2s ===", "error"), Some(3));
        assert_eq!(count_before("4 passing, 1 failing", "pass"), Some(4));
        assert_eq!(count_before("12 tests", "passed"), None);
    }

    #[test]
    fn test_attach_error_messages() {
        let mut failures = vec![
            TestFailure::new("adds", "Test failed"),
            TestFailure::new("subtracts", "Test failed"),
        ];
        attach_error_messages(&mut failures, "AssertionError: expected 3 to be 4\n", "Test failed");
        assert_eq!(failures[0].message, "expected 3 to be 4");
        assert_eq!(failures[1].message, "Test failed");
    }

    #[test]
    fn test_adapter_names_cover_every_toolchain() {
        for toolchain in Toolchain::ALL {
            assert!(!Adapter::for_toolchain(toolchain).name().is_empty());
        }
    }

    #[test]
    fn test_custom_command_overrides_default() {
        let mut ex = Exercise::new("/nowhere/01_x".into(), "X", vec![1]);
        ex.test_command = Some("make test".into());
        assert_eq!(Adapter::for_toolchain(Toolchain::Python).command_for(&ex), "make test");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_timeout_is_a_failed_result() {
        let result = execute(
            "sleep 5",
            Path::new("."),
            &[],
            Duration::from_millis(300),
            |_, _| Tally::default(),
        )
        .await;
        assert!(!result.passed);
        assert_eq!(result.tests_run, 1);
        assert_eq!(result.failures[0].name, "timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_nonzero_without_counts() {
        let result = execute(
            "echo 'SyntaxError: invalid syntax'; exit 2",
            Path::new("."),
            &[],
            Duration::from_secs(10),
            |_, _| Tally::default(),
        )
        .await;
        assert!(!result.passed);
        assert_eq!(result.tests_run, 1);
        assert_eq!(result.failures[0].message, "SyntaxError: invalid syntax");
    }
}
