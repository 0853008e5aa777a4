use std::env;
use std::ffi::OsString;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::{count_before, execute, Tally};
use crate::models::{Exercise, TestFailure, TestResult};
use crate::process::shell_quote;

static FAILED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:FAILED|ERROR)\s+([^\s:]+)(?:::(\S+))?(?:\s+-\s+(.*))?$").unwrap()
});

pub(super) fn default_command(exercise: &Exercise) -> String {
    let tests = exercise.tests_path();
    if tests.is_dir() {
        format!("pytest {} -v --tb=short", shell_quote(&tests))
    } else {
        "pytest -v --tb=short".to_string()
    }
}

pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let env = python_env(exercise);
    execute(command, &exercise.path, &env, timeout, parse).await
}

/// `PYTHONPATH` with the learner's sources first so tests can import them.
pub(super) fn python_env(exercise: &Exercise) -> Vec<(OsString, OsString)> {
    let mut paths = vec![exercise.source_dir()];
    if let Some(existing) = env::var_os("PYTHONPATH") {
        paths.extend(env::split_paths(&existing));
    }
    let joined = env::join_paths(paths)
        .unwrap_or_else(|_| exercise.source_dir().into_os_string());
    vec![(OsString::from("PYTHONPATH"), joined)]
}

pub(super) fn parse(output: &str, _success: bool) -> Tally {
    let passed = count_before(output, "passed").unwrap_or(0);
    let failed = count_before(output, "failed").unwrap_or(0) + count_before(output, "error").unwrap_or(0);

    let failures = FAILED_LINE
        .captures_iter(output)
        .map(|caps| {
            let file = &caps[1];
            let test = caps.get(2).map_or("unknown", |m| m.as_str());
            let message = caps
                .get(3)
                .map(|m| m.as_str().trim())
                .filter(|m| !m.is_empty())
                .unwrap_or("Test failed");
            TestFailure::new(format!("{file}::{test}"), message).at(file)
        })
        .collect();

    Tally {
        passed,
        failed,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = "\
tests/test_main.py::test_add PASSED                                      [ 33%]
tests/test_main.py::test_sub FAILED                                      [ 66%]
tests/test_main.py::test_mul PASSED                                      [100%]

=========================== short test summary info ============================
FAILED tests/test_main.py::test_sub - assert -1 == 1
========================= 1 failed, 2 passed in 0.05s ==========================
";

    #[test]
    fn test_parse_summary_and_failures() {
        let tally = parse(REPORT, false);
        assert_eq!(tally.passed, 2);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.failures.len(), 1);
        assert_eq!(tally.failures[0].name, "tests/test_main.py::test_sub");
        assert_eq!(tally.failures[0].message, "assert -1 == 1");
        assert_eq!(tally.failures[0].location.as_deref(), Some("tests/test_main.py"));
    }

    #[test]
    fn test_parse_collection_error() {
        let out = "ERROR tests/test_main.py\n!!! Interrupted: 1 error during collection !!!\n===== 1 error in 0.10s =====\n";
        let tally = parse(out, false);
        assert_eq!(tally.passed, 0);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.failures[0].name, "tests/test_main.py::unknown");
        assert_eq!(tally.failures[0].message, "Test failed");
    }

    #[test]
    fn test_all_passing() {
        let tally = parse("==== 4 passed in 0.01s ====\n", true);
        let result = TestResult::from_counts(true, tally.passed, tally.failed, tally.failures, String::new(), Duration::ZERO);
        assert!(result.passed);
        assert_eq!(result.tests_run, 4);
    }

    #[test]
    fn test_default_command_prefers_tests_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "X", vec![1]);
        assert_eq!(default_command(&ex), "pytest -v --tb=short");

        std::fs::create_dir(dir.path().join("tests")).unwrap();
        assert!(default_command(&ex).starts_with("pytest "));
        assert!(default_command(&ex).contains("tests"));
    }

    #[test]
    fn test_pythonpath_starts_with_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "X", vec![1]);
        let env = python_env(&ex);
        let first = env::split_paths(&env[0].1).next().unwrap();
        assert_eq!(first, dir.path().join("src"));
    }
}
