//! Pieces shared by the npm-based toolchains: project root lookup, the
//! `npm install` bootstrap, `tsc` type checking and vitest/jest parsing.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use super::{attach_error_messages, count_before, from_process_error, Tally};
use crate::models::result::fallback_message;
use crate::models::{Exercise, FailureKind, TestFailure, TestResult};
use crate::process::{self, shell_quote, ProcessError};

pub(super) const MANIFEST: &str = "package.json";
pub(super) const INSTALL_COMMAND: &str = "npm install";
pub(super) const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);
pub(super) const PLACEHOLDER: &str = "Test failed";

static TESTS_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*Tests:?\s+(.*)$").unwrap());
static FAIL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[✕×]\s+(.+?)(?:\s+\(?\d+(?:\.\d+)?\s*ms\)?)?\s*$").unwrap()
});
static TSC_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+?)\((\d+),(\d+)\):\s+error\s+(TS\d+):\s*(.+)$").unwrap()
});
static TSC_PRETTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+?):(\d+):(\d+)\s+-\s+error\s+(TS\d+):\s*(.+)$").unwrap()
});

/// Nearest ancestor of the exercise holding a `package.json`, so exercises
/// nested inside a shared node project resolve to that project.
pub(super) fn find_project_root(exercise: &Exercise) -> PathBuf {
    exercise
        .path
        .ancestors()
        .find(|dir| dir.join(MANIFEST).is_file())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| exercise.path.clone())
}

pub(super) fn has_vitest(project_root: &Path) -> bool {
    fs::read_to_string(project_root.join(MANIFEST))
        .map(|manifest| manifest.contains("vitest"))
        .unwrap_or(false)
}

/// The exercise's tests directory relative to `project_root`, quoted.
pub(super) fn tests_arg(exercise: &Exercise, project_root: &Path) -> String {
    let tests = exercise.tests_path();
    let relative = tests.strip_prefix(project_root).unwrap_or(&tests);
    shell_quote(relative)
}

pub(super) fn node_env() -> Vec<(OsString, OsString)> {
    vec![
        (OsString::from("NO_COLOR"), OsString::from("1")),
        (OsString::from("FORCE_COLOR"), OsString::from("0")),
        (OsString::from("CI"), OsString::from("1")),
    ]
}

/// Runs `npm install` (or the exercise's `install_command`) when the
/// project has a manifest but no `node_modules`. Returns the failed result
/// that should be reported instead of running tests, if any.
///
/// With `require_manifest`, a missing `package.json` is itself a setup
/// failure.
pub(super) async fn ensure_dependencies(
    exercise: &Exercise,
    project_root: &Path,
    require_manifest: bool,
) -> Option<TestResult> {
    if !project_root.join(MANIFEST).is_file() {
        if require_manifest {
            let message = format!("No {MANIFEST} found in {}", project_root.display());
            return Some(TestResult::short_circuit(
                FailureKind::Setup,
                vec![TestFailure::synthetic(FailureKind::Setup, message.clone())],
                message,
                Duration::ZERO,
            ));
        }
        return None;
    }
    if project_root.join("node_modules").is_dir() {
        return None;
    }

    let command = exercise.install_command.as_deref().unwrap_or(INSTALL_COMMAND);
    install(command, project_root, INSTALL_TIMEOUT).await
}

async fn install(command: &str, project_root: &Path, limit: Duration) -> Option<TestResult> {
    info!(project = %project_root.display(), command, "installing dependencies");
    match process::run_shell(command, project_root, &node_env(), limit).await {
        Ok(run) if run.success() => None,
        Ok(run) => {
            warn!(project = %project_root.display(), command, "dependency install failed");
            let message = fallback_message(&run.output);
            Some(TestResult::short_circuit(
                FailureKind::Install,
                vec![TestFailure::synthetic(FailureKind::Install, message)],
                run.output,
                run.elapsed,
            ))
        }
        Err(ProcessError::TimedOut { limit, elapsed, .. }) => {
            let message = format!("`{command}` timed out after {}s", limit.as_secs());
            Some(TestResult::short_circuit(
                FailureKind::Install,
                vec![TestFailure::synthetic(FailureKind::Install, message.clone())],
                message,
                elapsed,
            ))
        }
        Err(e) => {
            let elapsed = e.elapsed();
            let message = e.to_string();
            Some(TestResult::short_circuit(
                FailureKind::Install,
                vec![TestFailure::synthetic(FailureKind::Install, message.clone())],
                message,
                elapsed,
            ))
        }
    }
}

fn find_tsconfig(exercise: &Exercise, project_root: &Path) -> Option<PathBuf> {
    [project_root, exercise.path.as_path()]
        .into_iter()
        .map(|dir| dir.join("tsconfig.json"))
        .find(|candidate| candidate.is_file())
}

/// `tsc --noEmit` ahead of the tests, skipped without a `tsconfig.json`.
/// An exercise `typecheck_command` always runs in its place. Returns the
/// failed result when the checker rejects the sources.
pub(super) async fn type_check(exercise: &Exercise, project_root: &Path, timeout: Duration) -> Option<TestResult> {
    let command = match &exercise.typecheck_command {
        Some(custom) => custom.clone(),
        None => {
            let tsconfig = find_tsconfig(exercise, project_root)?;
            format!("npx tsc --noEmit --pretty false -p {}", shell_quote(&tsconfig))
        }
    };

    match process::run_shell(&command, project_root, &node_env(), timeout).await {
        Ok(run) if run.success() => None,
        Ok(run) => {
            warn!(project = %project_root.display(), "type check failed");
            let failures = parse_type_errors(&run.output);
            Some(TestResult::short_circuit(
                FailureKind::TypeCheck,
                failures,
                run.output,
                run.elapsed,
            ))
        }
        Err(e @ ProcessError::TimedOut { .. }) => Some(from_process_error(e)),
        Err(e) => {
            let elapsed = e.elapsed();
            let message = e.to_string();
            Some(TestResult::short_circuit(
                FailureKind::TypeCheck,
                vec![TestFailure::synthetic(FailureKind::TypeCheck, message.clone())],
                message,
                elapsed,
            ))
        }
    }
}

/// One failure per compiler diagnostic, in either of tsc's output styles.
pub(super) fn parse_type_errors(output: &str) -> Vec<TestFailure> {
    let plain = TSC_PLAIN.captures_iter(output);
    let pretty = TSC_PRETTY.captures_iter(output);
    plain
        .chain(pretty)
        .map(|caps| {
            let location = format!("{}:{}:{}", caps[1].trim(), &caps[2], &caps[3]);
            TestFailure::synthetic(FailureKind::TypeCheck, format!("{}: {}", &caps[4], caps[5].trim()))
                .at(location)
        })
        .collect()
}

/// vitest and jest reports: the `Tests` summary line, `✕`/`×` markers, and
/// assertion messages paired with the marked tests.
pub(super) fn parse(output: &str, _success: bool) -> Tally {
    let summary = TESTS_LINE
        .captures_iter(output)
        .last()
        .map(|caps| caps[1].to_string());
    let scope = summary.as_deref().unwrap_or(output);

    let passed = count_before(scope, "passed").or_else(|| count_before(scope, "pass")).unwrap_or(0);
    let failed = count_before(scope, "failed").or_else(|| count_before(scope, "fail")).unwrap_or(0);

    let mut failures: Vec<TestFailure> = Vec::new();
    for caps in FAIL_MARKER.captures_iter(output) {
        let name = caps[1].trim();
        if !failures.iter().any(|f| f.name == name) {
            failures.push(TestFailure::new(name, PLACEHOLDER));
        }
    }
    attach_error_messages(&mut failures, output, PLACEHOLDER);

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

    const VITEST: &str = "\
 RUN  v1.2.0 /work/course

 ✓ tests/sum.test.js > sum > adds 2ms
 × tests/sum.test.js > sum > subtracts 4ms
   → expected 3 to be 4

 FAIL  tests/sum.test.js > sum > subtracts
AssertionError: expected 3 to be 4 // Object.is equality
 ❯ tests/sum.test.js:9:20

 Test Files  1 failed (1)
      Tests  1 failed | 1 passed (2)
";

    const JEST: &str = "\
  sum
    ✓ adds (2 ms)
    ✕ subtracts (3 ms)

  ● sum › subtracts

    Error: expect(received).toBe(expected)

Tests:       1 failed, 1 passed, 2 total
";

    #[test]
    fn test_parse_vitest() {
        let tally = parse(VITEST, false);
        assert_eq!((tally.passed, tally.failed), (1, 1));
        assert_eq!(tally.failures.len(), 1);
        assert_eq!(tally.failures[0].name, "tests/sum.test.js > sum > subtracts");
        assert_eq!(tally.failures[0].message, "expected 3 to be 4 // Object.is equality");
    }

    #[test]
    fn test_parse_jest() {
        let tally = parse(JEST, false);
        assert_eq!((tally.passed, tally.failed), (1, 1));
        assert_eq!(tally.failures[0].name, "subtracts");
        assert_eq!(tally.failures[0].message, "expect(received).toBe(expected)");
    }

    #[test]
    fn test_parse_type_errors_both_styles() {
        let out = "\
src/main.ts(3,7): error TS2322: Type 'string' is not assignable to type 'number'.
src/util.ts:10:1 - error TS2304: Cannot find name 'foo'.
";
        let failures = parse_type_errors(out);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].name, "type_check");
        assert_eq!(failures[0].kind, FailureKind::TypeCheck);
        assert_eq!(failures[0].location.as_deref(), Some("src/main.ts:3:7"));
        assert!(failures[0].message.starts_with("TS2322: Type 'string'"));
        assert_eq!(failures[1].location.as_deref(), Some("src/util.ts:10:1"));
    }

    #[test]
    fn test_find_project_root_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST), r#"{"devDependencies":{"vitest":"^1"}}"#).unwrap();
        let nested = dir.path().join("exercises/01_sum");
        fs::create_dir_all(nested.join("tests")).unwrap();
        let ex = Exercise::new(nested, "Sum", vec![1]);

        let root = find_project_root(&ex);
        assert_eq!(root, dir.path());
        assert!(has_vitest(&root));
        assert_eq!(tests_arg(&ex, &root), "exercises/01_sum/tests");
    }

    #[tokio::test]
    async fn test_missing_manifest_is_setup_failure_only_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "Sum", vec![1]);
        assert!(ensure_dependencies(&ex, dir.path(), false).await.is_none());

        let result = ensure_dependencies(&ex, dir.path(), true).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.tests_run, 1);
        assert_eq!(result.failures[0].name, "setup");
    }

    #[tokio::test]
    async fn test_type_check_skipped_without_tsconfig() {
        let dir = tempfile::tempdir().unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "Typed", vec![1]);
        assert!(type_check(&ex, dir.path(), Duration::from_secs(5)).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_install_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST), "{}").unwrap();
        let mut ex = Exercise::new(dir.path().to_path_buf(), "Sum", vec![1]);
        ex.install_command = Some("echo 'npm ERR! 404 Not Found'; exit 1".into());

        let result = ensure_dependencies(&ex, dir.path(), true).await.unwrap();
        assert!(!result.passed);
        assert_eq!((result.tests_run, result.tests_passed), (1, 0));
        assert_eq!(result.failures[0].name, "dependency_install");
        assert_eq!(result.failures[0].kind, FailureKind::Install);
        assert_eq!(result.failures[0].message, "npm ERR! 404 Not Found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_skipped_when_modules_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST), "{}").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let mut ex = Exercise::new(dir.path().to_path_buf(), "Sum", vec![1]);
        ex.install_command = Some("touch installed".into());

        assert!(ensure_dependencies(&ex, dir.path(), true).await.is_none());
        assert!(!dir.path().join("installed").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = install("sleep 5", dir.path(), Duration::from_millis(200)).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].name, "dependency_install");
        assert!(result.failures[0].message.starts_with("`sleep 5` timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_custom_type_check_runs_without_tsconfig() {
        let dir = tempfile::tempdir().unwrap();
        let mut ex = Exercise::new(dir.path().to_path_buf(), "Typed", vec![1]);
        ex.typecheck_command = Some("echo \"src/main.ts(3,7): error TS2322: Bad.\"; exit 2".into());

        let result = type_check(&ex, dir.path(), Duration::from_secs(10)).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.failures[0].kind, FailureKind::TypeCheck);
        assert_eq!(result.failures[0].location.as_deref(), Some("src/main.ts:3:7"));
    }
}
