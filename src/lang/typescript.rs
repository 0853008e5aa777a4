use std::time::Duration;

use super::{execute, node};
use crate::models::{Exercise, TestResult};

/// Dependencies, then `tsc`, then the JavaScript suite. Type errors stop the
/// run before any test executes.
pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let root = node::find_project_root(exercise);
    if let Some(failed) = node::ensure_dependencies(exercise, &root, false).await {
        return failed;
    }
    if let Some(failed) = node::type_check(exercise, &root, timeout).await {
        return failed;
    }
    execute(command, &root, &node::node_env(), timeout, node::parse).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_suite_without_tsconfig() {
        let dir = tempfile::tempdir().unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "Typed", vec![1]);
        let result = run_tests(
            &ex,
            "echo 'Tests:       2 passed, 2 total'",
            Duration::from_secs(10),
        )
        .await;
        assert!(result.passed);
        assert_eq!(result.tests_run, 2);
    }

    #[tokio::test]
    async fn test_failed_install_stops_before_tests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let mut ex = Exercise::new(dir.path().to_path_buf(), "Typed", vec![1]);
        ex.install_command = Some("exit 1".into());
        ex.typecheck_command = Some("touch checked".into());

        let result = run_tests(&ex, "touch tested", Duration::from_secs(10)).await;
        assert!(!result.passed);
        assert_eq!(result.failures[0].name, "dependency_install");
        assert!(!dir.path().join("checked").exists());
        assert!(!dir.path().join("tested").exists());
    }

    #[tokio::test]
    async fn test_type_errors_stop_before_tests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        let mut ex = Exercise::new(dir.path().to_path_buf(), "Typed", vec![1]);
        ex.typecheck_command =
            Some("echo \"src/main.ts:4:2 - error TS2304: Cannot find name 'x'.\"; exit 2".into());

        let result = run_tests(&ex, "touch tested", Duration::from_secs(10)).await;
        assert!(!result.passed);
        assert_eq!((result.tests_run, result.tests_passed), (1, 0));
        assert_eq!(result.failures[0].name, "type_check");
        assert_eq!(result.failures[0].location.as_deref(), Some("src/main.ts:4:2"));
        assert!(!dir.path().join("tested").exists());
    }
}
