use std::time::Duration;

use super::{execute, node};
use crate::models::{Exercise, TestResult};

pub(super) fn default_command(exercise: &Exercise) -> String {
    let root = node::find_project_root(exercise);
    if node::has_vitest(&root) {
        format!(
            "npx vitest run {} --reporter=verbose",
            node::tests_arg(exercise, &root)
        )
    } else {
        "npx jest --verbose".to_string()
    }
}

pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let root = node::find_project_root(exercise);
    if let Some(failed) = node::ensure_dependencies(exercise, &root, false).await {
        return failed;
    }
    execute(command, &root, &node::node_env(), timeout, node::parse).await
}
