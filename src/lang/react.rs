use std::time::Duration;

use super::{execute, node, Tally};
use crate::models::{Exercise, TestFailure, TestResult};

pub(super) fn default_command(exercise: &Exercise) -> String {
    let root = node::find_project_root(exercise);
    format!(
        "npx vitest run {} --reporter=verbose",
        node::tests_arg(exercise, &root)
    )
}

pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let root = node::find_project_root(exercise);
    if let Some(failed) = node::ensure_dependencies(exercise, &root, true).await {
        return failed;
    }
    execute(command, &root, &node::node_env(), timeout, parse).await
}

/// vitest parsing plus a readable failure when the suite never started
/// because a module or the component source couldn't be loaded.
fn parse(output: &str, success: bool) -> Tally {
    let mut tally = node::parse(output, success);
    if !success && tally.passed + tally.failed == 0 && tally.failures.is_empty() {
        if output.contains("Cannot find module") || output.contains("Failed to resolve import") {
            tally.failures.push(TestFailure::new(
                "module_resolution",
                "Cannot find module - check your imports",
            ));
        } else if output.contains("SyntaxError") {
            tally
                .failures
                .push(TestFailure::new("syntax_error", "Syntax error in code"));
        }
    }
    tally
}
