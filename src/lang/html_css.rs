use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::{count_before, execute, node, Tally};
use crate::models::{Exercise, TestFailure, TestResult};

static FAILED_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[✘×]\s+(?:\d+\s+)?(?:\[[^\]]+\]\s+›\s+)?(\S+:\d+:\d+)\s+›\s+(.+?)(?:\s+\(\d+(?:\.\d+)?m?s\))?\s*$").unwrap()
});

pub(super) fn default_command(exercise: &Exercise) -> String {
    let root = node::find_project_root(exercise);
    format!(
        "npx playwright test {} --reporter=list",
        node::tests_arg(exercise, &root)
    )
}

pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let root = node::find_project_root(exercise);
    if let Some(failed) = node::ensure_dependencies(exercise, &root, false).await {
        return failed;
    }
    execute(command, &root, &node::node_env(), timeout, parse).await
}

fn parse(output: &str, _success: bool) -> Tally {
    let failures = FAILED_SPEC
        .captures_iter(output)
        .map(|caps| TestFailure::new(caps[2].trim(), "Test failed").at(&caps[1]))
        .collect();

    Tally {
        passed: count_before(output, "passed").unwrap_or(0),
        failed: count_before(output, "failed").unwrap_or(0),
        failures,
    }
}
