use std::time::Duration;

use serde::{Deserialize, Serialize};

const MAX_MESSAGE_CHARS: usize = 500;

/// Why a failure was recorded. Everything other than `Test` is synthetic:
/// produced by the runner itself rather than parsed from a test report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Test,
    Timeout,
    Error,
    Install,
    TypeCheck,
    Setup,
}

impl FailureKind {
    pub fn synthetic_name(&self) -> &'static str {
        match self {
            FailureKind::Test => "test",
            FailureKind::Timeout => "timeout",
            FailureKind::Error => "error",
            FailureKind::Install => "dependency_install",
            FailureKind::TypeCheck => "type_check",
            FailureKind::Setup => "setup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub kind: FailureKind,
}

impl TestFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: clip(&message.into()),
            location: None,
            kind: FailureKind::Test,
        }
    }

    pub fn synthetic(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::new(kind.synthetic_name(), message)
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Normalized outcome of one adapter invocation.
///
/// The associated functions below keep `tests_passed <= tests_run` and give
/// every failed result at least one failure counted in `tests_run`. Values
/// read back from JSON are taken as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub failures: Vec<TestFailure>,
    pub output: String,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl TestResult {
    /// Builds a result from best-effort counts scraped out of a test report.
    pub fn from_counts(
        success: bool,
        passed: usize,
        failed: usize,
        mut failures: Vec<TestFailure>,
        output: String,
        duration: Duration,
    ) -> Self {
        let parsed_failures = failures
            .iter()
            .filter(|f| f.kind == FailureKind::Test)
            .count();
        let passed_flag = success && failed == 0;

        let mut tests_run = passed + failed;
        if !passed_flag {
            if failures.is_empty() {
                failures.push(TestFailure::new("test", fallback_message(&output)));
            }
            tests_run = tests_run.max(passed + parsed_failures.max(1));
        }

        Self {
            passed: passed_flag,
            tests_run,
            tests_passed: passed.min(tests_run),
            failures,
            output,
            duration,
        }
    }

    /// A run that stopped before any test could execute (install failure,
    /// type errors, missing manifest).
    pub fn short_circuit(
        kind: FailureKind,
        mut failures: Vec<TestFailure>,
        output: String,
        duration: Duration,
    ) -> Self {
        if failures.is_empty() {
            failures.push(TestFailure::synthetic(kind, fallback_message(&output)));
        }
        Self {
            passed: false,
            tests_run: 1,
            tests_passed: 0,
            failures,
            output,
            duration,
        }
    }

    pub fn timeout(limit: Duration, elapsed: Duration) -> Self {
        let message = format!("Tests timed out after {}s", limit.as_secs());
        Self::short_circuit(
            FailureKind::Timeout,
            vec![TestFailure::synthetic(FailureKind::Timeout, message.clone())],
            message,
            elapsed,
        )
    }

    pub fn error(message: impl Into<String>, elapsed: Duration) -> Self {
        let message = message.into();
        Self::short_circuit(
            FailureKind::Error,
            vec![TestFailure::synthetic(FailureKind::Error, message.clone())],
            message,
            elapsed,
        )
    }

    pub fn tests_failed(&self) -> usize {
        self.tests_run.saturating_sub(self.tests_passed)
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// First error-looking block of the output, used when a failing run yields
/// nothing the parser recognizes.
pub fn fallback_message(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.contains("Error") || l.contains("Exception") || l.contains("error:"));

    let block = match start {
        Some(start) => lines[start..]
            .iter()
            .take_while(|l| !l.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
        None => lines
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| "Tests failed without producing any output".to_string()),
    };
    clip(&block)
}

fn clip(message: &str) -> String {
    let trimmed = message.trim();
    match trimmed.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
