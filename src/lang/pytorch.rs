use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::{execute, python};
use crate::models::{Exercise, TestResult};
use crate::process;

/// Model code imports slowly; never grade with less than this.
pub(super) const MIN_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn run_tests(exercise: &Exercise, command: &str, timeout: Duration) -> TestResult {
    let mut env = python::python_env(exercise);
    if !cuda_available().await {
        env.push((OsString::from("CUDA_VISIBLE_DEVICES"), OsString::new()));
    }
    execute(command, &exercise.path, &env, effective_timeout(timeout), python::parse).await
}

pub(super) fn effective_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_TIMEOUT)
}

fn interpreter() -> Option<PathBuf> {
    which::which("python3").or_else(|_| which::which("python")).ok()
}

async fn probe(script: &str) -> Option<process::Collected> {
    let python = interpreter()?;
    process::run_program(python, &["-c", script], PROBE_TIMEOUT).await.ok()
}

async fn cuda_available() -> bool {
    let available = probe("import torch; print(torch.cuda.is_available())")
        .await
        .map(|run| run.output.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    debug!(available, "cuda probe");
    available
}

pub(super) async fn is_available() -> bool {
    probe("import torch")
        .await
        .map(|run| run.success())
        .unwrap_or(false)
}
