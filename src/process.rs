use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    pub status: ExitStatus,
    /// Stdout followed by stderr, lossily decoded, color codes removed.
    pub output: String,
    pub elapsed: Duration,
}

impl Collected {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("`{command}` timed out after {}s", .limit.as_secs())]
    TimedOut {
        command: String,
        limit: Duration,
        elapsed: Duration,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
        elapsed: Duration,
    },
}

impl ProcessError {
    pub fn elapsed(&self) -> Duration {
        match self {
            ProcessError::TimedOut { elapsed, .. } | ProcessError::Spawn { elapsed, .. } => *elapsed,
        }
    }
}

/// Runs `command` through the platform shell in `cwd`, with `env` layered on
/// top of the inherited environment. If `limit` expires the shell and every
/// process it started are killed.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    env: &[(OsString, OsString)],
    limit: Duration,
) -> Result<Collected, ProcessError> {
    let mut cmd = shell(command);
    cmd.current_dir(cwd);
    for (key, value) in env {
        cmd.env(key, value);
    }
    debug!(command, cwd = %cwd.display(), timeout_s = limit.as_secs(), "spawning shell command");
    collect(cmd, command.to_string(), limit).await
}

/// Runs a program directly, without a shell. Used for cheap toolchain probes.
pub async fn run_program(
    program: impl AsRef<OsStr>,
    args: &[&str],
    limit: Duration,
) -> Result<Collected, ProcessError> {
    let label = format!("{} {}", program.as_ref().to_string_lossy(), args.join(" "));
    let mut cmd = StdCommand::new(program);
    cmd.args(args);
    collect(cmd, label, limit).await
}

/// Kills the child's whole process group when dropped, unless disarmed.
/// Covers timeouts and a caller abandoning the run mid-way.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            kill_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

async fn collect(
    mut std_cmd: StdCommand,
    label: String,
    limit: Duration,
) -> Result<Collected, ProcessError> {
    std_cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own group, so everything the command forks can be killed together.
    #[cfg(unix)]
    std_cmd.process_group(0);
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    let started = Instant::now();
    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: label.clone(),
        source,
        elapsed: started.elapsed(),
    })?;
    let guard = GroupGuard(child.id());

    let outcome = timeout(limit, child.wait_with_output()).await;
    match outcome {
        Ok(Ok(output)) => {
            guard.disarm();
            Ok(Collected {
                status: output.status,
                output: merge_output(&output.stdout, &output.stderr),
                elapsed: started.elapsed(),
            })
        }
        Ok(Err(source)) => Err(ProcessError::Spawn {
            command: label,
            source,
            elapsed: started.elapsed(),
        }),
        Err(_) => {
            drop(guard);
            warn!(command = %label, timeout_s = limit.as_secs(), "subprocess timed out, killed");
            Err(ProcessError::TimedOut {
                command: label,
                limit,
                elapsed: started.elapsed(),
            })
        }
    }
}

#[cfg(windows)]
fn shell(command: &str) -> StdCommand {
    let mut cmd = StdCommand::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> StdCommand {
    let mut cmd = StdCommand::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut merged = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.is_empty() {
        if !merged.is_empty() && !merged.ends_with('\n') {
            merged.push('\n');
        }
        merged.push_str(&stderr);
    }
    ANSI_ESCAPE.replace_all(&merged, "").into_owned()
}

/// Quotes a path for interpolation into a shell command line.
pub fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let plain = raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-:\\".contains(c));
    if plain {
        raw.into_owned()
    } else if cfg!(windows) {
        format!("\"{raw}\"")
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}
