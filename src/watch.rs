use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Exercise;
use crate::runner::{RunOutcome, Runner};

const RELEVANT_EXTENSIONS: &[&str] = &["py", "js", "ts", "tsx", "jsx", "html", "css", "json"];

/// What the loop did, in order. The caller decides how to show it.
#[derive(Debug)]
pub enum WatchEvent {
    Watching { exercise: Exercise, path: PathBuf },
    Changed { files: Vec<PathBuf> },
    Ran(RunOutcome),
    AwaitingConfirmation { next: Exercise },
    Advanced { exercise: Exercise },
    CourseComplete,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatchLoop {
    pub debounce: Duration,
    /// Move on to the next exercise without waiting for Enter.
    pub keep_going: bool,
}

type EventRx = UnboundedReceiver<notify::Result<Event>>;

impl WatchLoop {
    pub fn new(debounce: Duration, keep_going: bool) -> Self {
        Self {
            debounce,
            keep_going,
        }
    }

    /// Watches the current exercise and re-grades it on every relevant batch
    /// of file changes until the course is complete or `shutdown` resolves.
    ///
    /// `shutdown` is only checked while waiting for changes or for Enter, so
    /// a test run in progress always finishes and gets recorded.
    pub async fn run<S, F>(&self, runner: &Runner, shutdown: S, mut emit: F) -> Result<()>
    where
        S: Future<Output = ()>,
        F: FnMut(WatchEvent),
    {
        tokio::pin!(shutdown);

        let Some(mut current) = runner.current_exercise()?.cloned() else {
            emit(WatchEvent::CourseComplete);
            return Ok(());
        };

        loop {
            let path = watch_target(&current);
            let (watcher, mut rx) = subscribe(&path)?;
            let roots = watch_roots(&path);
            info!(exercise = %current.name, path = %path.display(), "watching");
            emit(WatchEvent::Watching {
                exercise: current.clone(),
                path,
            });

            let next = loop {
                let batch = tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        emit(WatchEvent::Stopped);
                        return Ok(());
                    }
                    batch = next_batch(&mut rx, self.debounce) => batch,
                };
                let Some(files) = batch else {
                    warn!("file watcher closed");
                    emit(WatchEvent::Stopped);
                    return Ok(());
                };
                let files: Vec<PathBuf> = files
                    .into_iter()
                    .filter(|p| is_relevant(relative_to(p, &roots)))
                    .collect();
                if files.is_empty() {
                    continue;
                }

                emit(WatchEvent::Changed { files });
                let outcome = runner.run(&current).await?;
                let passed = outcome.result.passed;
                emit(WatchEvent::Ran(outcome));
                if !passed {
                    continue;
                }

                match runner.current_exercise()?.cloned() {
                    None => {
                        emit(WatchEvent::CourseComplete);
                        return Ok(());
                    }
                    Some(next) if !next.is_at(&current.path) => break next,
                    Some(_) => continue,
                }
            };
            drop(watcher);

            if !self.keep_going {
                emit(WatchEvent::AwaitingConfirmation { next: next.clone() });
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        emit(WatchEvent::Stopped);
                        return Ok(());
                    }
                    _ = wait_for_enter() => {}
                }
            }

            emit(WatchEvent::Advanced {
                exercise: next.clone(),
            });
            current = next;
        }
    }
}

/// `src/` when the exercise has one, otherwise the exercise root.
pub fn watch_target(exercise: &Exercise) -> PathBuf {
    exercise.source_dir()
}

/// The watched directory as given and as the OS reports it, since event
/// paths may come back canonicalized.
fn watch_roots(path: &Path) -> Vec<PathBuf> {
    let mut roots = vec![path.to_path_buf()];
    if let Ok(canonical) = path.canonicalize() {
        if canonical != path {
            roots.push(canonical);
        }
    }
    roots
}

/// `path` below whichever root contains it; unchanged if none does.
fn relative_to<'a>(path: &'a Path, roots: &[PathBuf]) -> &'a Path {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
}

fn subscribe(path: &Path) -> Result<(RecommendedWatcher, EventRx)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        // The receiver is gone once the loop moves on; late events are moot.
        let _ = tx.send(event);
    })?;
    watcher.watch(path, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Waits for one content change, then gathers everything else that arrives
/// within `window` of it. `None` once the channel is closed.
pub(crate) async fn next_batch(rx: &mut EventRx, window: Duration) -> Option<Vec<PathBuf>> {
    let mut paths = Vec::new();
    while paths.is_empty() {
        absorb(rx.recv().await?, &mut paths);
    }

    let deadline = Instant::now() + window;
    while let Ok(Some(event)) = timeout_at(deadline, rx.recv()).await {
        absorb(event, &mut paths);
    }

    paths.sort();
    paths.dedup();
    debug!(count = paths.len(), "change batch");
    Some(paths)
}

fn absorb(event: notify::Result<Event>, paths: &mut Vec<PathBuf>) {
    match event {
        Ok(event) => {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                paths.extend(event.paths);
            }
        }
        Err(e) => warn!(error = %e, "file watcher error"),
    }
}

/// Source files worth a re-run: known extensions, nothing hidden anywhere in
/// the path, not caches or installed dependencies. Expects a path relative
/// to the watched directory so a hidden parent of the course is ignored.
pub fn is_relevant(path: &Path) -> bool {
    if path.file_name().is_none() {
        return false;
    }
    let skipped = path.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part.starts_with('.') || part == "__pycache__" || part == "node_modules"
        }
        _ => false,
    });
    if skipped {
        return false;
    }
    path.extension()
        .map(|ext| RELEVANT_EXTENSIONS.iter().any(|r| ext == *r))
        .unwrap_or(false)
}

/// Blocks until a line (or EOF) arrives on stdin.
async fn wait_for_enter() {
    let mut line = String::new();
    if let Err(e) = BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
        debug!(error = %e, "stdin unavailable, continuing");
    }
}
