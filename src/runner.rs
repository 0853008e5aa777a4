use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::detect;
use crate::error::{Error, Result};
use crate::lang::Adapter;
use crate::models::{CourseConfig, Difficulty, Exercise, TestResult, Toolchain};
use crate::progress::{ExerciseStatus, ProgressStore};

/// A hint disclosed by a failing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealedHint {
    pub index: u32,
    pub text: String,
    /// Hints still undisclosed after this one.
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub exercise: String,
    pub toolchain: Toolchain,
    pub result: TestResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<RevealedHint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recheck {
    pub exercise: String,
    pub result: TestResult,
    /// Stored as passed but failing now. Informational only.
    pub regressed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub exercise: String,
    pub toolchain: Toolchain,
    pub result: TestResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub order: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub status: ExerciseStatus,
    pub attempts: u32,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub toolchain: Toolchain,
    pub adapter: &'static str,
    pub available: bool,
    pub exercises: usize,
}

/// Ties the catalog, detector, adapters and progress store together for one
/// course. Everything runs sequentially: one exercise, one subprocess.
pub struct Runner {
    course: CourseConfig,
    exercises: Vec<Exercise>,
    store: ProgressStore,
}

impl Runner {
    /// Scans the course, opens `progress.db` and registers every exercise.
    pub fn open(course: CourseConfig) -> Result<Self> {
        let root = course.exercises_root();
        if !root.is_dir() {
            return Err(Error::ExercisesPathMissing(root));
        }

        let exercises = catalog::discover(&root, course.default_timeout());
        if exercises.is_empty() {
            return Err(Error::NoExercises(root));
        }

        let store = ProgressStore::open(&course.database_path())?;
        Self::new(course, exercises, store)
    }

    pub fn new(course: CourseConfig, exercises: Vec<Exercise>, store: ProgressStore) -> Result<Self> {
        for exercise in &exercises {
            store.ensure(exercise)?;
        }
        debug!(count = exercises.len(), "runner ready");
        Ok(Self {
            course,
            exercises,
            store,
        })
    }

    pub fn course(&self) -> &CourseConfig {
        &self.course
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// First pending exercise in course order; `None` once the course is done.
    pub fn current_exercise(&self) -> Result<Option<&Exercise>> {
        for exercise in &self.exercises {
            if self.store.status(exercise)? == ExerciseStatus::Pending {
                return Ok(Some(exercise));
            }
        }
        Ok(None)
    }

    /// Lookup by display name, directory name or dotted order (`2.1`).
    pub fn find(&self, query: &str) -> Option<&Exercise> {
        let query = query.trim();
        self.exercises.iter().find(|ex| {
            ex.name == query || ex.dir_name() == query || ex.order_str() == query
        })
    }

    pub fn find_or_err(&self, query: &str) -> Result<&Exercise> {
        self.find(query)
            .ok_or_else(|| Error::ExerciseNotFound(query.to_string()))
    }

    pub fn toolchain_for(&self, exercise: &Exercise) -> Toolchain {
        detect::classify(exercise, self.course.course.language)
    }

    async fn execute(&self, exercise: &Exercise) -> (Toolchain, TestResult) {
        let toolchain = self.toolchain_for(exercise);
        let adapter = Adapter::for_toolchain(toolchain);
        info!(exercise = %exercise.name, adapter = adapter.name(), "running tests");
        let result = adapter.run_tests(exercise, exercise.timeout).await;
        info!(
            exercise = %exercise.name,
            passed = result.passed,
            tests_run = result.tests_run,
            tests_passed = result.tests_passed,
            duration_ms = result.duration_ms(),
            "tests finished"
        );
        (toolchain, result)
    }

    /// Grades `exercise`, records the attempt and, for a failing run past the
    /// course's attempt threshold, discloses the next hint.
    pub async fn run(&self, exercise: &Exercise) -> Result<RunOutcome> {
        let (toolchain, result) = self.execute(exercise).await;
        self.store.record_attempt(exercise, &result)?;

        let hint = if result.passed {
            None
        } else {
            self.maybe_reveal_hint(exercise)?
        };

        Ok(RunOutcome {
            exercise: exercise.name.clone(),
            toolchain,
            result,
            hint,
        })
    }

    fn maybe_reveal_hint(&self, exercise: &Exercise) -> Result<Option<RevealedHint>> {
        if !self.course.settings.show_hints || !exercise.hints_enabled || exercise.hints.is_empty() {
            return Ok(None);
        }
        if self.store.attempts(exercise)? <= self.course.settings.max_attempts_before_hint {
            return Ok(None);
        }

        let shown = self.store.hints_shown_count(exercise)?;
        let Some(text) = exercise.hints.get(shown as usize) else {
            return Ok(None);
        };
        self.store.record_hint_shown(exercise, shown)?;
        info!(exercise = %exercise.name, index = shown, "revealed hint");

        Ok(Some(RevealedHint {
            index: shown,
            text: text.clone(),
            remaining: exercise.hints.len() - shown as usize - 1,
        }))
    }

    /// Re-runs every passed exercise. Attempts are counted but a failure
    /// leaves the stored status alone; it is only reported as a regression.
    pub async fn recheck_completed(&self) -> Result<Vec<Recheck>> {
        let mut rechecks = Vec::new();
        for exercise in &self.exercises {
            if self.store.status(exercise)? != ExerciseStatus::Passed {
                continue;
            }
            let (_, result) = self.execute(exercise).await;
            self.store.record_attempt(exercise, &result)?;
            let regressed = !result.passed;
            if regressed {
                warn!(exercise = %exercise.name, "previously passed exercise now fails");
            }
            rechecks.push(Recheck {
                exercise: exercise.name.clone(),
                result,
                regressed,
            });
        }
        Ok(rechecks)
    }

    /// Skips the current exercise and returns the one after it.
    pub fn skip_current(&self) -> Result<Option<&Exercise>> {
        let current = self.current_exercise()?.ok_or(Error::CourseComplete)?;
        self.store.mark_skipped(current)?;
        self.current_exercise()
    }

    /// Resets one exercise (by any name [`Runner::find`] accepts) or, with
    /// `None`, the whole course.
    pub fn reset_progress(&self, query: Option<&str>) -> Result<()> {
        match query {
            Some(query) => {
                let exercise = self.find_or_err(query)?;
                self.store.reset(Some(exercise))
            }
            None => {
                self.store.reset(None)?;
                for exercise in &self.exercises {
                    self.store.ensure(exercise)?;
                }
                Ok(())
            }
        }
    }

    /// Runs every exercise regardless of progress, recording nothing. Meant
    /// for course authors checking reference solutions.
    pub async fn verify_all(&self) -> Vec<Verification> {
        let mut verifications = Vec::with_capacity(self.exercises.len());
        for exercise in &self.exercises {
            let (toolchain, result) = self.execute(exercise).await;
            verifications.push(Verification {
                exercise: exercise.name.clone(),
                toolchain,
                result,
            });
        }
        verifications
    }

    pub fn status_rows(&self) -> Result<Vec<StatusRow>> {
        let current = self.current_exercise()?.map(|ex| ex.path.clone());
        self.exercises
            .iter()
            .map(|ex| {
                Ok(StatusRow {
                    order: ex.order_str(),
                    name: ex.name.clone(),
                    difficulty: ex.difficulty,
                    status: self.store.status(ex)?,
                    attempts: self.store.attempts(ex)?,
                    current: current.as_deref().is_some_and(|p| ex.is_at(p)),
                })
            })
            .collect()
    }

    /// Toolchain availability for every toolchain the course uses.
    pub async fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut in_use: BTreeMap<Toolchain, usize> = BTreeMap::new();
        for exercise in &self.exercises {
            *in_use.entry(self.toolchain_for(exercise)).or_default() += 1;
        }

        let mut diagnostics = Vec::with_capacity(in_use.len());
        for (toolchain, exercises) in in_use {
            let adapter = Adapter::for_toolchain(toolchain);
            diagnostics.push(Diagnostic {
                toolchain,
                adapter: adapter.name(),
                available: adapter.is_available().await,
                exercises,
            });
        }
        diagnostics
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn write_exercise(root: &Path, rel: &str, command: &str, hints: &[&str]) {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join("src")).unwrap();
        let hints = hints
            .iter()
            .map(|h| format!("{h:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        fs::write(
            dir.join("exercise.toml"),
            format!("[exercise]\ntest_command = {command:?}\n\n[hints]\nhints = [{hints}]\n"),
        )
        .unwrap();
    }

    fn runner_for(root: &Path) -> Runner {
        let course = CourseConfig::for_root(root);
        let exercises = catalog::discover(&course.exercises_root(), Duration::from_secs(10));
        Runner::new(course, exercises, ProgressStore::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_find_by_name_dir_or_order() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_intro", "true", &[]);
        write_exercise(&dir.path().join("exercises"), "02_unit/01_first", "true", &[]);
        let runner = runner_for(dir.path());

        assert_eq!(runner.find("Intro").unwrap().dir_name(), "01_intro");
        assert_eq!(runner.find("01_first").unwrap().name, "First");
        assert_eq!(runner.find("2.1").unwrap().name, "First");
        assert!(runner.find("nope").is_none());
        assert!(matches!(runner.reset_progress(Some("nope")), Err(Error::ExerciseNotFound(_))));
    }

    #[tokio::test]
    async fn test_passing_run_advances_current() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_a", "true", &[]);
        write_exercise(&dir.path().join("exercises"), "02_b", "exit 1", &[]);
        let runner = runner_for(dir.path());

        let first = runner.current_exercise().unwrap().unwrap().clone();
        let outcome = runner.run(&first).await.unwrap();
        assert!(outcome.result.passed);
        assert_eq!(runner.current_exercise().unwrap().unwrap().name, "B");
    }

    #[tokio::test]
    async fn test_hints_disabled_by_course_setting() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_a", "exit 1", &["look closer"]);
        let mut runner = runner_for(dir.path());
        runner.course.settings.show_hints = false;
        runner.course.settings.max_attempts_before_hint = 0;

        let ex = runner.exercises()[0].clone();
        let outcome = runner.run(&ex).await.unwrap();
        assert!(outcome.hint.is_none());
    }

    #[tokio::test]
    async fn test_verify_all_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_a", "true", &[]);
        write_exercise(&dir.path().join("exercises"), "02_b", "exit 3", &[]);
        let runner = runner_for(dir.path());

        let verifications = runner.verify_all().await;
        let passed: Vec<_> = verifications.iter().map(|v| v.result.passed).collect();
        assert_eq!(passed, vec![true, false]);
        for ex in runner.exercises() {
            assert_eq!(runner.store().attempts(ex).unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_skip_when_complete() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_a", "true", &[]);
        let runner = runner_for(dir.path());

        assert!(runner.skip_current().unwrap().is_none());
        assert!(matches!(runner.skip_current(), Err(Error::CourseComplete)));
    }

    #[tokio::test]
    async fn test_status_rows_mark_current() {
        let dir = tempfile::tempdir().unwrap();
        write_exercise(&dir.path().join("exercises"), "01_a", "true", &[]);
        write_exercise(&dir.path().join("exercises"), "02_b", "true", &[]);
        let runner = runner_for(dir.path());
        let first = runner.exercises()[0].clone();
        runner.run(&first).await.unwrap();

        let rows = runner.status_rows().unwrap();
        assert_eq!(rows[0].status, ExerciseStatus::Passed);
        assert_eq!(rows[0].attempts, 1);
        assert!(!rows[0].current);
        assert!(rows[1].current);
    }

    #[test]
    fn test_open_without_exercises() {
        let dir = tempfile::tempdir().unwrap();
        let course = CourseConfig::for_root(dir.path());
        assert!(matches!(Runner::open(course), Err(Error::ExercisesPathMissing(_))));

        fs::create_dir(dir.path().join("exercises")).unwrap();
        let course = CourseConfig::for_root(dir.path());
        assert!(matches!(Runner::open(course), Err(Error::NoExercises(_))));
    }
}
