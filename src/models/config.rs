use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::toolchain::Toolchain;

pub const COURSE_FILE: &str = "course.toml";
pub const EXERCISE_FILE: &str = "exercise.toml";
pub const PROGRESS_DB: &str = "progress.db";
const ENV_PREFIX: &str = "GRADELOOP_";

/// Course-wide settings from `course.toml`, layered as
/// defaults < `~/.config/gradeloop/config.toml` < `course.toml` < `GRADELOOP_*` env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseConfig {
    #[serde(default)]
    pub course: CourseSection,
    #[serde(default)]
    pub settings: Settings,
    /// Directory holding `course.toml`; relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSection {
    pub name: String,
    pub version: String,
    /// Fallback when an exercise's toolchain can't be detected.
    pub language: Toolchain,
    pub exercises_path: PathBuf,
}

impl Default for CourseSection {
    fn default() -> Self {
        Self {
            name: "Unnamed Course".to_string(),
            version: "1.0.0".to_string(),
            language: Toolchain::Python,
            exercises_path: PathBuf::from("exercises"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub timeout_seconds: u64,
    pub show_hints: bool,
    pub max_attempts_before_hint: u32,
    pub debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            show_hints: true,
            max_attempts_before_hint: 3,
            debounce_ms: 500,
        }
    }
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            course: CourseSection::default(),
            settings: Settings::default(),
            root: PathBuf::from("."),
        }
    }
}

impl CourseConfig {
    /// Defaults only, rooted at `root`. No files or env are read.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn load(root: &Path) -> Result<Self, figment::Error> {
        let mut config: CourseConfig = Self::figment(root).extract()?;
        config.root = root.to_path_buf();
        debug!(root = %root.display(), course = %config.course.name, "loaded course config");
        Ok(config)
    }

    pub fn figment(root: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global) = global_config_path() {
            if global.exists() {
                figment = figment.merge(Toml::file(global));
            }
        }

        let local = root.join(COURSE_FILE);
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn exercises_root(&self) -> PathBuf {
        let path = &self.course.exercises_path;
        if path.is_absolute() {
            path.clone()
        } else {
            self.root.join(path)
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(PROGRESS_DB)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.settings.debounce_ms)
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gradeloop").join("config.toml"))
}

/// Walks up from `start` to the nearest directory that looks like a course:
/// one holding `course.toml`, or failing that an `exercises/` directory.
pub fn find_course_root(start: &Path) -> Option<PathBuf> {
    let home = dirs::home_dir();
    let mut fallback = None;

    for dir in start.ancestors() {
        if dir.join(COURSE_FILE).is_file() {
            return Some(dir.to_path_buf());
        }
        if fallback.is_none() && dir.join("exercises").is_dir() {
            fallback = Some(dir.to_path_buf());
        }
        if home.as_deref() == Some(dir) {
            break;
        }
    }
    fallback
}

/// Per-exercise metadata from `exercise.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseMetadata {
    #[serde(default)]
    pub exercise: ExerciseSection,
    #[serde(default)]
    pub hints: HintsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseSection {
    pub name: Option<String>,
    pub order: Option<u32>,
    pub difficulty: Option<String>,
    pub test_command: Option<String>,
    pub install_command: Option<String>,
    pub typecheck_command: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HintsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Default for HintsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            hints: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl ExerciseMetadata {
    /// Reads `exercise.toml` from `dir`. Missing or malformed metadata yields
    /// `None`; the exercise is still usable with derived defaults.
    pub fn load(dir: &Path) -> Option<Self> {
        let path = dir.join(EXERCISE_FILE);
        let content = fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed exercise metadata");
                None
            }
        }
    }
}
