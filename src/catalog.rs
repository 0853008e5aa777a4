use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{Difficulty, Exercise, ExerciseMetadata};

/// Order given to path segments without any number; sorts after everything else.
pub const UNORDERED: u32 = 999;

/// Dependency and build caches that never contain exercises.
pub const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "target",
    "dist",
    "build",
];

const SOLUTION_FILES: &[&str] = &["solution.py", "solution.js", "solution.ts"];

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)").unwrap());
static EX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:exercise|ex)[-_]?(\d+)").unwrap());
static ANY_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static NUMERIC_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[_-]?").unwrap());

/// Scans `root` for exercises and returns them in course order.
///
/// A missing or unreadable root yields an empty list; callers treat that as
/// "no course found".
pub fn discover(root: &Path, default_timeout: Duration) -> Vec<Exercise> {
    if !root.is_dir() {
        debug!(root = %root.display(), "exercises root does not exist");
        return Vec::new();
    }

    let mut exercises = Vec::new();
    walk(root, root, default_timeout, &mut exercises);

    exercises.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.path.cmp(&b.path))
    });
    debug!(count = exercises.len(), root = %root.display(), "discovered exercises");
    exercises
}

fn walk(dir: &Path, root: &Path, default_timeout: Duration, out: &mut Vec<Exercise>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| !is_ignored_dir(path))
        .collect();
    dirs.sort_by_key(|path| {
        let name = file_name(path);
        (extract_order(&name), name)
    });

    for path in dirs {
        if is_exercise_dir(&path) {
            out.push(load_exercise(&path, root, default_timeout));
        } else {
            walk(&path, root, default_timeout, out);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_ignored_dir(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with('.') || name.starts_with('_') || SKIPPED_DIRS.contains(&name.as_str())
}

/// An exercise directory has `src/` or `tests/`, or (flat layout) test files
/// or a solution file directly inside it.
pub fn is_exercise_dir(path: &Path) -> bool {
    if path.join("src").is_dir() || path.join("tests").is_dir() {
        return true;
    }

    let Ok(entries) = fs::read_dir(path) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        entry.path().is_file() && (is_test_file(&name) || SOLUTION_FILES.contains(&name.as_str()))
    })
}

fn is_test_file(name: &str) -> bool {
    if name.ends_with(".py") {
        return name.starts_with("test_") || name.ends_with("_test.py");
    }
    let scripted = [".js", ".ts", ".jsx", ".tsx"]
        .iter()
        .any(|ext| name.ends_with(ext));
    scripted && (name.contains(".test.") || name.contains(".spec."))
}

/// Numeric position encoded in a directory name: `01_intro` -> 1,
/// `ex03_loops` -> 3, `unit-7-arrays` -> 7, `misc` -> [`UNORDERED`].
pub fn extract_order(name: &str) -> u32 {
    [&*LEADING_NUMBER, &*EX_PREFIX, &*ANY_NUMBER]
        .iter()
        .find_map(|re| re.captures(name))
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(UNORDERED)
}

pub fn hierarchical_order(exercise_dir: &Path, root: &Path) -> Vec<u32> {
    exercise_dir
        .strip_prefix(root)
        .unwrap_or(exercise_dir)
        .components()
        .map(|c| extract_order(&c.as_os_str().to_string_lossy()))
        .collect()
}

/// `01_hello_world` -> `Hello World`.
pub fn format_name(dir_name: &str) -> String {
    let stripped = NUMERIC_PREFIX.replace(dir_name, "");
    let words: Vec<String> = stripped
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        dir_name.to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn load_exercise(path: &Path, root: &Path, default_timeout: Duration) -> Exercise {
    let meta = ExerciseMetadata::load(path).unwrap_or_default();
    let section = meta.exercise;

    let mut order = hierarchical_order(path, root);
    if let (Some(explicit), Some(last)) = (section.order, order.last_mut()) {
        *last = explicit;
    }

    let name = section
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format_name(&file_name(path)));

    let problem_md = fs::read_to_string(path.join("problem.md")).unwrap_or_default();

    Exercise {
        path: path.to_path_buf(),
        name,
        order,
        difficulty: section
            .difficulty
            .as_deref()
            .map(Difficulty::from_tag)
            .unwrap_or_default(),
        test_command: section.test_command.filter(|c| !c.trim().is_empty()),
        install_command: section.install_command.filter(|c| !c.trim().is_empty()),
        typecheck_command: section.typecheck_command.filter(|c| !c.trim().is_empty()),
        timeout: section
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(default_timeout),
        hints: meta.hints.hints,
        hints_enabled: meta.hints.enabled,
        problem_md,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mkdir(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_extract_order() {
        assert_eq!(extract_order("01_variables"), 1);
        assert_eq!(extract_order("ex03_hello"), 3);
        assert_eq!(extract_order("exercise_12_intro"), 12);
        assert_eq!(extract_order("Exercise-4"), 4);
        assert_eq!(extract_order("unit_7_arrays"), 7);
        assert_eq!(extract_order("bonus"), UNORDERED);
    }

    #[test]
    fn test_format_name() {
        assert_eq!(format_name("01_hello_world"), "Hello World");
        assert_eq!(format_name("02-css-FUNDAMENTALS"), "Css Fundamentals");
        assert_eq!(format_name("tensor_basics"), "Tensor Basics");
        assert_eq!(format_name("007"), "007");
    }

    #[test]
    fn test_flat_layout_detection() {
        let dir = tempfile::tempdir().unwrap();
        let py = mkdir(dir.path(), "01_flat_py");
        fs::write(py.join("test_main.py"), "").unwrap();
        let js = mkdir(dir.path(), "02_flat_js");
        fs::write(js.join("sum.test.js"), "").unwrap();
        let sol = mkdir(dir.path(), "03_solution");
        fs::write(sol.join("solution.py"), "").unwrap();
        let group = mkdir(dir.path(), "04_group");
        fs::write(group.join("README.md"), "").unwrap();

        assert!(is_exercise_dir(&py));
        assert!(is_exercise_dir(&js));
        assert!(is_exercise_dir(&sol));
        assert!(!is_exercise_dir(&group));
    }

    #[test]
    fn test_skips_hidden_and_dependency_dirs() {
        let dir = tempfile::tempdir().unwrap();
        mkdir(dir.path(), "01_real/src");
        mkdir(dir.path(), ".git/src");
        mkdir(dir.path(), "_drafts/01_wip/src");
        mkdir(dir.path(), "node_modules/pkg/src");

        let found = discover(dir.path(), Duration::from_secs(30));
        let names: Vec<_> = found.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Real"]);
    }

    #[test]
    fn test_unordered_sorts_last() {
        let dir = tempfile::tempdir().unwrap();
        mkdir(dir.path(), "bonus/src");
        mkdir(dir.path(), "10_ten/src");
        mkdir(dir.path(), "2_two/src");

        let found = discover(dir.path(), Duration::from_secs(30));
        let orders: Vec<_> = found.iter().map(|e| e.order.clone()).collect();
        assert_eq!(orders, vec![vec![2], vec![10], vec![UNORDERED]]);
    }

    #[test]
    fn test_metadata_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let ex = mkdir(dir.path(), "03_custom/src");
        let ex = ex.parent().unwrap();
        fs::write(
            ex.join("exercise.toml"),
            r#"
[exercise]
name = "Custom Name"
order = 9
difficulty = "hard"
test_command = "make check"
timeout_seconds = 7

[hints]
enabled = false
hints = ["one"]
"#,
        )
        .unwrap();
        fs::write(ex.join("problem.md"), "# Do the thing").unwrap();

        let loaded = load_exercise(ex, dir.path(), Duration::from_secs(30));
        assert_eq!(loaded.name, "Custom Name");
        assert_eq!(loaded.order, vec![9]);
        assert_eq!(loaded.difficulty, Difficulty::Hard);
        assert_eq!(loaded.test_command.as_deref(), Some("make check"));
        assert_eq!(loaded.timeout, Duration::from_secs(7));
        assert!(!loaded.hints_enabled);
        assert_eq!(loaded.problem_md, "# Do the thing");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("nope"), Duration::from_secs(30)).is_empty());
    }
}
