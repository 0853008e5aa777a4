use std::path::{Path, PathBuf};
use std::time::Duration;

use super::difficulty::Difficulty;

/// One gradable unit of work, built fresh on every catalog scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    pub path: PathBuf,
    pub name: String,
    /// One number per directory level below the exercises root.
    pub order: Vec<u32>,
    pub difficulty: Difficulty,
    pub test_command: Option<String>,
    /// Replaces `npm install` for npm-based toolchains.
    pub install_command: Option<String>,
    /// Replaces `npx tsc --noEmit` for TypeScript.
    pub typecheck_command: Option<String>,
    pub timeout: Duration,
    pub hints: Vec<String>,
    pub hints_enabled: bool,
    pub problem_md: String,
}

impl Exercise {
    pub fn new(path: PathBuf, name: impl Into<String>, order: Vec<u32>) -> Self {
        Self {
            path,
            name: name.into(),
            order,
            difficulty: Difficulty::default(),
            test_command: None,
            install_command: None,
            typecheck_command: None,
            timeout: Duration::from_secs(30),
            hints: Vec::new(),
            hints_enabled: true,
            problem_md: String::new(),
        }
    }

    /// Dotted order for display and lookup, e.g. `2.1`.
    pub fn order_str(&self) -> String {
        self.order
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn dir_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn src_path(&self) -> PathBuf {
        self.path.join("src")
    }

    pub fn tests_path(&self) -> PathBuf {
        self.path.join("tests")
    }

    /// Where the learner edits code: `src/` when present, otherwise the
    /// exercise root (flat layout).
    pub fn source_dir(&self) -> PathBuf {
        let src = self.src_path();
        if src.is_dir() {
            src
        } else {
            self.path.clone()
        }
    }

    pub fn is_at(&self, path: &Path) -> bool {
        self.path == path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_str() {
        let ex = Exercise::new(PathBuf::from("/course/02_advanced/01_first"), "First", vec![2, 1]);
        assert_eq!(ex.order_str(), "2.1");
        assert_eq!(ex.dir_name(), "01_first");
    }

    #[test]
    fn test_source_dir_falls_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let ex = Exercise::new(dir.path().to_path_buf(), "Flat", vec![1]);
        assert_eq!(ex.source_dir(), dir.path());

        std::fs::create_dir(dir.path().join("src")).unwrap();
        assert_eq!(ex.source_dir(), dir.path().join("src"));
    }
}
