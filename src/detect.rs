use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::is_ignored_dir;
use crate::models::{Exercise, Toolchain};

const REACT_MARKERS: &[&str] = &["from 'react'", "from \"react\"", "import React"];
const TORCH_MARKERS: &[&str] = &["import torch", "from torch"];

/// Best-effort guess at which toolchain grades `exercise`.
///
/// A custom test command is trusted first, then the source tree is
/// inspected, then the course default applies. Misclassification is fixed
/// by configuration, so this never fails.
pub fn classify(exercise: &Exercise, default: Toolchain) -> Toolchain {
    let sources = SourceTree::scan(&exercise.source_dir());

    if let Some(command) = &exercise.test_command {
        if let Some(toolchain) = classify_command(command, &sources) {
            debug!(exercise = %exercise.name, %toolchain, "classified from test command");
            return toolchain;
        }
    }

    match classify_sources(&sources) {
        Some(toolchain) => {
            debug!(exercise = %exercise.name, %toolchain, "classified from source files");
            toolchain
        }
        None => {
            debug!(exercise = %exercise.name, toolchain = %default, "falling back to course language");
            default
        }
    }
}

fn classify_command(command: &str, sources: &SourceTree) -> Option<Toolchain> {
    let command = command.to_ascii_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| command.contains(w));

    if mentions(&["playwright"]) {
        Some(Toolchain::HtmlCss)
    } else if mentions(&["tsc"]) {
        Some(Toolchain::TypeScript)
    } else if mentions(&["pytest", "python"]) {
        Some(upgrade_python(sources))
    } else if mentions(&["vitest", "jest", "npm", "npx", "node"]) {
        if sources.has_react_import() {
            Some(Toolchain::React)
        } else if sources.has_any(&["ts", "tsx"]) {
            Some(Toolchain::TypeScript)
        } else {
            Some(Toolchain::JavaScript)
        }
    } else {
        None
    }
}

fn classify_sources(sources: &SourceTree) -> Option<Toolchain> {
    if sources.has("jsx") || (sources.has("tsx") && sources.has_react_import()) {
        Some(Toolchain::React)
    } else if sources.has_any(&["ts", "tsx"]) {
        Some(Toolchain::TypeScript)
    } else if sources.has("js") {
        if sources.has_react_import() {
            Some(Toolchain::React)
        } else {
            Some(Toolchain::JavaScript)
        }
    } else if sources.has_any(&["html", "css"]) {
        Some(Toolchain::HtmlCss)
    } else if sources.has("py") {
        Some(upgrade_python(sources))
    } else {
        None
    }
}

fn upgrade_python(sources: &SourceTree) -> Toolchain {
    if sources.contains_marker(&["py"], TORCH_MARKERS) {
        Toolchain::PyTorch
    } else {
        Toolchain::Python
    }
}

/// Files under an exercise's source directory, skipping dependency caches.
struct SourceTree {
    files: Vec<PathBuf>,
    extensions: BTreeSet<String>,
}

impl SourceTree {
    fn scan(dir: &Path) -> Self {
        let mut files = Vec::new();
        collect_files(dir, &mut files);
        let extensions = files
            .iter()
            .filter_map(|f| f.extension())
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .collect();
        Self { files, extensions }
    }

    fn has(&self, ext: &str) -> bool {
        self.extensions.contains(ext)
    }

    fn has_any(&self, exts: &[&str]) -> bool {
        exts.iter().any(|e| self.has(e))
    }

    fn has_react_import(&self) -> bool {
        self.contains_marker(&["js", "jsx", "ts", "tsx"], REACT_MARKERS)
    }

    fn contains_marker(&self, exts: &[&str], markers: &[&str]) -> bool {
        self.files
            .iter()
            .filter(|f| {
                f.extension()
                    .map(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
                    .unwrap_or(false)
            })
            .filter_map(|f| fs::read_to_string(f).ok())
            .any(|content| markers.iter().any(|m| content.contains(m)))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            if !is_ignored_dir(&path) {
                collect_files(&path, out);
            }
        } else {
            out.push(path);
        }
    }
}
