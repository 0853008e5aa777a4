use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The external test toolchain an exercise is graded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toolchain {
    #[default]
    Python,
    #[value(name = "pytorch")]
    #[serde(rename = "pytorch")]
    PyTorch,
    #[value(name = "javascript")]
    #[serde(rename = "javascript")]
    JavaScript,
    #[value(name = "typescript")]
    #[serde(rename = "typescript")]
    TypeScript,
    React,
    #[value(name = "html_css")]
    HtmlCss,
}

impl Toolchain {
    pub const ALL: [Toolchain; 6] = [
        Toolchain::Python,
        Toolchain::PyTorch,
        Toolchain::JavaScript,
        Toolchain::TypeScript,
        Toolchain::React,
        Toolchain::HtmlCss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Toolchain::Python => "python",
            Toolchain::PyTorch => "pytorch",
            Toolchain::JavaScript => "javascript",
            Toolchain::TypeScript => "typescript",
            Toolchain::React => "react",
            Toolchain::HtmlCss => "html_css",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Toolchain::Python => "Python",
            Toolchain::PyTorch => "PyTorch",
            Toolchain::JavaScript => "JavaScript",
            Toolchain::TypeScript => "TypeScript",
            Toolchain::React => "React",
            Toolchain::HtmlCss => "HTML/CSS",
        }
    }

    /// Test runner a freshly scaffolded course declares for this toolchain.
    pub fn test_runner(&self) -> &'static str {
        match self {
            Toolchain::Python | Toolchain::PyTorch => "pytest",
            Toolchain::JavaScript | Toolchain::TypeScript | Toolchain::React => "vitest",
            Toolchain::HtmlCss => "playwright",
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(
            self,
            Toolchain::JavaScript | Toolchain::TypeScript | Toolchain::React | Toolchain::HtmlCss
        )
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
