use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use gradeloop::models::config::{COURSE_FILE, EXERCISE_FILE};
use gradeloop::models::Toolchain;

use super::start_dir;

const HELLO_EXERCISE: &str = r#"[exercise]
name = "Hello World"
order = 1
difficulty = "beginner"

[hints]
enabled = true
hints = [
    "Start by defining a simple function",
    "Return a string from the function",
]
"#;

const HELLO_PROBLEM: &str = r#"# Hello World

Welcome to your first exercise!

## Task

Create a function called `hello()` that returns the string `"Hello, World!"`.
"#;

const HELLO_PY: &str = r#"def hello():
    # Return "Hello, World!"
    pass
"#;

const HELLO_PY_TEST: &str = r#"from main import hello


def test_hello():
    assert hello() == "Hello, World!"
"#;

pub fn init_course(path: Option<&Path>, name: &str, language: Toolchain) -> anyhow::Result<ExitCode> {
    let course_dir = start_dir(path)?;
    let course_file = course_dir.join(COURSE_FILE);
    if course_file.exists() {
        eprintln!("{COURSE_FILE} already exists at {}", course_dir.display());
        return Ok(ExitCode::FAILURE);
    }

    let exercise_dir = course_dir.join("exercises").join("01_hello");
    fs::create_dir_all(exercise_dir.join("src"))
        .with_context(|| format!("failed to create {}", exercise_dir.display()))?;
    fs::create_dir_all(exercise_dir.join("tests"))?;

    fs::write(&course_file, course_toml(name, language))?;
    fs::write(exercise_dir.join(EXERCISE_FILE), HELLO_EXERCISE)?;
    fs::write(exercise_dir.join("problem.md"), HELLO_PROBLEM)?;
    if matches!(language, Toolchain::Python | Toolchain::PyTorch) {
        fs::write(exercise_dir.join("src").join("main.py"), HELLO_PY)?;
        fs::write(exercise_dir.join("tests").join("test_main.py"), HELLO_PY_TEST)?;
    }

    println!("Created new {} course at {}", language.display_name(), course_dir.display());
    println!("  - {COURSE_FILE}");
    println!("  - exercises/01_hello/");
    println!();
    println!("Exercises are graded with {}.", language.test_runner());
    println!("Run `gradeloop watch` to start!");
    Ok(ExitCode::SUCCESS)
}

fn course_toml(name: &str, language: Toolchain) -> String {
    format!(
        r#"[course]
name = {name:?}
version = "1.0.0"
language = "{language}"
exercises_path = "exercises"

[settings]
timeout_seconds = 30
show_hints = true
max_attempts_before_hint = 3
"#,
        language = language.as_str(),
    )
}
