use std::path::Path;
use std::process::ExitCode;

use super::open_runner;
use crate::display::display_diagnostics;

pub async fn doctor(path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;
    let course = runner.course();
    println!("Course: {} ({})", course.course.name, course.root.display());
    println!("Exercises: {}", runner.exercises().len());
    println!("Progress: {}\n", course.database_path().display());

    let diagnostics = runner.diagnostics().await;
    display_diagnostics(&diagnostics);

    let missing = diagnostics.iter().any(|d| !d.available);
    if missing {
        println!("\nInstall the missing toolchains to grade every exercise.");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
