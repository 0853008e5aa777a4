use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use super::open_runner;

pub fn reset_progress(path: Option<&Path>, exercise: Option<&str>, force: bool) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;

    let target = match exercise {
        Some(query) => runner.find_or_err(query)?.name.clone(),
        None => "all exercises".to_string(),
    };
    if !force && !confirm(&format!("Reset progress for {target}?"))? {
        println!("Aborted.");
        return Ok(ExitCode::FAILURE);
    }

    runner.reset_progress(exercise)?;
    println!("Reset progress for {target}.");
    Ok(ExitCode::SUCCESS)
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
