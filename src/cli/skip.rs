use std::path::Path;
use std::process::ExitCode;

use super::open_runner;
use crate::display::display_problem;

pub fn skip_exercise(path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;
    if let Some(skipped) = runner.current_exercise()? {
        println!("Skipped: {}", skipped.name);
    }

    match runner.skip_current()? {
        Some(next) => {
            println!("Next exercise: {}", next.name);
            display_problem(next, runner.toolchain_for(next));
        }
        None => println!("All exercises completed!"),
    }
    Ok(ExitCode::SUCCESS)
}
