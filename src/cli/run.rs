use std::path::Path;
use std::process::ExitCode;

use gradeloop::Runner;

use super::{open_runner, print_json};
use crate::display::{display_outcome, display_problem, display_rechecks};

pub struct RunOptions {
    pub recheck: bool,
    pub keep_going: bool,
    pub full_output: bool,
    pub json: bool,
}

pub async fn run_exercises(path: Option<&Path>, exercise: Option<&str>, opts: RunOptions) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;

    if opts.recheck {
        return recheck(&runner, &opts).await;
    }

    if let Some(query) = exercise {
        let exercise = runner.find_or_err(query)?;
        let outcome = runner.run(exercise).await?;
        let passed = outcome.result.passed;
        if opts.json {
            print_json(&outcome)?;
        } else {
            display_outcome(&outcome, opts.full_output);
        }
        return Ok(exit_for(passed));
    }

    run_sequentially(&runner, &opts).await
}

async fn recheck(runner: &Runner, opts: &RunOptions) -> anyhow::Result<ExitCode> {
    if !opts.json {
        println!("Re-checking previously passed exercises...\n");
    }
    let rechecks = runner.recheck_completed().await?;
    if opts.json {
        print_json(&rechecks)?;
    } else {
        display_rechecks(&rechecks);
    }

    let regressed = rechecks.iter().filter(|r| r.regressed).count();
    if regressed > 0 {
        if !opts.json {
            println!("\n{regressed} exercise(s) have regressed.");
        }
        return Ok(ExitCode::FAILURE);
    }
    if !opts.json {
        println!("\nAll {} exercise(s) still pass!", rechecks.len());
    }

    if opts.keep_going {
        return run_sequentially(runner, opts).await;
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs the current exercise; with `keep_going`, continues through the
/// pending ones until one fails.
async fn run_sequentially(runner: &Runner, opts: &RunOptions) -> anyhow::Result<ExitCode> {
    let mut outcomes = Vec::new();
    let mut code = ExitCode::SUCCESS;

    while let Some(current) = runner.current_exercise()? {
        if !opts.json {
            display_problem(current, runner.toolchain_for(current));
        }
        let outcome = runner.run(current).await?;
        let passed = outcome.result.passed;
        if !opts.json {
            display_outcome(&outcome, opts.full_output);
        }
        outcomes.push(outcome);

        if !passed {
            if !opts.json {
                println!("\nFix the failing tests to continue.");
            }
            code = ExitCode::FAILURE;
            break;
        }
        if !opts.keep_going {
            break;
        }
    }

    if opts.json {
        print_json(&outcomes)?;
    } else if runner.current_exercise()?.is_none() {
        println!("\nAll exercises completed!");
    }
    Ok(code)
}

fn exit_for(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
