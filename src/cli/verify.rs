use std::path::Path;
use std::process::ExitCode;

use super::{open_runner, print_json};
use crate::display::display_verifications;

pub async fn verify(path: Option<&Path>, all: bool, json: bool) -> anyhow::Result<ExitCode> {
    if !all {
        println!("Use --all to verify all exercises.");
        return Ok(ExitCode::SUCCESS);
    }

    let runner = open_runner(path)?;
    if !json {
        println!("Verifying all exercises...\n");
    }
    let verifications = runner.verify_all().await;
    let failed = verifications.iter().filter(|v| !v.result.passed).count();

    if json {
        print_json(&verifications)?;
    } else {
        display_verifications(&verifications);
        if failed == 0 {
            println!("\nAll exercises verified!");
        } else {
            println!("\n{failed} exercise(s) failed verification.");
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
