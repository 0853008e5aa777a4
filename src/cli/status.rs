use std::path::Path;
use std::process::ExitCode;

use super::{open_runner, print_json};
use crate::display::display_status;

pub fn show_status(path: Option<&Path>, json: bool) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;
    let rows = runner.status_rows()?;
    if json {
        print_json(&rows)?;
    } else {
        display_status(&runner.course().course.name, &rows);
    }
    Ok(ExitCode::SUCCESS)
}
