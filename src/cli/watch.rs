use std::path::Path;
use std::process::ExitCode;

use gradeloop::watch::{WatchEvent, WatchLoop};

use super::open_runner;
use crate::display::{display_outcome, display_problem};

pub async fn watch(path: Option<&Path>, keep_going: bool, full_output: bool) -> anyhow::Result<ExitCode> {
    let runner = open_runner(path)?;
    let watch_loop = WatchLoop::new(runner.course().debounce(), keep_going);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    watch_loop
        .run(&runner, shutdown, |event| match event {
            WatchEvent::Watching { exercise, path } => {
                display_problem(&exercise, runner.toolchain_for(&exercise));
                println!("Watching {} for changes...", path.display());
                println!("Press Ctrl+C to stop.\n");
            }
            WatchEvent::Changed { files } => {
                let names: Vec<_> = files
                    .iter()
                    .filter_map(|f| f.file_name())
                    .map(|n| n.to_string_lossy())
                    .collect();
                println!("\nFiles changed: {}", names.join(", "));
            }
            WatchEvent::Ran(outcome) => display_outcome(&outcome, full_output),
            WatchEvent::AwaitingConfirmation { next } => {
                println!("\nNext up: {}. Press Enter to continue...", next.name);
            }
            WatchEvent::Advanced { exercise } => println!("\nMoving on to {}", exercise.name),
            WatchEvent::CourseComplete => println!("\nAll exercises completed!"),
            WatchEvent::Stopped => println!("\nWatch mode stopped."),
        })
        .await?;

    Ok(ExitCode::SUCCESS)
}
