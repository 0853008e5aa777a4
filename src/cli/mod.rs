mod doctor;
mod init;
mod reset;
mod run;
mod skip;
mod status;
mod verify;
mod watch;

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gradeloop::models::config::find_course_root;
use gradeloop::models::{CourseConfig, Toolchain};
use gradeloop::{Error, Runner};

#[derive(Parser)]
#[command(name = "gradeloop")]
#[command(version, about = "Watch-and-grade runner for programming exercise courses", long_about = None)]
pub struct Cli {
    /// Course directory (default: nearest parent holding course.toml)
    #[arg(short, long, global = true)]
    pub path: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-run the current exercise whenever its files change
    Watch {
        /// Advance to the next exercise without waiting for Enter
        #[arg(short, long)]
        keep_going: bool,
        /// Print the full test output, not just the failures
        #[arg(long)]
        verbose_output: bool,
    },
    /// Run an exercise once, or re-check completed ones
    Run {
        /// Exercise name, directory name or order (e.g. 2.1)
        exercise: Option<String>,
        /// Re-run every exercise already passed
        #[arg(long)]
        recheck: bool,
        /// Keep going through pending exercises until one fails
        #[arg(short, long)]
        keep_going: bool,
        #[arg(long)]
        verbose_output: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show progress for every exercise
    #[command(alias = "list")]
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Reset progress for one exercise, or all of them
    Reset {
        exercise: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Skip the current exercise
    Skip,
    /// Run every exercise without recording progress (for course authors)
    Verify {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Check which test toolchains are installed
    Doctor,
    /// Scaffold a new course
    Init {
        #[arg(short, long, default_value = "My Course")]
        name: String,
        #[arg(short, long, value_enum, default_value_t = Toolchain::Python)]
        language: Toolchain,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let path = cli.path.as_deref();
    match cli.command {
        None => watch::watch(path, false, false).await,
        Some(Commands::Watch {
            keep_going,
            verbose_output,
        }) => watch::watch(path, keep_going, verbose_output).await,
        Some(Commands::Run {
            exercise,
            recheck,
            keep_going,
            verbose_output,
            json,
        }) => {
            let opts = run::RunOptions {
                recheck,
                keep_going,
                full_output: verbose_output,
                json,
            };
            run::run_exercises(path, exercise.as_deref(), opts).await
        }
        Some(Commands::Status { json }) => status::show_status(path, json),
        Some(Commands::Reset { exercise, force }) => reset::reset_progress(path, exercise.as_deref(), force),
        Some(Commands::Skip) => skip::skip_exercise(path),
        Some(Commands::Verify { all, json }) => verify::verify(path, all, json).await,
        Some(Commands::Doctor) => doctor::doctor(path).await,
        Some(Commands::Init { name, language }) => init::init_course(path, &name, language),
    }
}

fn start_dir(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(env::current_dir()?),
    }
}

pub(crate) fn load_course(path: Option<&Path>) -> anyhow::Result<CourseConfig> {
    let start = start_dir(path)?;
    let root = find_course_root(&start).ok_or(Error::CourseNotFound(start))?;
    Ok(CourseConfig::load(&root).map_err(Error::from)?)
}

pub(crate) fn open_runner(path: Option<&Path>) -> anyhow::Result<Runner> {
    Ok(Runner::open(load_course(path)?)?)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
