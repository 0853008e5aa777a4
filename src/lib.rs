//! Grades programming exercises: discovers them on disk, picks the test
//! toolchain for each, runs it, and tracks progress in SQLite.

pub mod catalog;
pub mod detect;
pub mod error;
pub mod lang;
pub mod models;
pub mod process;
pub mod progress;
pub mod runner;
pub mod watch;

pub use error::{Error, Result};
pub use runner::Runner;
