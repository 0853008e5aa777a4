use std::path::PathBuf;

use thiserror::Error;

use crate::models::config::COURSE_FILE;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("No course found: no {COURSE_FILE} or exercises/ directory above {}", .0.display())]
    CourseNotFound(PathBuf),

    #[error("Exercises path not found: {}", .0.display())]
    ExercisesPathMissing(PathBuf),

    #[error("No exercises found in {}", .0.display())]
    NoExercises(PathBuf),

    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),

    #[error("All exercises are complete")]
    CourseComplete,

    #[error("Progress store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
