pub mod config;
pub mod difficulty;
pub mod exercise;
pub mod result;
pub mod toolchain;

pub use config::{CourseConfig, ExerciseMetadata, Settings};
pub use difficulty::Difficulty;
pub use exercise::Exercise;
pub use result::{FailureKind, TestFailure, TestResult};
pub use toolchain::Toolchain;
