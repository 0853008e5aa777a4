use gradeloop::lang::Adapter;
use gradeloop::models::{Exercise, TestResult, Toolchain};
use gradeloop::progress::ExerciseStatus;
use gradeloop::runner::{Diagnostic, Recheck, RevealedHint, RunOutcome, StatusRow, Verification};

const RULE_WIDTH: usize = 60;
const MAX_FAILURES_SHOWN: usize = 5;
const MAX_MESSAGE_CHARS: usize = 200;

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

pub fn display_problem(exercise: &Exercise, toolchain: Toolchain) {
    println!("\n{}", rule('='));
    println!("  Exercise {}: {}", exercise.order_str(), exercise.name);
    println!("{}\n", rule('='));

    println!("Difficulty: {}", exercise.difficulty.display_name());
    println!("Toolchain: {}\n", Adapter::for_toolchain(toolchain).name());

    println!("{}", rule('-'));
    if exercise.problem_md.trim().is_empty() {
        println!("No problem description available.");
    } else {
        println!("{}", exercise.problem_md.trim_end());
    }
    println!("{}", rule('-'));

    println!("\nEdit files in: {}\n", exercise.source_dir().display());
}

pub fn display_outcome(outcome: &RunOutcome, full_output: bool) {
    display_result(&outcome.exercise, &outcome.result, full_output);
    if let Some(hint) = &outcome.hint {
        display_hint(hint);
    }
}

pub fn display_result(name: &str, result: &TestResult, full_output: bool) {
    if full_output && !result.output.trim().is_empty() {
        println!("{}", result.output.trim_end());
        println!();
    }

    println!("{}", rule('='));
    println!("{name}: {}", summary_line(result));
    for line in failure_lines(result) {
        println!("{line}");
    }
    println!("{}", rule('='));
}

pub fn display_hint(hint: &RevealedHint) {
    println!("\nHint {}: {}", hint.index + 1, hint.text);
    if hint.remaining > 0 {
        println!("({} more hint(s) available after further attempts)", hint.remaining);
    }
}

pub fn display_status(course: &str, rows: &[StatusRow]) {
    println!("\n{course}\n");
    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(8).max(8);
    println!("  {:<7} {:<width$}  {:<10} {:>8}", "Order", "Exercise", "Status", "Attempts");
    for row in rows {
        let marker = if row.current { ">" } else { " " };
        let attempts = if row.attempts > 0 {
            row.attempts.to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{marker} {:<7} {:<width$}  {:<10} {:>8}",
            row.order,
            row.name,
            status_label(row.status),
            attempts
        );
    }

    let done = rows.iter().filter(|r| r.status != ExerciseStatus::Pending).count();
    println!("\n{done}/{} exercises done", rows.len());
    match rows.iter().find(|r| r.current) {
        Some(current) => println!("Current exercise: {}", current.name),
        None => println!("All exercises completed!"),
    }
}

pub fn display_rechecks(rechecks: &[Recheck]) {
    for recheck in rechecks {
        let mark = if recheck.regressed { "✗" } else { "✓" };
        println!("{mark} {}", recheck.exercise);
        if recheck.regressed {
            for line in failure_lines(&recheck.result) {
                println!("  {line}");
            }
        }
    }
}

pub fn display_verifications(verifications: &[Verification]) {
    for verification in verifications {
        let mark = if verification.result.passed { "✓" } else { "✗" };
        println!(
            "{mark} {} ({}) {}",
            verification.exercise,
            verification.toolchain.display_name(),
            summary_line(&verification.result)
        );
    }
}

pub fn display_diagnostics(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        let mark = if diag.available { "ok" } else { "missing" };
        println!(
            "{:<8} {} ({} exercise(s))",
            mark, diag.adapter, diag.exercises
        );
    }
}

pub fn status_label(status: ExerciseStatus) -> &'static str {
    match status {
        ExerciseStatus::Passed => "passed",
        ExerciseStatus::Skipped => "skipped",
        ExerciseStatus::Pending => "pending",
    }
}

pub fn summary_line(result: &TestResult) -> String {
    if result.passed {
        format!(
            "{}/{} tests passed ({} ms)",
            result.tests_passed,
            result.tests_run,
            result.duration_ms()
        )
    } else {
        format!(
            "{}/{} tests passed - {} failed ({} ms)",
            result.tests_passed,
            result.tests_run,
            result.tests_failed(),
            result.duration_ms()
        )
    }
}

/// At most five failures, messages cut to 200 characters.
pub fn failure_lines(result: &TestResult) -> Vec<String> {
    let mut lines = Vec::new();
    for failure in result.failures.iter().take(MAX_FAILURES_SHOWN) {
        match &failure.location {
            Some(location) => lines.push(format!("  ✗ {} ({location})", failure.name)),
            None => lines.push(format!("  ✗ {}", failure.name)),
        }
        if !failure.message.is_empty() {
            lines.push(format!("    {}", truncate(&failure.message, MAX_MESSAGE_CHARS)));
        }
    }
    let hidden = result.failures.len().saturating_sub(MAX_FAILURES_SHOWN);
    if hidden > 0 {
        lines.push(format!("  ... and {hidden} more"));
    }
    lines
}

pub fn truncate(message: &str, max: usize) -> String {
    let single_line = message.lines().collect::<Vec<_>>().join(" ");
    match single_line.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &single_line[..idx]),
        None => single_line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradeloop::models::TestFailure;
    use std::time::Duration;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 200), "short");
        assert_eq!(truncate("a\nb", 200), "a b");
        let long = "é".repeat(250);
        let cut = truncate(&long, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_failure_lines_capped() {
        let failures = (0..7)
            .map(|i| TestFailure::new(format!("t{i}"), "boom"))
            .collect();
        let result = TestResult::from_counts(false, 0, 7, failures, String::new(), Duration::ZERO);
        let lines = failure_lines(&result);
        assert_eq!(lines.len(), 5 * 2 + 1);
        assert_eq!(lines.last().unwrap(), "  ... and 2 more");
    }

    #[test]
    fn test_summary_line() {
        let result = TestResult::from_counts(true, 3, 0, Vec::new(), String::new(), Duration::from_millis(12));
        assert_eq!(summary_line(&result), "3/3 tests passed (12 ms)");
        let result = TestResult::timeout(Duration::from_secs(5), Duration::from_millis(5001));
        assert_eq!(summary_line(&result), "0/1 tests passed - 1 failed (5001 ms)");
    }
}
