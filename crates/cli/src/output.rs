//! Terminal output formatting

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use finsweep_harness::{RunOutcome, RunSummary};

/// Print the run-level summary table and status line
pub fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Iterations".to_string(), summary.iterations.to_string()]);
    table.add_row(vec![
        "Initial errors".to_string(),
        summary.progress.initial_error_count.to_string(),
    ]);
    table.add_row(vec![
        "Final errors".to_string(),
        summary.progress.current_error_count.to_string(),
    ]);
    table.add_row(vec![
        "Fixed".to_string(),
        summary.progress.fixed_count.to_string(),
    ]);
    table.add_row(vec![
        "Progress".to_string(),
        format!("{}%", summary.progress.progress_percent),
    ]);

    println!("{table}");

    for report in &summary.reports {
        println!("report: {}", report.display());
    }

    match summary.outcome {
        RunOutcome::Clean => {
            println!("{}", "✅ Run ended CLEAN - zero console errors".green());
        }
        RunOutcome::Exhausted => {
            let line = format!(
                "❌ Run ended EXHAUSTED - {} error(s) remain after {} iteration(s)",
                summary.progress.current_error_count, summary.iterations
            );
            println!("{}", line.as_str().red());
        }
        RunOutcome::AuthFailed => {
            println!("{}", "❌ Run ended AUTH_FAILED - could not log in".red());
        }
    }
}

/// Print a fatal error line
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message);
}
