use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::RunSummary;

/// Human-readable end-of-run summary on stdout.
pub fn print_summary(summary: &RunSummary) {
    let line = "=".repeat(60);
    println!("\n{}", line);
    println!("PROCESSING SUMMARY");
    println!("{}", line);
    println!("Period: {} to {}", summary.start_date, summary.end_date);
    println!("Total records: {}", summary.total);
    println!("Written: {}", summary.written);
    println!("Skipped (already done): {}", summary.skipped);
    println!("Failed: {}", summary.failed);
    let attempted = summary.written + summary.failed;
    if attempted > 0 {
        println!(
            "Success rate: {:.1}%",
            summary.written as f64 / attempted as f64 * 100.0
        );
    }
    println!("Elapsed: {:.1}s", summary.elapsed_secs);

    if !summary.failures.is_empty() {
        println!("\nFailed records:");
        for failure in &summary.failures {
            println!(
                "  - call {}: {} ({})",
                failure.call_id, failure.reason, failure.detail
            );
        }
    }
    println!("{}", line);
}

#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Write the machine-readable report for manual follow-up of failures.
pub async fn write_json_report(summary: &RunSummary, dir: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "report_{}_{}.json",
        summary.start_date, summary.end_date
    ));
    let report = RunReport {
        generated_at: Utc::now(),
        summary,
    };
    let body = serde_json::to_vec_pretty(&report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}
