//! Run report and results formatting.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate timing and failure count for one completed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub workload: String,
    pub pool_size: usize,
    pub total_requests: u64,
    pub total_duration: Duration,
    pub mean_duration: Duration,
    pub failure_count: u64,
}

impl RunReport {
    /// Compute the report from the batch's elapsed wall time.
    pub fn new(
        workload: impl Into<String>,
        pool_size: usize,
        total_requests: u64,
        total_duration: Duration,
        failure_count: u64,
    ) -> Self {
        Self {
            workload: workload.into(),
            pool_size,
            total_requests,
            total_duration,
            mean_duration: mean_duration(total_duration, total_requests),
            failure_count,
        }
    }
}

fn mean_duration(total: Duration, requests: u64) -> Duration {
    if requests == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(requests);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Serializable view of a report, durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub timestamp: String,
    pub workload: String,
    pub pool_size: usize,
    pub total_requests: u64,
    pub total_duration_ms: f64,
    pub mean_duration_ms: f64,
    pub failure_count: u64,
}

impl From<&RunReport> for ReportRecord {
    fn from(report: &RunReport) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            workload: report.workload.clone(),
            pool_size: report.pool_size,
            total_requests: report.total_requests,
            total_duration_ms: report.total_duration.as_secs_f64() * 1000.0,
            mean_duration_ms: report.mean_duration.as_secs_f64() * 1000.0,
            failure_count: report.failure_count,
        }
    }
}

/// Formats run reports for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Header naming the columns of [`ResultsReport::format_line`].
    pub fn line_header(workload: &str) -> String {
        format!(
            "{}/Parallel clients; total duration; avg duration per call; failed calls",
            workload
        )
    }

    /// `poolSize;totalDuration;meanDuration;failureCount`
    pub fn format_line(report: &RunReport) -> String {
        format!(
            "{};{:?};{:?};{}",
            report.pool_size, report.total_duration, report.mean_duration, report.failure_count
        )
    }

    /// Header followed by the result line; header only when the batch produced no report.
    pub fn format_lines(workload: &str, report: Option<&RunReport>) -> String {
        let header = Self::line_header(workload);
        match report {
            Some(report) => format!("{}\n{}", header, Self::format_line(report)),
            None => header,
        }
    }

    /// Format a report as a console table.
    pub fn format_table(report: &RunReport) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", report.workload)]);

        table.add_row(vec!["Parallel clients:", &report.pool_size.to_string()]);
        table.add_row(vec!["Total requests:", &report.total_requests.to_string()]);
        table.add_row(vec![
            "Total duration:",
            &format!("{:.3}s", report.total_duration.as_secs_f64()),
        ]);
        table.add_row(vec![
            "Avg per call:",
            &format!("{:.3}ms", report.mean_duration.as_secs_f64() * 1000.0),
        ]);
        table.add_row(vec!["Failed calls:", &report.failure_count.to_string()]);

        table.to_string()
    }

    /// Format a report as JSON.
    pub fn format_json(report: &RunReport) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportRecord::from(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new("URL", 10, 200, Duration::from_secs(4), 3)
    }

    #[test]
    fn test_mean_duration() {
        let report = report();
        assert_eq!(report.mean_duration, Duration::from_millis(20));
        assert_eq!(report.total_duration, Duration::from_secs(4));
    }

    #[test]
    fn test_mean_duration_rounds_down() {
        let report = RunReport::new("IMG", 1, 3, Duration::from_nanos(10), 0);
        assert_eq!(report.mean_duration, Duration::from_nanos(3));
    }

    #[test]
    fn test_mean_duration_zero_requests() {
        let report = RunReport::new("IMG", 1, 0, Duration::from_secs(1), 0);
        assert_eq!(report.mean_duration, Duration::ZERO);
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            ResultsReport::line_header("URL"),
            "URL/Parallel clients; total duration; avg duration per call; failed calls"
        );
        assert_eq!(ResultsReport::format_line(&report()), "10;4s;20ms;3");
    }

    #[test]
    fn test_header_printed_without_report() {
        assert_eq!(
            ResultsReport::format_lines("IMG", None),
            ResultsReport::line_header("IMG")
        );
        assert_eq!(
            ResultsReport::format_lines("URL", Some(&report())),
            "URL/Parallel clients; total duration; avg duration per call; failed calls\n10;4s;20ms;3"
        );
    }

    #[test]
    fn test_json_format() {
        let json = ResultsReport::format_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["workload"], "URL");
        assert_eq!(value["pool_size"], 10);
        assert_eq!(value["failure_count"], 3);
        let mean_ms = value["mean_duration_ms"].as_f64().unwrap();
        assert!((mean_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_format() {
        let table = ResultsReport::format_table(&report());
        assert!(table.contains("Load Test Results: URL"));
        assert!(table.contains("Failed calls:"));
    }
}
