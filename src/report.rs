//! Results reporting and formatting.

use crate::metrics::TestResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.scenario_name)]);

        if let Some(layer) = &results.layer {
            table.add_row(vec!["Layer:", layer]);
        }
        table.add_row(vec!["Seed:", &format!("{}", results.seed)]);
        table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        table.add_row(vec![
            "Total Requests:",
            &format!("{}", results.total_requests),
        ]);
        table.add_row(vec![
            "Success Rate:",
            &format!(
                "{:.1}%",
                if results.total_requests > 0 {
                    (results.successful_requests as f64 / results.total_requests as f64) * 100.0
                } else {
                    0.0
                }
            ),
        ]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency_p50,
                results.latency_p90,
                results.latency_p95,
                results.latency_p99,
                results.latency_max
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec![
            "Cache Hit Rate:",
            &format!("{:.1}%", results.cache_hit_rate),
        ]);
        table.add_row(vec![
            "Throughput:",
            &format!("{:.1} MB/s", results.bytes_per_second / 1_000_000.0),
        ]);

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(results: &TestResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(results: &TestResults) -> String {
        format!(
            "{},{},{},{},{:.1},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
            results.timestamp,
            results.scenario_name,
            results.layer.as_deref().unwrap_or(""),
            results.seed,
            results.duration_secs,
            results.total_requests,
            results.requests_per_second,
            results.latency_p50,
            results.latency_p90,
            results.latency_p99,
            results.cache_hit_rate
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,layer,seed,duration,requests,rps,p50,p90,p99,cache_hit_rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> TestResults {
        TestResults {
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            scenario_name: "smoke".to_string(),
            layer: Some("ortos".to_string()),
            seed: 1640,
            concurrency: 4,
            duration_secs: 60.0,
            total_requests: 1200,
            successful_requests: 1190,
            failed_requests: 10,
            requests_per_second: 20.0,
            latency_p50: 12.5,
            latency_p75: 20.0,
            latency_p90: 31.0,
            latency_p95: 44.0,
            latency_p99: 70.0,
            latency_min: 4.0,
            latency_max: 120.0,
            latency_avg: 16.0,
            cache_hit_rate: 2.5,
            bytes_per_second: 1_500_000.0,
        }
    }

    #[test]
    fn test_csv_row_matches_header() {
        let header_fields = ResultsReport::csv_header().split(',').count();
        let row_fields = ResultsReport::format_csv(&sample_results())
            .split(',')
            .count();
        assert_eq!(header_fields, row_fields);
    }

    #[test]
    fn test_table_mentions_key_figures() {
        let table = ResultsReport::format_table(&sample_results());
        assert!(table.contains("smoke"));
        assert!(table.contains("1640"));
        assert!(table.contains("ortos"));
        assert!(table.contains("2.5%"));
    }

    #[test]
    fn test_json_round_trips() {
        let json = ResultsReport::format_json(&sample_results()).unwrap();
        let parsed: TestResults = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_requests, 1200);
        assert_eq!(parsed.seed, 1640);
    }
}
