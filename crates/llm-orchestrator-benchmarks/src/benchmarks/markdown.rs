// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Renders a human-readable markdown summary from a set of
//! [`BenchmarkResult`]s, for `benchmarks/output/summary.md`.

use super::result::BenchmarkResult;
use std::fmt::Write as _;

/// Generates the full markdown report for a benchmark run.
///
/// One table row per result, with the common metric columns
/// (`duration_ms`, `ops_per_sec`, percentiles) pulled out when present and
/// any other metric keys rendered inline as `key=value`.
pub fn generate_markdown_report(results: &[BenchmarkResult]) -> String {
    let mut out = String::new();

    writeln!(out, "# Benchmark Results").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "Generated {} — {} target(s) measured.",
        chrono::Utc::now().to_rfc3339(),
        results.len()
    )
    .ok();
    writeln!(out).ok();

    if results.is_empty() {
        writeln!(out, "No benchmark results were recorded.").ok();
        return out;
    }

    writeln!(out, "| Target | Duration (ms) | Ops/sec | Other metrics |").ok();
    writeln!(out, "|---|---|---|---|").ok();

    for result in results {
        let duration = result
            .duration_ms()
            .map(|d| format!("{:.2}", d))
            .unwrap_or_else(|| "—".to_string());
        let ops = result
            .ops_per_sec()
            .map(|o| format!("{:.0}", o))
            .unwrap_or_else(|| "—".to_string());
        let other = other_metrics(result);

        writeln!(
            out,
            "| {} | {} | {} | {} |",
            result.target_id, duration, ops, other
        )
        .ok();
    }

    writeln!(out).ok();
    out
}

/// Renders every metrics key other than the ones already broken out into
/// their own table columns, as `key=value` pairs joined by `, `.
fn other_metrics(result: &BenchmarkResult) -> String {
    const BREAKOUT_KEYS: &[&str] = &["duration_ms", "ops_per_sec"];

    let Some(obj) = result.metrics.as_object() else {
        return "—".to_string();
    };

    let mut pairs: Vec<(String, String)> = obj
        .iter()
        .filter(|(key, _)| !BREAKOUT_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.to_string()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        return "—".to_string();
    }

    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_header_and_target_ids() {
        let results = vec![BenchmarkResult::new(
            "dag_construction",
            json!({"duration_ms": 12.5, "iterations": 1000}),
        )];
        let report = generate_markdown_report(&results);
        assert!(report.contains("# Benchmark Results"));
        assert!(report.contains("dag_construction"));
        assert!(report.contains("12.50"));
        assert!(report.contains("iterations=1000"));
    }

    #[test]
    fn handles_empty_results() {
        let report = generate_markdown_report(&[]);
        assert!(report.contains("No benchmark results"));
    }

    #[test]
    fn omits_breakout_keys_from_other_metrics() {
        let results = vec![BenchmarkResult::new(
            "workflow_execution",
            json!({"duration_ms": 5.0, "ops_per_sec": 200.0, "memory_bytes": 2048}),
        )];
        let report = generate_markdown_report(&results);
        assert!(report.contains("memory_bytes=2048"));
        assert!(!report.contains("duration_ms=5"));
    }
}
