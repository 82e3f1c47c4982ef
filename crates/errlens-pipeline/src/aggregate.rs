//! Result aggregation - expands per-unit results back onto every occurrence

use chrono::{DateTime, Utc};
use errlens_core::{AnalysisUnit, ErrorPatterns, Fingerprint, LogEntry};
use errlens_rag::{AnalysisResult, ResultStatus, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One report line: a single source occurrence and its own copy of the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub sequence: usize,
    pub line_number: usize,
    pub fingerprint: Fingerprint,
    /// every occurrence folded into the same unit, this one included
    pub occurrence_sequences: Vec<usize>,
    pub result: AnalysisResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub ok: usize,
    pub degraded: usize,
    pub failed: usize,
    /// distinct fingerprints analyzed
    pub units: usize,
    pub entries_scanned: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
    pub summary: ReportSummary,
    #[serde(default)]
    pub patterns: ErrorPatterns,
}

impl AnalysisReport {
    /// Entries at or above `severity`, report order preserved
    pub fn at_least(&self, severity: Severity) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.result.severity >= severity)
    }
}

#[derive(Debug, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Order: severity descending, then source sequence ascending.
    pub fn aggregate(
        &self,
        analyzed: &[(AnalysisUnit, AnalysisResult)],
        entries: &[LogEntry],
    ) -> AnalysisReport {
        let line_numbers: HashMap<usize, usize> =
            entries.iter().map(|e| (e.sequence, e.line_number)).collect();

        let mut report_entries: Vec<ReportEntry> = Vec::new();
        for (unit, result) in analyzed {
            let occurrences: Vec<usize> = unit.occurrence_sequences.iter().copied().collect();
            for &sequence in &occurrences {
                report_entries.push(ReportEntry {
                    sequence,
                    line_number: line_numbers.get(&sequence).copied().unwrap_or(sequence + 1),
                    fingerprint: unit.fingerprint.clone(),
                    occurrence_sequences: occurrences.clone(),
                    result: result.clone(),
                });
            }
        }

        report_entries.sort_by(|a, b| {
            b.result
                .severity
                .cmp(&a.result.severity)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });

        let summary = summarize(&report_entries, analyzed.len(), entries.len());

        AnalysisReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            entries: report_entries,
            summary,
            patterns: errlens_core::extract_error_patterns(entries),
        }
    }
}

fn summarize(entries: &[ReportEntry], units: usize, entries_scanned: usize) -> ReportSummary {
    let mut summary = ReportSummary {
        total: entries.len(),
        units,
        entries_scanned,
        ..ReportSummary::default()
    };
    for entry in entries {
        match entry.result.severity {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
        match entry.result.status {
            ResultStatus::Ok => summary.ok += 1,
            ResultStatus::Degraded => summary.degraded += 1,
            ResultStatus::Failed => summary.failed += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use errlens_core::{Chunker, Deduplicator, LogParser};

    const LOG: &str = "\
2024-01-15 10:30:45 ERROR [database] Connection timeout after 30 seconds
2024-01-15 10:30:46 CRITICAL [kernel] Out of memory
2024-01-15 10:30:47 INFO [api] request served
2024-01-15 10:30:48 ERROR [database] Connection timeout after 45 seconds
2024-01-15 10:30:49 ERROR [auth] invalid token";

    fn result_with(severity: Severity, explanation: &str) -> AnalysisResult {
        let mut result = AnalysisResult::degraded("x", severity, "n/a");
        result.status = ResultStatus::Ok;
        result.failure_cause = None;
        result.explanation = explanation.to_string();
        result
    }

    fn analyzed() -> (Vec<(AnalysisUnit, AnalysisResult)>, Vec<LogEntry>) {
        let entries = LogParser::default().parse(LOG);
        let errors: Vec<LogEntry> = entries.iter().filter(|e| e.is_error_candidate()).cloned().collect();
        let units = Deduplicator::default().deduplicate(Chunker::new(500).chunk(&errors));
        let pairs = units
            .into_iter()
            .map(|unit| {
                let kernel = unit
                    .dominant_entry()
                    .and_then(|e| e.component.as_deref())
                    .is_some_and(|c| c == "kernel");
                let severity = if kernel { Severity::Critical } else { Severity::High };
                let explanation = format!("about {}", unit.fingerprint);
                (unit, result_with(severity, &explanation))
            })
            .collect();
        (pairs, entries)
    }

    #[test]
    fn test_every_error_occurrence_once_in_order() {
        let (pairs, entries) = analyzed();
        assert_eq!(pairs.len(), 3);

        let report = ResultAggregator::new().aggregate(&pairs, &entries);
        let sequences: Vec<usize> = report.entries.iter().map(|e| e.sequence).collect();
        // critical first, then HIGH by source order
        assert_eq!(sequences, vec![1, 0, 3, 4]);
        assert_eq!(report.entries[0].line_number, 2);
    }

    #[test]
    fn test_duplicates_share_identical_results() {
        let (pairs, entries) = analyzed();
        let report = ResultAggregator::new().aggregate(&pairs, &entries);

        let timeouts: Vec<&ReportEntry> = report.entries.iter().filter(|e| e.sequence == 0 || e.sequence == 3).collect();
        assert_eq!(timeouts.len(), 2);
        assert_eq!(timeouts[0].result, timeouts[1].result);
        assert_eq!(timeouts[0].occurrence_sequences, vec![0, 3]);
    }

    #[test]
    fn test_summary_counts() {
        let (pairs, entries) = analyzed();
        let report = ResultAggregator::new().aggregate(&pairs, &entries);
        let s = &report.summary;

        assert_eq!(s.total, 4);
        assert_eq!(s.critical, 1);
        assert_eq!(s.high, 3);
        assert_eq!(s.ok, 4);
        assert_eq!(s.units, 3);
        assert_eq!(s.entries_scanned, 5);
        assert_eq!(report.patterns.total_errors, 4);
        assert_eq!(report.at_least(Severity::Critical).count(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let (pairs, entries) = analyzed();
        let report = ResultAggregator::new().aggregate(&pairs, &entries);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["total"], 4);
        assert_eq!(json["entries"][0]["result"]["severity"], "CRITICAL");
        assert!(json["entries"][0]["occurrence_sequences"].is_array());
    }
}
