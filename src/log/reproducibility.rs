//! Fit session log
//!
//! Every step of a fitting session is recorded with:
//! - Timestamp
//! - Operation name and description
//! - Detail (parameter values, file paths, minimizer status)
//! - Sequential order
//!
//! The log can be exported as human-readable text or JSON.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::ops::Range;
use std::path::Path;

use crate::optimize::observer::FitObserver;
use crate::optimize::sectioned::{FitOutcome, QuadrantReport};
use crate::optimize::worker::FitEvent;
use crate::spin::system::SpinSystem;

/// A single log entry representing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sequential step number (1-based)
    pub sequence: usize,
    pub timestamp: DateTime<Local>,
    /// Human-readable operation name
    pub operation: String,
    pub description: String,
    /// Values needed to repeat the step
    pub detail: String,
}

impl LogEntry {
    /// Format as human-readable text line
    pub fn to_text(&self) -> String {
        format!(
            "[{:03}] {} | {} | {}\n      Detail: {}",
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            self.description,
            if self.detail.is_empty() {
                "(n/a)"
            } else {
                self.detail.as_str()
            }
        )
    }
}

/// The fit log, all steps of one session in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitLog {
    pub session_id: String,
    pub session_start: DateTime<Local>,
    pub source_file: String,
    pub software_version: String,
    pub entries: Vec<LogEntry>,
}

impl FitLog {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_start: Local::now(),
            source_file: String::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
        }
    }

    /// Set the spectrum file this session fits against
    pub fn set_source(&mut self, source: &str) {
        self.source_file = source.to_string();
    }

    pub fn add_entry(&mut self, operation: &str, description: &str, detail: &str) {
        let seq = self.entries.len() + 1;
        self.entries.push(LogEntry {
            sequence: seq,
            timestamp: Local::now(),
            operation: operation.to_string(),
            description: description.to_string(),
            detail: detail.to_string(),
        });
        log::info!("[LOG {:03}] {} — {}", seq, operation, description);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a progress event coming from a background fit.
    ///
    /// Per-iteration events are not logged.
    pub fn record_event(&mut self, event: &FitEvent) {
        match event {
            FitEvent::Started { quadrants } => self.record_start(quadrants),
            FitEvent::QuadrantStarted { index, range } => self.record_quadrant_start(*index, range),
            FitEvent::Iteration { .. } => {}
            FitEvent::QuadrantFinished(report) => self.record_quadrant(report),
            FitEvent::Finished { warnings } => self.record_finish(warnings),
        }
    }

    fn record_start(&mut self, quadrants: &[Range<usize>]) {
        let ranges: Vec<String> = quadrants.iter().map(|q| format!("{}..{}", q.start, q.end)).collect();
        self.add_entry(
            "Fit",
            &format!("Sectioned fit over {} quadrants", quadrants.len()),
            &format!("quadrants=[{}]", ranges.join(", ")),
        );
    }

    fn record_quadrant_start(&mut self, index: usize, range: &Range<usize>) {
        self.add_entry(
            "Quadrant",
            &format!("Fitting quadrant {index}"),
            &format!("points={}..{}", range.start, range.end),
        );
    }

    fn record_quadrant(&mut self, report: &QuadrantReport) {
        self.add_entry(
            "Quadrant Result",
            &format!("Quadrant {} RMSE {:.6} -> {:.6}", report.index, report.initial_rmse, report.rmse),
            &format!(
                "hz={:.3}..{:.3} status={} iterations={} evaluations={}",
                report.freq_range.0, report.freq_range.1, report.status, report.iterations, report.evaluations
            ),
        );
    }

    fn record_finish(&mut self, warnings: &[String]) {
        let description = if warnings.is_empty() {
            "Fit complete".to_string()
        } else {
            format!("Fit complete with {} warning(s)", warnings.len())
        };
        self.add_entry("Fit Complete", &description, &warnings.join("; "));
    }

    /// Record the fitted parameters.
    pub fn record_outcome(&mut self, outcome: &FitOutcome) {
        let spin = &outcome.spin;
        let widths = spin.half_height_width().broadcast(spin.len());
        let mut detail = format!(
            "intensities={:?} half_height_widths={:?} couplings={:?}",
            spin.intensities(),
            widths,
            spin.couplings()
        );
        if let Some(water) = &outcome.water {
            detail.push_str(&format!(
                " water=({:.3} Hz, {:.3}, {:.3})",
                water.frequency(),
                water.intensity(),
                water.hhw()
            ));
        }
        self.add_entry(
            "Fitted Parameters",
            &format!("{} nuclei", spin.len()),
            &detail,
        );
    }

    /// Export as human-readable text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("  Spin System Fit Log\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!("  Session ID:  {}\n", self.session_id));
        out.push_str(&format!(
            "  Started:     {}\n",
            self.session_start.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("  Source:      {}\n", self.source_file));
        out.push_str(&format!("  Software:    spinsim v{}\n", self.software_version));
        out.push_str(&format!("  Steps:       {}\n", self.entries.len()));
        out.push_str("───────────────────────────────────────────────────────────────\n\n");

        for entry in &self.entries {
            out.push_str(&entry.to_text());
            out.push_str("\n\n");
        }

        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!(
            "  Log exported: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }

    pub fn save_text(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_json())
    }
}

impl Default for FitLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FitObserver for FitLog {
    fn fit_started(&mut self, spin: &SpinSystem, quadrants: &[Range<usize>]) {
        self.add_entry(
            "Spin System",
            &format!("{} nuclei at {} MHz", spin.len(), spin.field_strength()),
            &format!("names={:?} ppm={:?}", spin.names(), spin.ppm()),
        );
        self.record_start(quadrants);
    }

    fn quadrant_started(&mut self, quadrant: usize, range: &Range<usize>) {
        self.record_quadrant_start(quadrant, range);
    }

    fn quadrant_finished(&mut self, report: &QuadrantReport) {
        self.record_quadrant(report);
    }

    fn fit_finished(&mut self, outcome: &FitOutcome) {
        self.record_finish(&outcome.warnings());
        self.record_outcome(outcome);
    }
}
