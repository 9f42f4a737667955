use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::annotate::AnnotateResult;
use crate::app::{
    CombineResult, ExcludeResult, ExtractResult, ProgressEvent, ProgressSink, ReportResult,
    ScanResult, TidyResult,
};
use crate::stages::StageReport;
use crate::suitability::CheckReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_scan(result: &ScanResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "scan: {} new files recorded, {} entries in {}",
            result.added, result.total, result.ledger
        )
    }

    pub fn print_stage(report: &StageReport) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}: {} pending, {} processed, {} files written, {} skipped",
            report.stage,
            report.pending,
            report.processed,
            report.produced,
            report.skipped.len()
        )?;
        for skipped in &report.skipped {
            writeln!(out, "  skipped {}: {}", skipped.path, skipped.reason)?;
        }
        Ok(())
    }

    pub fn print_extract(result: &ExtractResult) -> io::Result<()> {
        Self::print_stage(&result.stage)?;
        writeln!(
            io::stdout().lock(),
            "  {} rows, {} genes matched, {} unmatched",
            result.totals.rows, result.totals.matched, result.totals.unmatched
        )
    }

    pub fn print_check(report: &CheckReport) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "check: {} tables checked", report.checked.len())?;
        for file in &report.checked {
            let verdict = if file.suitable { "suitable" } else { "unsuitable" };
            let excluded = if file.excluded { " (excluded)" } else { "" };
            writeln!(out, "  {}: {verdict}{excluded}, {}", file.path, file.reason)?;
        }
        Ok(())
    }

    pub fn print_exclude(result: &ExcludeResult) -> io::Result<()> {
        writeln!(
            io::stdout().lock(),
            "excluded {} ({}): {}",
            result.path, result.entry_id, result.reason
        )
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        writeln!(
            io::stdout().lock(),
            "report of {} entries written to {}",
            result.entries, result.path
        )
    }

    pub fn print_combine(result: &CombineResult) -> io::Result<()> {
        writeln!(
            io::stdout().lock(),
            "combined {} files into {} ({} triples)",
            result.inputs.len(),
            result.output,
            result.triples
        )
    }

    pub fn print_tidy(result: &TidyResult) -> io::Result<()> {
        writeln!(
            io::stdout().lock(),
            "tidied {} -> {}: {} lines kept, {} dropped",
            result.input, result.output, result.kept, result.dropped
        )
    }

    pub fn print_annotate(result: &AnnotateResult) -> io::Result<()> {
        writeln!(
            io::stdout().lock(),
            "annotated {} of {} rows",
            result.annotated, result.rows
        )
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => info!("{}", event.message),
        }
    }
}
