use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::Stage;
use crate::error::AkgError;
use crate::ledger::{Ledger, ProvenanceEntry};

pub mod clean;
pub mod convert;
pub mod extract;
pub mod split;

pub use clean::CleanStage;
pub use convert::ConvertStage;
pub use extract::ExtractStage;
pub use split::SplitStage;

pub trait StageTransform {
    fn output_stage(&self) -> Stage;

    fn input_stage(&self) -> Stage {
        self.output_stage().previous().unwrap_or(Stage::Downloaded)
    }

    /// Writes the output files for `entry` and returns one new entry per file.
    /// Anything the outputs depend on must be persisted before returning.
    fn transform(&mut self, entry: &ProvenanceEntry) -> Result<Vec<ProvenanceEntry>, AkgError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub pending: usize,
    pub processed: usize,
    pub produced: usize,
    pub skipped: Vec<SkippedFile>,
}

pub fn run_stage<T: StageTransform + ?Sized>(
    ledger_path: &Utf8Path,
    transform: &mut T,
    sink: &dyn ProgressSink,
) -> Result<StageReport, AkgError> {
    let output = transform.output_stage();
    let input = transform.input_stage();
    if !Ledger::writable_check(ledger_path) {
        return Err(AkgError::LedgerWriteConflict(
            ledger_path.to_path_buf().into_std_path_buf(),
        ));
    }
    let mut ledger = Ledger::load(ledger_path)?;
    let pending = ledger.pending(input, output);
    info!(
        "stage {output}: {} pending entries at stage {input}",
        pending.len()
    );

    let mut report = StageReport {
        stage: output.label().to_string(),
        pending: pending.len(),
        processed: 0,
        produced: 0,
        skipped: Vec::new(),
    };
    for (position, entry) in pending.iter().enumerate() {
        let path = entry.file_path();
        sink.event(ProgressEvent {
            message: format!("[{}/{}] {path}", position + 1, pending.len()),
            elapsed: None,
        });
        let started = Instant::now();
        match transform.transform(entry) {
            Ok(outputs) => {
                report.processed += 1;
                report.produced += outputs.len();
                ledger = ledger.append(outputs);
                ledger.save(ledger_path)?;
                sink.event(ProgressEvent {
                    message: format!("done {path}"),
                    elapsed: Some(started.elapsed()),
                });
            }
            Err(err) if err.is_recoverable() => {
                warn!("skipping {path}: {err}");
                report.skipped.push(SkippedFile {
                    path: path.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    ledger.save(ledger_path)?;
    info!(
        "stage {output}: {} processed, {} new files, {} skipped",
        report.processed,
        report.produced,
        report.skipped.len()
    );
    Ok(report)
}

pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ' ' | '.' | ':' | '/' | '?' | '*' | '&' => {}
            '<' => out.push_str("lessthan"),
            '>' => out.push_str("morethan"),
            c => out.push(c),
        }
    }
    out
}

pub fn stage_stem<'a>(filename: &'a str, previous_prefix: &str) -> &'a str {
    let stem = crate::store::file_stem(filename);
    stem.strip_prefix(previous_prefix).unwrap_or(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_file_safe() {
        assert_eq!(sanitize_name("DEG p<0.05 & FC>2"), "DEGplessthan005FCmorethan2");
        assert_eq!(sanitize_name("a/b:c?d*e"), "abcde");
    }

    #[test]
    fn stems_drop_stage_prefix() {
        assert_eq!(stage_stem("split_Sheet1.csv", "split_"), "Sheet1");
        assert_eq!(stage_stem("other.csv", "split_"), "other");
    }
}
