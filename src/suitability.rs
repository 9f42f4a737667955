use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::columns::{FOLD_CHANGE_VOCABULARY, detect_column};
use crate::domain::{EntryId, Stage};
use crate::error::AkgError;
use crate::ledger::Ledger;
use crate::table::read_delimited;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub suitable: bool,
    pub reason: String,
    pub fold_change_column: Option<String>,
}

pub trait SuitabilityChecker {
    fn check(&self, path: &Utf8Path, header_skip: u32) -> Verdict;

    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicChecker {
    delay: Duration,
}

impl HeuristicChecker {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl SuitabilityChecker for HeuristicChecker {
    fn check(&self, path: &Utf8Path, header_skip: u32) -> Verdict {
        let table = match read_delimited(path, header_skip) {
            Ok(table) => table,
            Err(err) => {
                return Verdict {
                    suitable: false,
                    reason: format!("unreadable: {err}"),
                    fold_change_column: None,
                };
            }
        };
        match detect_column(&table.headers, FOLD_CHANGE_VOCABULARY) {
            Some(column) => Verdict {
                suitable: true,
                reason: format!("fold change column '{column}'"),
                fold_change_column: Some(column),
            },
            None => Verdict {
                suitable: false,
                reason: "no fold change column".to_string(),
                fold_change_column: None,
            },
        }
    }

    fn min_interval(&self) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckedFile {
    pub entry_id: EntryId,
    pub path: String,
    pub suitable: bool,
    pub reason: String,
    pub excluded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checked: Vec<CheckedFile>,
}

pub fn run_check<C: SuitabilityChecker + ?Sized>(
    ledger_path: &Utf8Path,
    checker: &C,
    exclude_unsuitable: bool,
    sink: &dyn ProgressSink,
) -> Result<CheckReport, AkgError> {
    if !Ledger::writable_check(ledger_path) {
        return Err(AkgError::LedgerWriteConflict(
            ledger_path.to_path_buf().into_std_path_buf(),
        ));
    }
    let mut ledger = Ledger::load(ledger_path)?;
    let targets = ledger
        .entries()
        .iter()
        .filter(|entry| {
            entry.stage == Stage::Split && !entry.excluded && entry.suitable_reason.is_empty()
        })
        .map(|entry| (entry.entry_id, entry.file_path(), entry.header_skip))
        .collect::<Vec<_>>();
    info!("checking {} split tables", targets.len());

    let mut report = CheckReport {
        checked: Vec::new(),
    };
    for (position, (id, path, skip)) in targets.iter().enumerate() {
        if position > 0 && !checker.min_interval().is_zero() {
            thread::sleep(checker.min_interval());
        }
        sink.event(ProgressEvent {
            message: format!("[{}/{}] checking {path}", position + 1, targets.len()),
            elapsed: None,
        });
        let verdict = checker.check(path, *skip);
        let Some(entry) = ledger.find_mut(id) else {
            continue;
        };
        entry.suitable = verdict.suitable;
        entry.suitable_reason = verdict.reason.clone();
        if entry.lfc_column.trim().is_empty() {
            if let Some(column) = &verdict.fold_change_column {
                entry.lfc_column = column.clone();
            }
        }
        let excluded = exclude_unsuitable && !verdict.suitable;
        if excluded {
            warn!("excluding {path}: {}", verdict.reason);
            entry.excluded = true;
            entry.manual_reason = format!("unsuitable: {}", verdict.reason);
        }
        report.checked.push(CheckedFile {
            entry_id: *id,
            path: path.to_string(),
            suitable: verdict.suitable,
            reason: verdict.reason,
            excluded,
        });
        ledger.save(ledger_path)?;
    }
    ledger.save(ledger_path)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn heuristic_verdicts() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let good = dir.join("good.csv");
        let bad = dir.join("bad.csv");
        fs::write(good.as_std_path(), "gene,log2FoldChange\nA,1\n").unwrap();
        fs::write(bad.as_std_path(), "sample,age\nA,1\n").unwrap();

        let checker = HeuristicChecker::default();
        let verdict = checker.check(&good, 0);
        assert!(verdict.suitable);
        assert_eq!(verdict.fold_change_column.as_deref(), Some("log2FoldChange"));
        assert!(!checker.check(&bad, 0).suitable);
        assert!(!checker.check(&dir.join("missing.csv"), 0).suitable);
        assert_eq!(checker.min_interval(), Duration::ZERO);
    }
}
