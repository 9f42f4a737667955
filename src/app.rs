use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::annotate::{AnnotateResult, annotate_csv};
use crate::article::ArticleMetadata;
use crate::config::ResolvedConfig;
use crate::domain::EntryId;
use crate::emitter::EmitSummary;
use crate::error::AkgError;
use crate::gene_index::GeneIndex;
use crate::ledger::Ledger;
use crate::ntriples::{TidyStats, combine, tidy_file};
use crate::report::render_report;
use crate::stages::{CleanStage, ConvertStage, ExtractStage, SplitStage, StageReport, run_stage};
use crate::store::Store;
use crate::suitability::{CheckReport, HeuristicChecker, SuitabilityChecker, run_check};
use crate::uuid_store::UuidStore;
use crate::workbook::WorkbookReader;

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub added: usize,
    pub total: usize,
    pub ledger: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    #[serde(flatten)]
    pub stage: StageReport,
    pub totals: EmitSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludeResult {
    pub entry_id: EntryId,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub path: String,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombineResult {
    pub inputs: Vec<String>,
    pub output: String,
    pub triples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TidyResult {
    pub input: String,
    pub output: String,
    pub kept: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<W: WorkbookReader + Clone> {
    store: Store,
    config: ResolvedConfig,
    reader: W,
}

impl<W: WorkbookReader + Clone> App<W> {
    pub fn new(store: Store, config: ResolvedConfig, reader: W) -> Self {
        Self {
            store,
            config,
            reader,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scan(&self, sink: &dyn ProgressSink) -> Result<ScanResult, AkgError> {
        self.store.require_supp_data()?;
        let ledger_path = self.store.ledger_path();
        if !Ledger::writable_check(ledger_path) {
            return Err(AkgError::LedgerWriteConflict(
                ledger_path.to_path_buf().into_std_path_buf(),
            ));
        }
        let ledger = if ledger_path.as_std_path().exists() {
            Ledger::load(ledger_path)?
        } else {
            info!("creating tracking file {ledger_path}");
            Ledger::default()
        };
        sink.event(ProgressEvent {
            message: format!("scanning {}", self.store.supp_data_root()),
            elapsed: None,
        });
        let found =
            ledger.scan_downloads(self.store.supp_data_root(), &self.config.source_pattern)?;
        let added = found.len();
        let ledger = ledger.append(found);
        ledger.save(ledger_path)?;
        Ok(ScanResult {
            added,
            total: ledger.len(),
            ledger: ledger_path.to_string(),
        })
    }

    pub fn split(&self, sink: &dyn ProgressSink) -> Result<StageReport, AkgError> {
        self.store.require_ledger()?;
        run_stage(
            self.store.ledger_path(),
            &mut SplitStage::new(self.reader.clone()),
            sink,
        )
    }

    pub fn convert(&self, sink: &dyn ProgressSink) -> Result<StageReport, AkgError> {
        self.store.require_ledger()?;
        run_stage(self.store.ledger_path(), &mut ConvertStage, sink)
    }

    pub fn clean(&self, sink: &dyn ProgressSink) -> Result<StageReport, AkgError> {
        self.store.require_ledger()?;
        run_stage(self.store.ledger_path(), &mut CleanStage, sink)
    }

    pub fn extract(&self, sink: &dyn ProgressSink) -> Result<ExtractResult, AkgError> {
        self.store.require_ledger()?;
        let index =
            GeneIndex::from_path(self.store.reference_path(), &self.config.reference.options)?;
        let uuids = UuidStore::load(self.store.uuid_map_path())?;
        let articles = self.load_articles()?;

        let mut stage = ExtractStage::new(&index, uuids);
        if let Some(articles) = &articles {
            stage = stage.with_articles(articles);
        }
        let report = run_stage(self.store.ledger_path(), &mut stage, sink)?;
        Ok(ExtractResult {
            stage: report,
            totals: stage.totals(),
        })
    }

    fn load_articles(&self) -> Result<Option<ArticleMetadata>, AkgError> {
        let Some(path) = self.store.article_metadata_path() else {
            return Ok(None);
        };
        if !path.as_std_path().is_file() {
            warn!("article metadata file {path} does not exist, graphs get no article details");
            return Ok(None);
        }
        ArticleMetadata::load(path).map(Some)
    }

    pub fn check(
        &self,
        exclude_unsuitable: bool,
        sink: &dyn ProgressSink,
    ) -> Result<CheckReport, AkgError> {
        self.check_with(
            &HeuristicChecker::new(self.config.check_delay),
            exclude_unsuitable,
            sink,
        )
    }

    pub fn check_with<C: SuitabilityChecker + ?Sized>(
        &self,
        checker: &C,
        exclude_unsuitable: bool,
        sink: &dyn ProgressSink,
    ) -> Result<CheckReport, AkgError> {
        self.store.require_ledger()?;
        run_check(self.store.ledger_path(), checker, exclude_unsuitable, sink)
    }

    pub fn exclude(&self, target: &str, reason: &str) -> Result<ExcludeResult, AkgError> {
        self.store.require_ledger()?;
        let ledger_path = self.store.ledger_path();
        if !Ledger::writable_check(ledger_path) {
            return Err(AkgError::LedgerWriteConflict(
                ledger_path.to_path_buf().into_std_path_buf(),
            ));
        }
        let mut ledger = Ledger::load(ledger_path)?;
        let id = ledger.lookup(target)?;
        ledger.exclude(&id, reason)?;
        ledger.save(ledger_path)?;
        let path = ledger
            .find(&id)
            .map(|entry| entry.file_path().to_string())
            .unwrap_or_default();
        info!("excluded {path}: {reason}");
        Ok(ExcludeResult {
            entry_id: id,
            path,
            reason: reason.to_string(),
        })
    }

    pub fn report(&self) -> Result<ReportResult, AkgError> {
        self.store.require_ledger()?;
        let ledger = Ledger::load(self.store.ledger_path())?;
        let text = render_report(&ledger, &chrono::Utc::now().to_rfc3339());
        let path = self.store.report_path();
        Store::write_bytes_atomic(&path, text.as_bytes())?;
        Ok(ReportResult {
            path: path.to_string(),
            entries: ledger.len(),
        })
    }

    pub fn combine(
        &self,
        source_id: Option<&str>,
        files: &[String],
        output: Option<&str>,
    ) -> Result<CombineResult, AkgError> {
        let (inputs, default_name) = match source_id {
            Some(id) => (
                graph_files(&self.store.source_data_dir(id))?,
                format!("combined_{id}.nt"),
            ),
            None if !files.is_empty() => (
                files
                    .iter()
                    .filter(|file| file.ends_with(".nt"))
                    .map(|file| self.store.input_root().join(file))
                    .collect(),
                "combined.nt".to_string(),
            ),
            None => (
                graph_files(self.store.supp_data_root())?,
                "combined.nt".to_string(),
            ),
        };
        if inputs.is_empty() {
            return Err(AkgError::Configuration(
                "no .nt graph files to combine".to_string(),
            ));
        }
        self.store.ensure_graph_root()?;
        let output = self
            .store
            .graph_root()
            .join(output.unwrap_or(default_name.as_str()));
        let triples = combine(&inputs, &output)?;
        Ok(CombineResult {
            inputs: inputs.iter().map(ToString::to_string).collect(),
            output: output.to_string(),
            triples,
        })
    }

    pub fn tidy(&self, input: &str, output: &str) -> Result<TidyResult, AkgError> {
        let input = self.in_graph_root(input);
        let output = self.in_graph_root(output);
        let TidyStats { kept, dropped } = tidy_file(&input, &output)?;
        Ok(TidyResult {
            input: input.to_string(),
            output: output.to_string(),
            kept,
            dropped,
        })
    }

    pub fn annotate(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<AnnotateResult, AkgError> {
        let index =
            GeneIndex::from_path(self.store.reference_path(), &self.config.reference.options)?;
        annotate_csv(input, output, &index)
    }

    fn in_graph_root(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.store.graph_root().join(path)
        }
    }
}

fn graph_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, AkgError> {
    Ok(Store::list_files(root)?
        .into_iter()
        .filter(|path| path.extension() == Some("nt"))
        .collect())
}
