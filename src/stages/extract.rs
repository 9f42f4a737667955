use std::collections::HashMap;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::article::ArticleMetadata;
use crate::columns::{ColumnRoles, RoleOverrides, resolve_roles};
use crate::domain::{GeneFamily, Stage};
use crate::emitter::{EmitSummary, RowValues, TripleEmitter};
use crate::error::AkgError;
use crate::gene_index::GeneIndex;
use crate::ledger::ProvenanceEntry;
use crate::stages::{StageTransform, stage_stem};
use crate::store::{Store, file_stem};
use crate::table::{Table, read_csv};
use crate::uuid_store::UuidStore;

pub struct ExtractStage<'a> {
    index: &'a GeneIndex,
    uuids: UuidStore,
    articles: Option<&'a ArticleMetadata>,
    dataset_sources: HashMap<String, String>,
    totals: EmitSummary,
}

impl<'a> ExtractStage<'a> {
    pub fn new(index: &'a GeneIndex, uuids: UuidStore) -> Self {
        Self {
            index,
            uuids,
            articles: None,
            dataset_sources: HashMap::new(),
            totals: EmitSummary::default(),
        }
    }

    pub fn with_articles(mut self, articles: &'a ArticleMetadata) -> Self {
        self.articles = Some(articles);
        self
    }

    pub fn totals(&self) -> EmitSummary {
        self.totals
    }

    fn note_dataset(&mut self, dataset: &str, source_id: &str) {
        match self.dataset_sources.get(dataset) {
            Some(previous) if previous != source_id => warn!(
                "dataset name '{dataset}' is used by sources {previous} and {source_id}, they share one dataset id"
            ),
            Some(_) => {}
            None => {
                self.dataset_sources
                    .insert(dataset.to_string(), source_id.to_string());
            }
        }
    }
}

fn row_values<'r>(row: &'r [String], roles: &ColumnRoles) -> RowValues<'r> {
    let cell = |column: &Option<crate::columns::ResolvedColumn>| {
        column
            .as_ref()
            .and_then(|column| row.get(column.index))
            .map(String::as_str)
    };
    RowValues {
        gene: cell(&roles.gene),
        pvalue: cell(&roles.pvalue),
        fold_change: cell(&roles.fold_change),
    }
}

pub fn extract_table(
    emitter: &mut TripleEmitter<'_>,
    index: &GeneIndex,
    table: &Table,
    roles: &ColumnRoles,
    dataset: &str,
    source_id: &str,
) -> crate::emitter::DatasetGraph {
    let family = roles
        .gene
        .as_ref()
        .map(|column| GeneFamily::from_column(&column.name))
        .unwrap_or(GeneFamily::Symbol);
    let mut graph = emitter.open_dataset(dataset, source_id, family);
    let needed = roles.max_index().map_or(0, |max| max + 1);
    for (line, row) in table.rows.iter().enumerate() {
        if row.len() < needed {
            let err = AkgError::MalformedRow {
                line: line + 2,
                expected: needed,
                found: row.len(),
            };
            warn!("{dataset}: {err}, row skipped");
            continue;
        }
        graph.push_row(row_values(row, roles), index);
    }
    graph
}

impl StageTransform for ExtractStage<'_> {
    fn output_stage(&self) -> Stage {
        Stage::TripleExtracted
    }

    fn transform(&mut self, entry: &ProvenanceEntry) -> Result<Vec<ProvenanceEntry>, AkgError> {
        let path = entry.file_path();
        let table = read_csv(&path, entry.header_skip)?;
        let roles = resolve_roles(&table.headers, &RoleOverrides::from_entry(entry))?;
        if roles.is_empty() {
            return Err(AkgError::NoRelevantColumn {
                path: path.into_std_path_buf(),
                role: "gene, p-value or fold change".to_string(),
            });
        }

        let dataset = file_stem(&entry.filename).to_string();
        self.note_dataset(&dataset, &entry.source_id);
        let mut emitter = TripleEmitter::new(&mut self.uuids);
        let mut graph = extract_table(
            &mut emitter,
            self.index,
            &table,
            &roles,
            &dataset,
            &entry.source_id,
        );
        if let Some(articles) = self.articles {
            graph.extend(articles.triples_for(&entry.source_id));
        }

        // dataset ids must be on disk before the ledger records this file as extracted
        if self.uuids.is_dirty() {
            self.uuids.save()?;
        }

        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let output = Store::output_path(
            dir,
            &format!("graph_{}", stage_stem(&entry.filename, "cleaned_")),
            &dataset,
            "nt",
        );
        graph.write(&output)?;

        let summary = graph.summary();
        self.totals.rows += summary.rows;
        self.totals.matched += summary.matched;
        self.totals.unmatched += summary.unmatched;
        info!(
            "{path}: {} rows, {} genes matched, {} unmatched -> {output}",
            summary.rows, summary.matched, summary.unmatched
        );

        let mut next = ProvenanceEntry::derive_from(entry, Stage::TripleExtracted, &output);
        next.gene_column = roles.gene.map(|column| column.name).unwrap_or_default();
        next.pvalue_column = roles.pvalue.map(|column| column.name).unwrap_or_default();
        next.lfc_column = roles
            .fold_change
            .map(|column| column.name)
            .unwrap_or_default();
        next.output_graph_file = output.to_string();
        next.matched_count = summary.matched;
        next.unmatched_count = summary.unmatched;
        next.cleaned = entry.cleaned;
        next.suitable = entry.suitable;
        next.suitable_reason = entry.suitable_reason.clone();
        Ok(vec![next])
    }
}
