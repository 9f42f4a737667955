use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::GeneFamily;
use crate::error::AkgError;
use crate::gene_index::GeneIndex;
use crate::ntriples::{Term, Triple, ns, tidy_text};
use crate::store::{ROW_LABELS_SUFFIX, Store};
use crate::table::is_missing;
use crate::uuid_store::UuidStore;

pub struct TripleEmitter<'a> {
    uuids: &'a mut UuidStore,
}

impl<'a> TripleEmitter<'a> {
    pub fn new(uuids: &'a mut UuidStore) -> Self {
        Self { uuids }
    }

    pub fn open_dataset(
        &mut self,
        name: &str,
        source_id: &str,
        gene_family: GeneFamily,
    ) -> DatasetGraph {
        let dataset = self.uuids.get_or_create(name);
        let article = Term::iri(ns::PMC, source_id);
        let dataset_term = Term::iri(ns::URN, &dataset.to_string());
        let triples = vec![
            Triple::new(
                article.clone(),
                Term::iri(ns::EDAM, "has_output"),
                dataset_term.clone(),
            ),
            Triple::new(
                article,
                Term::iri(ns::RDF, "type"),
                Term::iri(ns::DCT, "identifier"),
            ),
        ];
        DatasetGraph {
            dataset,
            dataset_term,
            gene_family,
            triples,
            labels: BTreeMap::new(),
            summary: EmitSummary::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowValues<'r> {
    pub gene: Option<&'r str>,
    pub pvalue: Option<&'r str>,
    pub fold_change: Option<&'r str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
    pub rows: u64,
    pub matched: u64,
    pub unmatched: u64,
}

#[derive(Debug)]
pub struct DatasetGraph {
    dataset: Uuid,
    dataset_term: Term,
    gene_family: GeneFamily,
    triples: Vec<Triple>,
    labels: BTreeMap<String, String>,
    summary: EmitSummary,
}

// Placeholder cells carry no data and produce no statement.
fn present(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|value| !is_missing(value) && *value != "-")
}

impl DatasetGraph {
    pub fn dataset_id(&self) -> Uuid {
        self.dataset
    }

    pub fn summary(&self) -> EmitSummary {
        self.summary
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn extend(&mut self, triples: impl IntoIterator<Item = Triple>) {
        self.triples.extend(triples);
    }

    pub fn push_row(&mut self, values: RowValues<'_>, index: &GeneIndex) -> Term {
        self.summary.rows += 1;
        let row = Term::iri(ns::URN, &Uuid::new_v4().to_string());
        if let Term::Iri(iri) = &row {
            self.labels
                .insert(iri.clone(), format!("row {}", self.summary.rows));
        }
        self.triples.push(Triple::new(
            self.dataset_term.clone(),
            Term::iri(ns::EDAM, "has_output"),
            row.clone(),
        ));

        if let Some(gene) = present(values.gene) {
            match index.resolve(gene) {
                Some(canonical) => {
                    self.summary.matched += 1;
                    self.triples.push(Triple::new(
                        row.clone(),
                        Term::iri(ns::BIOLINK, "Gene"),
                        Term::iri(ns::MONARCH, canonical.as_str()),
                    ));
                }
                None => {
                    self.summary.unmatched += 1;
                    let predicate = match self.gene_family {
                        GeneFamily::Ensembl => Term::iri(ns::ENSEMBL, "id"),
                        GeneFamily::Ncbi => Term::iri(ns::NCBIGENE, "id"),
                        GeneFamily::Symbol => Term::iri(ns::BIOLINK, "symbol"),
                    };
                    self.triples
                        .push(Triple::new(row.clone(), predicate, Term::literal(gene)));
                }
            }
        }
        if let Some(pvalue) = present(values.pvalue) {
            self.triples.push(Triple::new(
                row.clone(),
                Term::iri(ns::EDAM, "data_1669"),
                Term::literal(pvalue),
            ));
        }
        if let Some(fold_change) = present(values.fold_change) {
            self.triples.push(Triple::new(
                row.clone(),
                Term::iri(ns::EDAM, "data_3754"),
                Term::literal(fold_change),
            ));
        }
        row
    }

    pub fn render(&self) -> String {
        let mut raw = String::new();
        for triple in &self.triples {
            raw.push_str(&triple.to_string());
            raw.push('\n');
        }
        tidy_text(&raw).0
    }

    pub fn write(&self, path: &Utf8Path) -> Result<Utf8PathBuf, AkgError> {
        Store::write_bytes_atomic(path, self.render().as_bytes())?;
        let labels_path = row_labels_path(path);
        let labels = serde_json::to_string_pretty(&self.labels)
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&labels_path, labels.as_bytes())?;
        debug!(
            "wrote {} triples to {path} ({} rows)",
            self.triples.len(),
            self.summary.rows
        );
        Ok(labels_path)
    }
}

pub fn row_labels_path(graph_file: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{graph_file}{ROW_LABELS_SUFFIX}"))
}
