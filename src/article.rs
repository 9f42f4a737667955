use std::collections::HashMap;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AkgError;
use crate::ntriples::{Term, Triple, ns};
use crate::table::{decode_text, read_bytes};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticleRecord {
    pub pmid: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub journal: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleMetadata {
    records: HashMap<String, ArticleRecord>,
}

impl ArticleMetadata {
    pub fn load(path: &Utf8Path) -> Result<Self, AkgError> {
        let text = decode_text(&read_bytes(path)?);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut records = HashMap::new();
        for (line, record) in reader.deserialize::<ArticleRecord>().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warn!("{path}: skipping article row {}: {err}", line + 2);
                    continue;
                }
            };
            let pmid = record.pmid.trim().to_string();
            if pmid.is_empty() {
                continue;
            }
            records.entry(pmid).or_insert(record);
        }
        debug!("loaded metadata for {} articles from {path}", records.len());
        Ok(Self { records })
    }

    pub fn get(&self, source_id: &str) -> Option<&ArticleRecord> {
        self.records.get(source_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn triples_for(&self, source_id: &str) -> Vec<Triple> {
        let Some(record) = self.get(source_id) else {
            return Vec::new();
        };
        let article = Term::iri(ns::PMC, source_id);
        let mut triples = Vec::new();
        let mut add = |predicate: &str, object: Term| {
            triples.push(Triple::new(article.clone(), Term::iri(ns::DCT, predicate), object));
        };
        if !record.doi.trim().is_empty() {
            add("identifier", Term::iri(ns::DOI, record.doi.trim()));
        }
        if !record.title.trim().is_empty() {
            add("title", Term::literal(record.title.trim()));
        }
        if !record.year.trim().is_empty() {
            add("date", Term::literal(record.year.trim()));
        }
        if !record.journal.trim().is_empty() {
            add("publisher", Term::literal(record.journal.trim()));
        }
        triples
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn metadata_triples() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("articles.csv");
        fs::write(
            path.as_std_path(),
            "pmid,doi,title,year,journal\n12345678,10.1/abc,\"Autism, genes\",2021,\n,10.2/x,orphan,2020,J\n",
        )
        .unwrap();
        let metadata = ArticleMetadata::load(&path).unwrap();
        assert_eq!(metadata.len(), 1);

        let triples = metadata.triples_for("12345678");
        assert_eq!(triples.len(), 3);
        assert_eq!(
            triples[0].to_string(),
            "<https://pubmed.ncbi.nlm.nih.gov/12345678> <http://purl.org/dc/terms/identifier> <https://doi.org/10.1/abc> ."
        );
        assert!(metadata.triples_for("999").is_empty());
    }
}
