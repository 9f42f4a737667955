use std::collections::{BTreeMap, HashMap};
use std::fs;

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::domain::CanonicalId;
use crate::error::AkgError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneIndexOptions {
    pub alternate_column: String,
    pub symbol_column: String,
    pub canonical_prefix: String,
    pub alternate_prefix: String,
}

impl Default for GeneIndexOptions {
    fn default() -> Self {
        Self {
            alternate_column: "ensembl_gene_id".to_string(),
            symbol_column: "symbol".to_string(),
            canonical_prefix: "HGNC:".to_string(),
            alternate_prefix: "ENSG".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneIndex {
    alternates: HashMap<String, CanonicalId>,
    by_canonical: BTreeMap<CanonicalId, Vec<String>>,
    symbols: HashMap<CanonicalId, String>,
    lines: Vec<String>,
}

impl GeneIndex {
    pub fn from_path(path: &Utf8Path, options: &GeneIndexOptions) -> Result<Self, AkgError> {
        let text = fs::read_to_string(path.as_std_path())
            .map_err(|err| AkgError::ReferenceTable(format!("{path}: {err}")))?;
        let index = Self::build(&text, options);
        debug!(
            "gene index from {path}: {} alternate ids, {} canonical ids",
            index.len(),
            index.by_canonical.len()
        );
        Ok(index)
    }

    pub fn build(text: &str, options: &GeneIndexOptions) -> Self {
        let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));
        let Some(header) = lines.next() else {
            return Self::default();
        };
        let column_of = |name: &str| {
            header
                .split('\t')
                .position(|column| column.trim().eq_ignore_ascii_case(name))
        };
        let alternate_idx = column_of(&options.alternate_column);
        let symbol_idx = column_of(&options.symbol_column);
        if alternate_idx.is_none() {
            warn!(
                "reference table has no '{}' column, only substring lookup is available",
                options.alternate_column
            );
        }

        let canonical_prefix = options.canonical_prefix.to_uppercase();
        let alternate_prefix = options.alternate_prefix.to_uppercase();
        let mut index = Self::default();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            index.lines.push(line.to_uppercase());

            let fields = line.split('\t').map(str::trim).collect::<Vec<_>>();
            let canonical_raw = fields.first().copied().unwrap_or_default();
            if !canonical_raw.to_uppercase().starts_with(&canonical_prefix) {
                continue;
            }
            let canonical = CanonicalId::new(canonical_raw);

            if let Some(symbol) = symbol_idx.and_then(|idx| fields.get(idx)) {
                if !symbol.is_empty() {
                    index
                        .symbols
                        .entry(canonical.clone())
                        .or_insert_with(|| symbol.to_string());
                }
            }

            let Some(alternate) = alternate_idx.and_then(|idx| fields.get(idx)) else {
                continue;
            };
            let alternate = alternate.to_uppercase();
            if alternate.is_empty() || !alternate.starts_with(&alternate_prefix) {
                continue;
            }
            if index.alternates.contains_key(&alternate) {
                continue;
            }
            index
                .by_canonical
                .entry(canonical.clone())
                .or_default()
                .push(alternate.clone());
            index.alternates.insert(alternate, canonical);
        }
        index
    }

    /// Case-insensitive lookup. `None` means unresolved, which is a normal outcome.
    pub fn resolve(&self, identifier: &str) -> Option<CanonicalId> {
        let query = identifier.trim().to_uppercase();
        if query.is_empty() {
            return None;
        }
        if let Some(canonical) = self.alternates.get(&query) {
            return Some(canonical.clone());
        }
        // versioned accessions, e.g. ENSG00000141510.17
        if let Some((base, _)) = query.split_once('.') {
            if let Some(canonical) = self.alternates.get(base) {
                return Some(canonical.clone());
            }
        }
        self.lines
            .iter()
            .find(|line| line.contains(&query))
            .and_then(|line| line.split('\t').next())
            .map(str::trim)
            .filter(|first| !first.is_empty())
            .map(CanonicalId::new)
    }

    pub fn alternates_of(&self, canonical: &str) -> &[String] {
        self.by_canonical
            .get(&CanonicalId::new(canonical))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn symbol(&self, canonical: &str) -> Option<&str> {
        self.symbols
            .get(&CanonicalId::new(canonical))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.alternates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternates.is_empty() && self.lines.is_empty()
    }
}
