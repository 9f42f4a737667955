use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use tracing::{debug, info};

use crate::columns::{
    FOLD_CHANGE_VOCABULARY, PVALUE_VOCABULARY, canonicalize_header, find_header,
    matches_vocabulary,
};
use crate::domain::Stage;
use crate::error::AkgError;
use crate::ledger::ProvenanceEntry;
use crate::stages::{StageTransform, stage_stem};
use crate::store::{Store, file_stem};
use crate::table::{Table, is_missing, is_numeric, read_csv, write_csv};

static ENSEMBL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ENS(G|T)").expect("valid regex"));

const ENSEMBL_MIN_HITS: usize = 4;

#[derive(Debug, Default)]
pub struct CleanStage;

pub fn check_mixed_types(path: &Utf8Path, table: &Table) -> Result<(), AkgError> {
    for (index, header) in table.headers.iter().enumerate() {
        if !matches_vocabulary(header, PVALUE_VOCABULARY)
            && !matches_vocabulary(header, FOLD_CHANGE_VOCABULARY)
        {
            continue;
        }
        let mut numeric = false;
        let mut text = false;
        for value in table.column_values(index).filter(|value| !is_missing(value)) {
            if is_numeric(value) {
                numeric = true;
            } else {
                text = true;
            }
        }
        if numeric && text {
            return Err(AkgError::MixedTypes {
                path: path.to_path_buf().into_std_path_buf(),
                column: header.clone(),
            });
        }
    }
    Ok(())
}

pub fn drop_sparse_rows(table: &mut Table) -> usize {
    let width = table.width();
    let limit = width / 4;
    let before = table.rows.len();
    table.rows.retain(|row| {
        let missing = (0..width)
            .filter(|idx| row.get(*idx).is_none_or(|value| is_missing(value)))
            .count();
        missing <= limit
    });
    before - table.rows.len()
}

pub fn find_ensembl_column(table: &Table) -> Option<usize> {
    (0..table.width()).find(|index| {
        let present = table
            .column_values(*index)
            .filter(|value| !is_missing(value))
            .collect::<Vec<_>>();
        let hits = present
            .iter()
            .filter(|value| ENSEMBL_VALUE.is_match(value.trim()))
            .count();
        hits >= ENSEMBL_MIN_HITS && hits * 2 > present.len()
    })
}

fn map_override(original: &[String], cleaned: &[String], name: &str) -> String {
    if name.trim().is_empty() {
        return String::new();
    }
    match find_header(original, name) {
        Some(index) => cleaned[index].clone(),
        None => canonicalize_header(name),
    }
}

impl StageTransform for CleanStage {
    fn output_stage(&self) -> Stage {
        Stage::Cleaned
    }

    fn transform(&mut self, entry: &ProvenanceEntry) -> Result<Vec<ProvenanceEntry>, AkgError> {
        let path = entry.file_path();
        let mut table = read_csv(&path, entry.header_skip)?;
        check_mixed_types(&path, &table)?;

        let dropped = drop_sparse_rows(&mut table);
        if dropped > 0 {
            debug!("{path}: dropped {dropped} sparse rows");
        }

        let original = table.headers.clone();
        table.headers = original.iter().map(|h| canonicalize_header(h)).collect();
        if let Some(index) = find_ensembl_column(&table) {
            let taken = table
                .headers
                .iter()
                .enumerate()
                .any(|(other, header)| other != index && header == "ensembl");
            if !taken && table.headers[index] != "ensembl" {
                info!("{path}: renaming column '{}' to 'ensembl'", table.headers[index]);
                table.headers[index] = "ensembl".to_string();
            }
        }

        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let output = Store::output_path(
            dir,
            &format!("cleaned_{}", stage_stem(&entry.filename, "expdata_")),
            file_stem(&entry.filename),
            "csv",
        );
        write_csv(&output, &table)?;
        info!("cleaned {path} -> {output}");

        let mut next = ProvenanceEntry::derive_from(entry, Stage::Cleaned, &output);
        next.cleaned = true;
        next.gene_column = map_override(&original, &table.headers, &entry.gene_column);
        next.pvalue_column = map_override(&original, &table.headers, &entry.pvalue_column);
        next.lfc_column = map_override(&original, &table.headers, &entry.lfc_column);
        next.suitable = entry.suitable;
        next.suitable_reason = entry.suitable_reason.clone();
        Ok(vec![next])
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn mixed_statistic_column_is_rejected() {
        let t = table(&["gene", "padj"], &[&["A", "0.1"], &["B", "n.s."], &["C", "NA"]]);
        assert_matches!(
            check_mixed_types(Utf8Path::new("x.csv"), &t),
            Err(AkgError::MixedTypes { column, .. }) if column == "padj"
        );
        let t = table(&["gene", "note"], &[&["A", "1"], &["B", "text"]]);
        assert!(check_mixed_types(Utf8Path::new("x.csv"), &t).is_ok());
    }

    #[test]
    fn sparse_rows_are_dropped() {
        let mut t = table(
            &["a", "b", "c", "d"],
            &[&["1", "2", "3", "4"], &["1", "", "3", "4"], &["1", "", "NA", "4"], &["1"]],
        );
        assert_eq!(drop_sparse_rows(&mut t), 2);
        assert_eq!(t.rows.len(), 2);
    }

    #[test]
    fn ensembl_column_needs_enough_hits() {
        let few = table(&["id", "x"], &[&["ENSG1", "1"], &["ENSG2", "1"], &["ENSG3", "1"]]);
        assert_eq!(find_ensembl_column(&few), None);
        let many = table(
            &["x", "id"],
            &[&["1", "ENSG1"], &["1", "ensg2"], &["1", "ENST3"], &["1", "ENSG4"], &["1", "TP53"]],
        );
        assert_eq!(find_ensembl_column(&many), Some(1));
    }

    #[test]
    fn writes_cleaned_file_and_maps_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let input = dir.join("expdata_S1.csv");
        fs::write(
            input.as_std_path(),
            "Gene ID,Adj P-Value,log2 (FC)\nENSG1,0.1,1\nENSG2,0.2,2\nENSG3,0.3,3\nENSG4,0.4,4\n,,\n",
        )
        .unwrap();
        let raw = ProvenanceEntry::downloaded(&dir, "raw.csv", "1");
        let mut entry = ProvenanceEntry::derive_from(&raw, Stage::Normalized, &input);
        entry.lfc_column = "log2 (FC)".to_string();
        entry.pvalue_column = "Adj P-Value".to_string();

        let outputs = CleanStage.transform(&entry).unwrap();
        let next = &outputs[0];
        assert_eq!(next.filename, "cleaned_S1.csv");
        assert!(next.cleaned);
        assert_eq!(next.lfc_column, "log2fc");
        assert_eq!(next.pvalue_column, "adjpvalue");
        assert_eq!(next.gene_column, "");
        let written = fs::read_to_string(next.file_path().as_std_path()).unwrap();
        assert!(written.starts_with("ensembl,adjpvalue,log2fc\n"));
        assert_eq!(written.lines().count(), 5);
    }
}
