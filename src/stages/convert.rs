use camino::Utf8Path;
use tracing::info;

use crate::columns::{FOLD_CHANGE_VOCABULARY, detect_column, find_header};
use crate::domain::Stage;
use crate::error::AkgError;
use crate::ledger::ProvenanceEntry;
use crate::stages::{StageTransform, sanitize_name, stage_stem};
use crate::store::{Store, file_stem};
use crate::table::{read_delimited, write_csv};

#[derive(Debug, Default)]
pub struct ConvertStage;

impl StageTransform for ConvertStage {
    fn output_stage(&self) -> Stage {
        Stage::Normalized
    }

    fn transform(&mut self, entry: &ProvenanceEntry) -> Result<Vec<ProvenanceEntry>, AkgError> {
        let path = entry.file_path();
        let table = read_delimited(&path, entry.header_skip)?;

        let override_name = entry.lfc_column.trim();
        let fold_change = if override_name.is_empty() {
            detect_column(&table.headers, FOLD_CHANGE_VOCABULARY).ok_or_else(|| {
                AkgError::NoRelevantColumn {
                    path: path.clone().into_std_path_buf(),
                    role: "fold change".to_string(),
                }
            })?
        } else {
            let index = find_header(&table.headers, override_name).ok_or_else(|| {
                AkgError::Configuration(format!(
                    "lfc_column '{override_name}' of {path} is not in its header"
                ))
            })?;
            info!("using lfc_column from the tracking file: {override_name}");
            table.headers[index].clone()
        };
        info!("fold change column of {path} is '{fold_change}'");

        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let output = Store::output_path(
            dir,
            &format!("expdata_{}", sanitize_name(stage_stem(&entry.filename, "split_"))),
            file_stem(&entry.filename),
            "csv",
        );
        write_csv(&output, &table)?;

        let mut next = ProvenanceEntry::derive_from(entry, Stage::Normalized, &output);
        next.lfc_column = fold_change;
        next.gene_column = entry.gene_column.clone();
        next.pvalue_column = entry.pvalue_column.clone();
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

    fn split_entry(dir: &Utf8Path, name: &str, content: &str) -> ProvenanceEntry {
        fs::write(dir.join(name).as_std_path(), content).unwrap();
        let raw = ProvenanceEntry::downloaded(dir, "raw.xlsx", "12345678");
        ProvenanceEntry::derive_from(&raw, Stage::Split, &dir.join(name))
    }

    #[test]
    fn skips_preamble_and_detects_fold_change() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mut entry = split_entry(
            &dir,
            "split_Sheet1.csv",
            "Supplementary table 3,\n,\nGene,logFC,log2FoldChange\nTP53,1,2\n",
        );
        entry.header_skip = 2;
        entry.gene_column = "Gene".to_string();

        let outputs = ConvertStage.transform(&entry).unwrap();
        let next = &outputs[0];
        assert_eq!(next.filename, "expdata_Sheet1.csv");
        assert_eq!(next.header_skip, 0);
        assert_eq!(next.lfc_column, "log2FoldChange");
        assert_eq!(next.gene_column, "Gene");
        assert_eq!(
            fs::read_to_string(next.file_path().as_std_path()).unwrap(),
            "Gene,logFC,log2FoldChange\nTP53,1,2\n"
        );
    }

    #[test]
    fn no_fold_change_column_is_recoverable() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let entry = split_entry(&dir, "split_meta.csv", "sample,age\nA,3\n");
        let err = ConvertStage.transform(&entry).unwrap_err();
        assert_matches!(err, AkgError::NoRelevantColumn { .. });
        assert!(err.is_recoverable());
    }

    #[test]
    fn missing_override_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mut entry = split_entry(&dir, "split_x.csv", "gene,fc\nA,1\n");
        entry.lfc_column = "effect".to_string();
        let err = ConvertStage.transform(&entry).unwrap_err();
        assert_matches!(err, AkgError::Configuration(_));
        assert!(!err.is_recoverable());
    }
}
