use camino::Utf8Path;
use tracing::{debug, info};

use crate::domain::Stage;
use crate::error::AkgError;
use crate::ledger::ProvenanceEntry;
use crate::stages::{StageTransform, sanitize_name};
use crate::store::{Store, file_stem};
use crate::table::{Table, read_delimited, write_csv};
use crate::workbook::WorkbookReader;

pub struct SplitStage<W: WorkbookReader> {
    reader: W,
}

impl<W: WorkbookReader> SplitStage<W> {
    pub fn new(reader: W) -> Self {
        Self { reader }
    }

    fn write_table(
        &self,
        entry: &ProvenanceEntry,
        name: &str,
        table: &Table,
    ) -> Result<ProvenanceEntry, AkgError> {
        let source = entry.file_path();
        let dir = source.parent().unwrap_or_else(|| Utf8Path::new("."));
        let output = Store::output_path(
            dir,
            &format!("split_{}", sanitize_name(name)),
            file_stem(&entry.filename),
            "csv",
        );
        write_csv(&output, table)?;
        info!("saved {name} as {output}");
        Ok(ProvenanceEntry::derive_from(entry, Stage::Split, &output))
    }
}

fn extension(filename: &str) -> String {
    let lower = filename.to_lowercase();
    let lower = lower.strip_suffix(".gz").unwrap_or(&lower);
    lower
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

impl<W: WorkbookReader> StageTransform for SplitStage<W> {
    fn output_stage(&self) -> Stage {
        Stage::Split
    }

    fn transform(&mut self, entry: &ProvenanceEntry) -> Result<Vec<ProvenanceEntry>, AkgError> {
        let path = entry.file_path();
        match extension(&entry.filename).as_str() {
            "xlsx" | "xlsm" => {
                let mut outputs = Vec::new();
                for sheet in self.reader.read_sheets(&path)? {
                    if sheet.table.headers.is_empty() {
                        debug!("sheet '{}' of {path} is empty", sheet.name);
                        continue;
                    }
                    outputs.push(self.write_table(entry, &sheet.name, &sheet.table)?);
                }
                Ok(outputs)
            }
            "csv" | "tsv" | "txt" => {
                let table = read_delimited(&path, entry.header_skip)?;
                Ok(vec![self.write_table(entry, file_stem(&entry.filename), &table)?])
            }
            "xls" => Err(AkgError::FileRead {
                path: path.into_std_path_buf(),
                message: "legacy .xls workbooks are not supported, save as .xlsx".to_string(),
            }),
            other => Err(AkgError::FileRead {
                path: path.into_std_path_buf(),
                message: format!("unsupported file type '{other}'"),
            }),
        }
    }
}
