use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AkgError;
use crate::gene_index::GeneIndex;
use crate::ntriples::ns;
use crate::table::{read_csv, write_csv};

pub const SHORTNAME_COLUMN: &str = "shortname";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnnotateResult {
    pub rows: usize,
    pub annotated: usize,
}

pub fn shortname(row: &[String], index: &GeneIndex) -> String {
    row.iter()
        .find_map(|field| field.trim().strip_prefix(ns::MONARCH))
        .and_then(|identifier| index.symbol(identifier))
        .unwrap_or_default()
        .to_string()
}

pub fn annotate_csv(
    input: &Utf8Path,
    output: &Utf8Path,
    index: &GeneIndex,
) -> Result<AnnotateResult, AkgError> {
    let mut table = read_csv(input, 0)?;
    if table.headers.is_empty() {
        warn!("{input} is empty, nothing to annotate");
    }
    table.headers.push(SHORTNAME_COLUMN.to_string());
    let mut annotated = 0;
    for row in &mut table.rows {
        let name = shortname(row, index);
        if !name.is_empty() {
            annotated += 1;
        }
        row.push(name);
    }
    write_csv(output, &table)?;
    info!("annotated {annotated} of {} rows -> {output}", table.rows.len());
    Ok(AnnotateResult {
        rows: table.rows.len(),
        annotated,
    })
}
