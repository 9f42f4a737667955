use std::fs;
use std::io::Read;

use camino::Utf8Path;
use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::AkgError;
use crate::store::Store;

pub const DELIMITERS: [u8; 3] = [b'\t', b',', b';'];

const MISSING_TOKENS: [&str; 7] = ["", "na", "nan", "n/a", "null", "#n/a", "none"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(column).map(String::as_str))
    }
}

pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    MISSING_TOKENS
        .iter()
        .any(|token| value.eq_ignore_ascii_case(token))
}

pub fn is_numeric(value: &str) -> bool {
    let value = value.trim();
    !is_missing(value) && value.parse::<f64>().is_ok_and(f64::is_finite)
}

fn file_read(path: &Utf8Path, message: impl Into<String>) -> AkgError {
    AkgError::FileRead {
        path: path.to_path_buf().into_std_path_buf(),
        message: message.into(),
    }
}

pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>, AkgError> {
    let raw = fs::read(path.as_std_path()).map_err(|err| file_read(path, err.to_string()))?;
    if !path.as_str().to_lowercase().ends_with(".gz") {
        return Ok(raw);
    }
    let mut decoded = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|err| file_read(path, format!("gzip: {err}")))?;
    Ok(decoded)
}

pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}

fn skip_lines(text: &str, skip: u32) -> &str {
    let mut rest = text;
    for _ in 0..skip {
        match rest.find('\n') {
            Some(idx) => rest = &rest[idx + 1..],
            None => return "",
        }
    }
    rest
}

fn parse(text: &str, delimiter: u8) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => record?.iter().map(|field| field.trim().to_string()).collect(),
        None => Vec::new(),
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

pub fn read_delimited(path: &Utf8Path, skip: u32) -> Result<Table, AkgError> {
    let text = decode_text(&read_bytes(path)?);
    let text = skip_lines(&text, skip);
    for delimiter in DELIMITERS {
        match parse(text, delimiter) {
            Ok(table) if table.headers.len() >= 2 => {
                debug!(
                    "read {path} with delimiter {:?}: {} columns, {} rows",
                    char::from(delimiter),
                    table.width(),
                    table.rows.len()
                );
                return Ok(table);
            }
            Ok(_) => {}
            Err(err) => debug!("{path} with delimiter {:?}: {err}", char::from(delimiter)),
        }
    }
    Err(file_read(
        path,
        "no tab, comma or semicolon delimited header found",
    ))
}

pub fn read_csv(path: &Utf8Path, skip: u32) -> Result<Table, AkgError> {
    let text = decode_text(&read_bytes(path)?);
    parse(skip_lines(&text, skip), b',').map_err(|err| file_read(path, err.to_string()))
}

pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>, AkgError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|err| AkgError::Filesystem(err.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| AkgError::Filesystem(err.to_string()))
}

pub fn write_csv(path: &Utf8Path, table: &Table) -> Result<(), AkgError> {
    Store::write_bytes_atomic(path, &to_csv_bytes(table)?)
}
