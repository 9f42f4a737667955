use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;

use crate::error::AkgError;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

pub trait WorkbookReader {
    fn read_sheets(&self, path: &Utf8Path) -> Result<Vec<Sheet>, AkgError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxReader;

impl WorkbookReader for XlsxReader {
    fn read_sheets(&self, path: &Utf8Path) -> Result<Vec<Sheet>, AkgError> {
        let fail = |message: String| AkgError::FileRead {
            path: path.to_path_buf().into_std_path_buf(),
            message,
        };
        let file = File::open(path.as_std_path()).map_err(|err| fail(err.to_string()))?;
        let mut archive =
            ZipArchive::new(file).map_err(|err| fail(format!("not a workbook: {err}")))?;

        let workbook = read_part(&mut archive, "xl/workbook.xml")
            .map_err(&fail)?
            .ok_or_else(|| fail("missing xl/workbook.xml".to_string()))?;
        let rels = read_part(&mut archive, "xl/_rels/workbook.xml.rels")
            .map_err(&fail)?
            .unwrap_or_default();
        let shared = match read_part(&mut archive, "xl/sharedStrings.xml").map_err(&fail)? {
            Some(xml) => parse_shared_strings(&xml).map_err(&fail)?,
            None => Vec::new(),
        };

        let targets = parse_relationships(&rels).map_err(&fail)?;
        let mut sheets = Vec::new();
        for (name, rel_id) in parse_sheet_list(&workbook).map_err(&fail)? {
            let Some(target) = targets.get(&rel_id) else {
                return Err(fail(format!("sheet '{name}' has no relationship {rel_id}")));
            };
            let part = resolve_target(target);
            let xml = read_part(&mut archive, &part)
                .map_err(&fail)?
                .ok_or_else(|| fail(format!("missing worksheet part {part}")))?;
            let table = parse_worksheet(&xml, &shared).map_err(&fail)?;
            sheets.push(Sheet { name, table });
        }
        Ok(sheets)
    }
}

fn read_part(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>, String> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.to_string()),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|err| format!("{name}: {err}"))?;
    Ok(Some(content))
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, String> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name")?.unwrap_or_default();
                let Some(rel_id) = attribute(&e, b"id")? else {
                    return Err(format!("sheet '{name}' without r:id"));
                };
                sheets.push((name, rel_id));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();
    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attribute(&e, b"Id")?, attribute(&e, b"Target")?)
                {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(targets)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the text in another script
    let mut in_phonetic = false;
    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Text(e) if in_text => {
                current.push_str(&e.unescape().map_err(|err| err.to_string())?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

fn column_index(reference: &str) -> Option<usize> {
    let letters = reference
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>();
    if letters.is_empty() {
        return None;
    }
    let number = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, byte| acc * 26 + usize::from(byte - b'A' + 1));
    Some(number - 1)
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: String,
    value: String,
}

fn parse_worksheet(xml: &str, shared: &[String]) -> Result<Table, String> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut capture = false;

    let finish_cell = |row: &mut Vec<String>, cell: CellState| -> Result<(), String> {
        let text = match cell.kind.as_str() {
            "s" => {
                let idx = cell
                    .value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("bad shared string index '{}'", cell.value))?;
                shared
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| format!("shared string {idx} out of range"))?
            }
            "b" => match cell.value.trim() {
                "1" => "TRUE".to_string(),
                _ => "FALSE".to_string(),
            },
            _ => cell.value,
        };
        if row.len() <= cell.column {
            row.resize(cell.column + 1, String::new());
        }
        row[cell.column] = text;
        Ok(())
    };

    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    let column = attribute(&e, b"r")?
                        .and_then(|reference| column_index(&reference))
                        .unwrap_or(row.len());
                    let kind = attribute(&e, b"t")?.unwrap_or_default();
                    cell = Some(CellState {
                        column,
                        kind,
                        value: String::new(),
                    });
                }
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => rows.push(Vec::new()),
            Event::Text(e) if capture => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&e.unescape().map_err(|err| err.to_string())?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        finish_cell(&mut row, done)?;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let rows = rows
        .into_iter()
        .filter(|row| row.iter().any(|value| !value.trim().is_empty()))
        .collect::<Vec<_>>();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows = rows.into_iter().map(|mut row| {
        row.resize(width, String::new());
        row
    });
    let headers = rows
        .next()
        .map(|row| row.into_iter().map(|value| value.trim().to_string()).collect())
        .unwrap_or_default();
    Ok(Table::new(headers, rows.collect()))
}
