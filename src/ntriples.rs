use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::{Captures, Regex};
use tracing::info;

use crate::error::AkgError;
use crate::store::Store;

pub mod ns {
    pub const BIOLINK: &str = "https://w3id.org/biolink/vocab/";
    pub const ENSEMBL: &str = "http://identifiers.org/ensembl/";
    pub const NCBIGENE: &str = "http://identifiers.org/ncbigene/";
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const EDAM: &str = "http://edamontology.org/";
    pub const DOI: &str = "https://doi.org/";
    pub const DCT: &str = "http://purl.org/dc/terms/";
    pub const PMC: &str = "https://pubmed.ncbi.nlm.nih.gov/";
    pub const MONARCH: &str = "https://monarchinitiative.org/";
    pub const URN: &str = "urn:uuid:";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
}

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(-?\d+(\.\d+)?([eE][-+]?\d+)?)""#).expect("valid regex"));
static EMPTY_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+"(\s*|-)"(\^\^<[^>]+>)?\s*\.$"#).expect("valid regex"));
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<http://purl\.org/dc/terms/date>\s+"(\d+)"\s+\.$"#).expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Literal(String),
    Typed { value: String, datatype: String },
}

impl Term {
    pub fn iri(namespace: &str, local: &str) -> Self {
        Term::Iri(format!("{namespace}{local}"))
    }

    pub fn literal(value: &str) -> Self {
        Term::Literal(value.to_string())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", escape_iri(iri)),
            Term::Literal(value) => write!(f, "\"{}\"", escape_literal(value)),
            Term::Typed { value, datatype } => {
                write!(f, "\"{}\"^^<{}>", escape_literal(value), escape_iri(datatype))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

pub fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len());
    for c in iri.chars() {
        if c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `None` means the line is dropped.
pub fn tidy_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() || EMPTY_LITERAL.is_match(line) {
        return None;
    }
    if line.contains("http://purl.org/dc/terms/date") {
        let typed = format!(
            r#"<http://purl.org/dc/terms/date> "${{1}}"^^<{}gYear> ."#,
            ns::XSD
        );
        return Some(DATE.replace(line, typed.as_str()).into_owned());
    }
    let tidied = DECIMAL.replace_all(line, |caps: &Captures<'_>| {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if line[whole.end..].starts_with("^^") {
            caps[0].to_string()
        } else {
            format!("\"{}\"^^<{}double>", &caps[1], ns::XSD)
        }
    });
    Some(tidied.into_owned())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TidyStats {
    pub kept: usize,
    pub dropped: usize,
}

pub fn tidy_text(text: &str) -> (String, TidyStats) {
    let mut stats = TidyStats::default();
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        match tidy_line(line) {
            Some(line) => {
                stats.kept += 1;
                out.push_str(&line);
                out.push('\n');
            }
            None => stats.dropped += 1,
        }
    }
    (out, stats)
}

pub fn tidy_file(input: &Utf8Path, output: &Utf8Path) -> Result<TidyStats, AkgError> {
    let text = fs::read_to_string(input.as_std_path()).map_err(|err| AkgError::FileRead {
        path: input.to_path_buf().into_std_path_buf(),
        message: err.to_string(),
    })?;
    let (tidied, stats) = tidy_text(&text);
    Store::write_bytes_atomic(output, tidied.as_bytes())?;
    info!(
        "tidied {input} -> {output}: {} kept, {} dropped",
        stats.kept, stats.dropped
    );
    Ok(stats)
}

pub fn combine(files: &[impl AsRef<Utf8Path>], output: &Utf8Path) -> Result<usize, AkgError> {
    let mut lines = BTreeSet::new();
    for file in files {
        let file = file.as_ref();
        let text = fs::read_to_string(file.as_std_path()).map_err(|err| AkgError::FileRead {
            path: file.to_path_buf().into_std_path_buf(),
            message: err.to_string(),
        })?;
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    let mut content = String::new();
    for line in &lines {
        content.push_str(line);
        content.push('\n');
    }
    Store::write_bytes_atomic(output, content.as_bytes())?;
    info!("combined {} files into {output} ({} triples)", files.len(), lines.len());
    Ok(lines.len())
}
