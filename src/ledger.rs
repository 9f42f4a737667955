use std::collections::HashSet;
use std::fs::{self, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{debug, info};

use crate::domain::{EntryId, Stage};
use crate::error::AkgError;
use crate::lineage::DerivationGraph;
use crate::store::{ROW_LABELS_SUFFIX, Store};

pub const COLUMNS: [&str; 21] = [
    "entry_id",
    "parent_id",
    "stage",
    "path",
    "filename",
    "source_id",
    "excluded",
    "derived",
    "source_file",
    "manual_override",
    "manual_reason",
    "header_skip",
    "gene_column",
    "pvalue_column",
    "lfc_column",
    "output_graph_file",
    "matched_count",
    "unmatched_count",
    "cleaned",
    "suitable",
    "suitable_reason",
];

const ARTIFACT_PREFIXES: [&str; 4] = ["split_", "expdata_", "cleaned_", "graph_"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub entry_id: EntryId,
    pub parent_id: Option<EntryId>,
    pub stage: Stage,
    pub path: String,
    pub filename: String,
    pub source_id: String,
    #[serde(with = "strict_bool")]
    pub excluded: bool,
    #[serde(with = "strict_bool")]
    pub derived: bool,
    pub source_file: String,
    #[serde(with = "strict_bool")]
    pub manual_override: bool,
    pub manual_reason: String,
    pub header_skip: u32,
    pub gene_column: String,
    pub pvalue_column: String,
    pub lfc_column: String,
    pub output_graph_file: String,
    pub matched_count: u64,
    pub unmatched_count: u64,
    #[serde(with = "strict_bool")]
    pub cleaned: bool,
    #[serde(with = "strict_bool")]
    pub suitable: bool,
    pub suitable_reason: String,
}

impl ProvenanceEntry {
    pub fn downloaded(path: &Utf8Path, filename: &str, source_id: &str) -> Self {
        Self {
            entry_id: EntryId::new(),
            parent_id: None,
            stage: Stage::Downloaded,
            path: path.to_string(),
            filename: filename.to_string(),
            source_id: source_id.to_string(),
            excluded: false,
            derived: false,
            source_file: String::new(),
            manual_override: false,
            manual_reason: String::new(),
            header_skip: 0,
            gene_column: String::new(),
            pvalue_column: String::new(),
            lfc_column: String::new(),
            output_graph_file: String::new(),
            matched_count: 0,
            unmatched_count: 0,
            cleaned: false,
            suitable: false,
            suitable_reason: String::new(),
        }
    }

    pub fn derive_from(parent: &ProvenanceEntry, stage: Stage, output: &Utf8Path) -> Self {
        let dir = output.parent().map(Utf8Path::to_string).unwrap_or_default();
        let filename = output.file_name().unwrap_or_default();
        Self {
            entry_id: EntryId::new(),
            parent_id: Some(parent.entry_id),
            stage,
            derived: true,
            source_file: parent.file_path().to_string(),
            ..Self::downloaded(Utf8Path::new(&dir), filename, &parent.source_id)
        }
    }

    pub fn file_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.path).join(&self.filename)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<ProvenanceEntry>,
}

impl Ledger {
    pub fn new(entries: Vec<ProvenanceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, AkgError> {
        if !path.as_std_path().is_file() {
            return Err(AkgError::LedgerMissing(path.to_path_buf().into_std_path_buf()));
        }
        let corrupt = |message: String| AkgError::LedgerCorrupt {
            path: path.to_path_buf().into_std_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path.as_std_path())
            .map_err(|err| corrupt(err.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|err| corrupt(err.to_string()))?
            .clone();
        let missing = COLUMNS
            .iter()
            .filter(|column| !headers.iter().any(|header| header == **column))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(corrupt(format!("missing columns: {}", missing.join(", "))));
        }

        let mut entries = Vec::new();
        for record in reader.deserialize::<ProvenanceEntry>() {
            entries.push(record.map_err(|err| corrupt(err.to_string()))?);
        }
        debug!("loaded {} tracking entries from {path}", entries.len());
        Ok(Self { entries })
    }

    pub fn append(mut self, entries: Vec<ProvenanceEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    pub fn sorted(&self) -> Vec<ProvenanceEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            (a.stage, &a.source_id, &a.filename).cmp(&(b.stage, &b.source_id, &b.filename))
        });
        entries
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, AkgError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(COLUMNS)
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        for entry in self.sorted() {
            writer
                .serialize(&entry)
                .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| AkgError::Filesystem(err.to_string()))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), AkgError> {
        let content = self.to_csv()?;
        Store::write_bytes_atomic(path, &content).map_err(|err| {
            if Self::writable_check(path) {
                err
            } else {
                AkgError::LedgerWriteConflict(path.to_path_buf().into_std_path_buf())
            }
        })
    }

    /// Best-effort: no office lock file beside the ledger, not read-only,
    /// openable for writing.
    pub fn writable_check(path: &Utf8Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let dir = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let lock_files = [format!(".~lock.{name}#"), format!("~${name}")];
        if lock_files
            .iter()
            .any(|lock| dir.join(lock).as_std_path().exists())
        {
            return false;
        }

        if path.as_std_path().exists() {
            match fs::metadata(path.as_std_path()) {
                Ok(meta) if meta.permissions().readonly() => false,
                Ok(_) => OpenOptions::new()
                    .append(true)
                    .open(path.as_std_path())
                    .is_ok(),
                Err(_) => false,
            }
        } else {
            dir.as_std_path().is_dir()
                && Builder::new()
                    .prefix(".akg-writable")
                    .tempfile_in(dir.as_std_path())
                    .is_ok()
        }
    }

    pub fn derivation(&self) -> DerivationGraph<'_> {
        DerivationGraph::new(&self.entries)
    }

    /// Entries a stage producing `output` should consume: at `input`, not excluded,
    /// and without an `output` child already recorded.
    pub fn pending(&self, input: Stage, output: Stage) -> Vec<ProvenanceEntry> {
        let graph = self.derivation();
        self.entries
            .iter()
            .filter(|entry| entry.stage == input && !entry.excluded)
            .filter(|entry| !graph.has_child_at(&entry.entry_id, output))
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &EntryId) -> Option<&ProvenanceEntry> {
        self.entries.iter().find(|entry| entry.entry_id == *id)
    }

    pub fn find_mut(&mut self, id: &EntryId) -> Option<&mut ProvenanceEntry> {
        self.entries.iter_mut().find(|entry| entry.entry_id == *id)
    }

    pub fn lookup(&self, target: &str) -> Result<EntryId, AkgError> {
        if let Ok(id) = target.parse::<EntryId>() {
            if self.find(&id).is_some() {
                return Ok(id);
            }
        }
        let matches = self
            .entries
            .iter()
            .filter(|entry| entry.filename == target || entry.file_path().as_str() == target)
            .collect::<Vec<_>>();
        match matches.as_slice() {
            [entry] => Ok(entry.entry_id),
            [] => Err(AkgError::EntryNotFound(target.to_string())),
            _ => Err(AkgError::EntryNotFound(format!(
                "{target} is ambiguous ({} entries), use the entry id",
                matches.len()
            ))),
        }
    }

    pub fn exclude(&mut self, id: &EntryId, reason: &str) -> Result<(), AkgError> {
        let entry = self
            .find_mut(id)
            .ok_or_else(|| AkgError::EntryNotFound(id.to_string()))?;
        entry.excluded = true;
        entry.manual_override = true;
        entry.manual_reason = reason.to_string();
        Ok(())
    }

    pub fn scan_downloads(
        &self,
        supp_root: &Utf8Path,
        source_pattern: &Regex,
    ) -> Result<Vec<ProvenanceEntry>, AkgError> {
        let tracked = self
            .entries
            .iter()
            .map(ProvenanceEntry::file_path)
            .collect::<HashSet<_>>();

        let mut found = Vec::new();
        for file in Store::list_files(supp_root)? {
            let (Some(dir), Some(name)) = (file.parent(), file.file_name()) else {
                continue;
            };
            let Some(source_id) = dir.file_name() else {
                continue;
            };
            if !source_pattern.is_match(source_id) || is_pipeline_artifact(name) {
                continue;
            }
            if tracked.contains(&file) {
                continue;
            }
            found.push(ProvenanceEntry::downloaded(dir, name, source_id));
        }
        info!("found {} new downloaded files under {supp_root}", found.len());
        Ok(found)
    }
}

pub fn is_pipeline_artifact(name: &str) -> bool {
    let lower = name.to_lowercase();
    ARTIFACT_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
        || lower.ends_with(ROW_LABELS_SUFFIX)
        || lower.ends_with(".nt")
        || lower.starts_with(".akg-")
        || lower.starts_with(".~lock.")
        || lower.starts_with("~$")
}

mod strict_bool {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(D::Error::custom(format!(
                "expected true or false, found '{raw}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, dir)
    }

    fn sample() -> Ledger {
        let mut b =
            ProvenanceEntry::downloaded(Utf8Path::new("supp/22222222"), "b.xlsx", "22222222");
        b.manual_override = true;
        b.manual_reason = "review, later".to_string();
        let a = ProvenanceEntry::downloaded(Utf8Path::new("supp/11111111"), "a.csv", "11111111");
        let mut split = ProvenanceEntry::derive_from(
            &a,
            Stage::Split,
            Utf8Path::new("supp/11111111/split_a.csv"),
        );
        split.matched_count = 12;
        split.header_skip = 2;
        split.suitable = true;
        Ledger::new(vec![split, b, a])
    }

    #[test]
    fn save_sorts_and_round_trips() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("akg_tracking.csv");
        let ledger = sample();
        ledger.save(&path).unwrap();

        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded.entries(), ledger.sorted().as_slice());
        assert_eq!(loaded.entries()[0].filename, "a.csv");
        assert_eq!(loaded.entries()[2].stage, Stage::Split);
        assert_eq!(loaded.entries()[2].header_skip, 2);

        let first = fs::read(path.as_std_path()).unwrap();
        loaded.save(&path).unwrap();
        let second = fs::read(path.as_std_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_ledger_keeps_header() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("t.csv");
        Ledger::default().save(&path).unwrap();
        let loaded = Ledger::load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn missing_ledger() {
        let err = Ledger::load(Utf8Path::new("/no/such/ledger.csv")).unwrap_err();
        assert_matches!(err, AkgError::LedgerMissing(_));
    }

    #[test]
    fn missing_column_is_corrupt() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("t.csv");
        fs::write(path.as_std_path(), "entry_id,stage,path\n").unwrap();
        let err = Ledger::load(&path).unwrap_err();
        assert_matches!(err, AkgError::LedgerCorrupt { .. });
    }

    #[test]
    fn malformed_bool_is_corrupt() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("t.csv");
        sample().save(&path).unwrap();
        let text = fs::read_to_string(path.as_std_path()).unwrap();
        let broken = text.replacen(",false,", ",nan,", 1);
        fs::write(path.as_std_path(), broken).unwrap();
        let err = Ledger::load(&path).unwrap_err();
        assert_matches!(err, AkgError::LedgerCorrupt { .. });
    }

    #[test]
    fn uppercase_bools_are_accepted() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("t.csv");
        sample().save(&path).unwrap();
        let text = fs::read_to_string(path.as_std_path()).unwrap();
        fs::write(path.as_std_path(), text.replace(",false,", ",FALSE,")).unwrap();
        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn malformed_stage_is_corrupt() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("t.csv");
        let ledger = Ledger::new(vec![ProvenanceEntry::downloaded(
            Utf8Path::new("d"),
            "x.csv",
            "12345678",
        )]);
        ledger.save(&path).unwrap();
        let text = fs::read_to_string(path.as_std_path()).unwrap();
        let id = ledger.entries()[0].entry_id.to_string();
        fs::write(path.as_std_path(), text.replace(&format!("{id},,0,"), &format!("{id},,7,")))
            .unwrap();
        assert_matches!(Ledger::load(&path), Err(AkgError::LedgerCorrupt { .. }));
    }

    #[test]
    fn append_preserves_order() {
        let ledger = Ledger::default();
        let a = ProvenanceEntry::downloaded(Utf8Path::new("d"), "z.csv", "1");
        let b = ProvenanceEntry::downloaded(Utf8Path::new("d"), "a.csv", "1");
        let ledger = ledger.append(vec![a.clone(), b.clone()]);
        let ledger = ledger.append(vec![a.clone()]);
        assert_eq!(ledger.entries(), &[a.clone(), b, a]);
    }

    #[test]
    fn pending_skips_excluded_and_advanced() {
        let ledger = sample();
        let pending = ledger.pending(Stage::Downloaded, Stage::Split);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].filename, "b.xlsx");

        let mut ledger = ledger;
        let id = pending[0].entry_id;
        ledger.exclude(&id, "not expression data").unwrap();
        assert!(ledger.pending(Stage::Downloaded, Stage::Split).is_empty());
    }

    #[test]
    fn lookup_by_name_or_id() {
        let ledger = sample();
        let id = ledger.lookup("b.xlsx").unwrap();
        assert_eq!(ledger.lookup(&id.to_string()).unwrap(), id);
        assert_matches!(ledger.lookup("nope.csv"), Err(AkgError::EntryNotFound(_)));
    }

    #[test]
    fn writable_check_detects_lock_file() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("akg_tracking.csv");
        assert!(Ledger::writable_check(&path));
        sample().save(&path).unwrap();
        assert!(Ledger::writable_check(&path));

        fs::write(dir.join(".~lock.akg_tracking.csv#").as_std_path(), b"user").unwrap();
        assert!(!Ledger::writable_check(&path));
    }

    #[test]
    fn writable_check_detects_read_only() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("akg_tracking.csv");
        sample().save(&path).unwrap();
        let mut perms = fs::metadata(path.as_std_path()).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(path.as_std_path(), perms).unwrap();
        assert!(!Ledger::writable_check(&path));
    }

    #[test]
    fn scan_finds_new_downloads_once() {
        let (_temp, dir) = temp_dir();
        let supp = dir.join("supp_data");
        let source = supp.join("12345678");
        fs::create_dir_all(source.as_std_path()).unwrap();
        fs::create_dir_all(supp.join("notes").as_std_path()).unwrap();
        fs::write(source.join("table.xlsx").as_std_path(), b"x").unwrap();
        fs::write(source.join("split_table.csv").as_std_path(), b"x").unwrap();
        fs::write(supp.join("notes").join("readme.txt").as_std_path(), b"x").unwrap();

        let pattern = Regex::new(r"^\d{8}$").unwrap();
        let ledger = Ledger::default();
        let found = ledger.scan_downloads(&supp, &pattern).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_id, "12345678");
        assert_eq!(found[0].stage, Stage::Downloaded);
        assert!(!found[0].excluded);

        let ledger = ledger.append(found);
        assert!(ledger.scan_downloads(&supp, &pattern).unwrap().is_empty());
    }
}
