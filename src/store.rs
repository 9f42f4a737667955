use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::error::AkgError;

pub const DEFAULT_LEDGER_FILE: &str = "akg_tracking.csv";
pub const ROW_LABELS_SUFFIX: &str = ".row_uri_labels.json";

#[derive(Debug, Clone)]
pub struct Store {
    input_root: Utf8PathBuf,
    ledger_path: Utf8PathBuf,
    supp_data_root: Utf8PathBuf,
    graph_root: Utf8PathBuf,
    uuid_map_path: Utf8PathBuf,
    reference_path: Utf8PathBuf,
    article_metadata_path: Option<Utf8PathBuf>,
}

impl Store {
    pub fn new(
        input_root: &str,
        ledger_file: &str,
        config: &ResolvedConfig,
    ) -> Result<Self, AkgError> {
        let input_root = Utf8PathBuf::from(input_root);
        if !input_root.as_std_path().is_dir() {
            return Err(AkgError::MissingInputDir(input_root.into_std_path_buf()));
        }
        Ok(Self::new_with_paths(input_root, ledger_file, config))
    }

    pub fn new_with_paths(
        input_root: Utf8PathBuf,
        ledger_file: &str,
        config: &ResolvedConfig,
    ) -> Self {
        Self {
            ledger_path: input_root.join(ledger_file),
            supp_data_root: input_root.join(&config.supp_data_dir),
            graph_root: input_root.join(&config.graph_dir),
            uuid_map_path: input_root.join(&config.uuid_map),
            reference_path: input_root.join(&config.reference.path),
            article_metadata_path: config
                .article_metadata
                .as_ref()
                .map(|path| input_root.join(path)),
            input_root,
        }
    }

    pub fn input_root(&self) -> &Utf8Path {
        &self.input_root
    }

    pub fn ledger_path(&self) -> &Utf8Path {
        &self.ledger_path
    }

    pub fn supp_data_root(&self) -> &Utf8Path {
        &self.supp_data_root
    }

    pub fn graph_root(&self) -> &Utf8Path {
        &self.graph_root
    }

    pub fn uuid_map_path(&self) -> &Utf8Path {
        &self.uuid_map_path
    }

    pub fn reference_path(&self) -> &Utf8Path {
        &self.reference_path
    }

    pub fn article_metadata_path(&self) -> Option<&Utf8Path> {
        self.article_metadata_path.as_deref()
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.input_root.join("tracking_report.txt")
    }

    pub fn source_data_dir(&self, source_id: &str) -> Utf8PathBuf {
        self.supp_data_root.join(source_id)
    }

    pub fn require_ledger(&self) -> Result<(), AkgError> {
        if !self.ledger_path.as_std_path().is_file() {
            return Err(AkgError::LedgerMissing(
                self.ledger_path.clone().into_std_path_buf(),
            ));
        }
        Ok(())
    }

    pub fn require_supp_data(&self) -> Result<(), AkgError> {
        if !self.supp_data_root.as_std_path().is_dir() {
            return Err(AkgError::Configuration(format!(
                "supplementary data directory {} must exist",
                self.supp_data_root
            )));
        }
        Ok(())
    }

    pub fn ensure_graph_root(&self) -> Result<(), AkgError> {
        fs::create_dir_all(self.graph_root.as_std_path())
            .map_err(|err| AkgError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AkgError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".akg-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| AkgError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// First free name of `<stub>.<ext>`, `<stub>_<original_stem>.<ext>`,
    /// `<stub>_<original_stem>_2.<ext>`, ...
    pub fn output_path(dir: &Utf8Path, stub: &str, original_stem: &str, ext: &str) -> Utf8PathBuf {
        let candidate = dir.join(format!("{stub}.{ext}"));
        if !candidate.as_std_path().exists() {
            return candidate;
        }
        let candidate = dir.join(format!("{stub}_{original_stem}.{ext}"));
        if !candidate.as_std_path().exists() {
            return candidate;
        }
        let mut n = 2;
        loop {
            let candidate = dir.join(format!("{stub}_{original_stem}_{n}.{ext}"));
            if !candidate.as_std_path().exists() {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn list_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, AkgError> {
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for path in walk_dir(root.as_std_path())? {
            if !path.is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
                AkgError::Filesystem(format!("non UTF-8 path {}", path.display()))
            })?;
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, AkgError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| AkgError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| AkgError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn file_stem(name: &str) -> &str {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigLoader};

    #[test]
    fn layout_paths() {
        let config = ConfigLoader::resolve_config(Config::default()).unwrap();
        let store = Store::new_with_paths(Utf8PathBuf::from("data"), DEFAULT_LEDGER_FILE, &config);
        assert!(store.ledger_path().ends_with("data/akg_tracking.csv"));
        assert!(store.source_data_dir("12345678").ends_with("supp_data/12345678"));
        assert!(store.uuid_map_path().ends_with("filename_uuid_map.json"));
        assert!(store.graph_root().ends_with("data/graph"));
        assert!(store.article_metadata_path().is_none());
    }

    #[test]
    fn missing_input_dir() {
        let config = ConfigLoader::resolve_config(Config::default()).unwrap();
        let err = Store::new("/definitely/not/here", DEFAULT_LEDGER_FILE, &config).unwrap_err();
        assert!(matches!(err, AkgError::MissingInputDir(_)));
    }

    #[test]
    fn stems() {
        assert_eq!(file_stem("table.csv"), "table");
        assert_eq!(file_stem("table.csv.gz"), "table");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn atomic_write_and_output_path() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let first = Store::output_path(&dir, "split_Sheet1", "book", "csv");
        assert!(first.ends_with("split_Sheet1.csv"));
        Store::write_bytes_atomic(&first, b"a,b\n").unwrap();
        assert_eq!(fs::read_to_string(first.as_std_path()).unwrap(), "a,b\n");
        let second = Store::output_path(&dir, "split_Sheet1", "book", "csv");
        assert!(second.ends_with("split_Sheet1_book.csv"));
        Store::write_bytes_atomic(&second, b"c,d\n").unwrap();
        let third = Store::output_path(&dir, "split_Sheet1", "book", "csv");
        assert!(third.ends_with("split_Sheet1_book_2.csv"));
        Store::write_bytes_atomic(&third, b"e,f\n").unwrap();
        let fourth = Store::output_path(&dir, "split_Sheet1", "book", "csv");
        assert!(fourth.ends_with("split_Sheet1_book_3.csv"));
        assert_eq!(fs::read_to_string(second.as_std_path()).unwrap(), "c,d\n");
    }
}
