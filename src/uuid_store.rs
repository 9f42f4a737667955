use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::AkgError;
use crate::store::Store;

#[derive(Debug)]
pub struct UuidStore {
    path: Utf8PathBuf,
    map: BTreeMap<String, Uuid>,
    dirty: bool,
}

impl UuidStore {
    pub fn load(path: &Utf8Path) -> Result<Self, AkgError> {
        if !path.as_std_path().exists() {
            Store::write_bytes_atomic(path, b"{}\n")?;
            return Ok(Self::empty(path));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| AkgError::UuidMap(format!("{path}: {err}")))?;
        let map: BTreeMap<String, Uuid> = serde_json::from_str(&content)
            .map_err(|err| AkgError::UuidMap(format!("{path}: {err}")))?;
        debug!("loaded {} dataset ids from {path}", map.len());
        Ok(Self {
            path: path.to_path_buf(),
            map,
            dirty: false,
        })
    }

    pub fn empty(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
            map: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn get_or_create(&mut self, key: &str) -> Uuid {
        if let Some(id) = self.map.get(key) {
            return *id;
        }
        let id = Uuid::new_v4();
        self.map.insert(key.to_string(), id);
        self.dirty = true;
        id
    }

    pub fn get(&self, key: &str) -> Option<Uuid> {
        self.map.get(key).copied()
    }

    pub fn get_reverse(&self, id: &Uuid) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, value)| *value == id)
            .map(|(key, _)| key.as_str())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn save(&mut self) -> Result<(), AkgError> {
        let mut content = serde_json::to_string_pretty(&self.map)
            .map_err(|err| AkgError::UuidMap(err.to_string()))?;
        content.push('\n');
        Store::write_bytes_atomic(&self.path, content.as_bytes())?;
        self.dirty = false;
        Ok(())
    }
}
