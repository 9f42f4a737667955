use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AkgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Downloaded,
    Split,
    Normalized,
    Cleaned,
    TripleExtracted,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Downloaded,
        Stage::Split,
        Stage::Normalized,
        Stage::Cleaned,
        Stage::TripleExtracted,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            Stage::Downloaded => 0,
            Stage::Split => 1,
            Stage::Normalized => 2,
            Stage::Cleaned => 3,
            Stage::TripleExtracted => 4,
        }
    }

    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Downloaded => None,
            Stage::Split => Some(Stage::Downloaded),
            Stage::Normalized => Some(Stage::Split),
            Stage::Cleaned => Some(Stage::Normalized),
            Stage::TripleExtracted => Some(Stage::Cleaned),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Downloaded => "downloaded",
            Stage::Split => "split",
            Stage::Normalized => "normalized",
            Stage::Cleaned => "cleaned",
            Stage::TripleExtracted => "triple-extracted",
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stage::Downloaded),
            1 => Ok(Stage::Split),
            2 => Ok(Stage::Normalized),
            3 => Ok(Stage::Cleaned),
            4 => Ok(Stage::TripleExtracted),
            other => Err(format!("invalid stage {other}, expected 0-4")),
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.as_u8()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u8(), self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = AkgError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| AkgError::EntryNotFound(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneFamily {
    Ensembl,
    Ncbi,
    Symbol,
}

impl GeneFamily {
    pub fn from_column(column: &str) -> Self {
        let lower = column.to_lowercase();
        if lower.contains("ensembl") {
            GeneFamily::Ensembl
        } else if lower.contains("entrez") || lower.contains("ncbi") {
            GeneFamily::Ncbi
        } else {
            GeneFamily::Symbol
        }
    }
}
