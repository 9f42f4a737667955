use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8Path;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AkgError;
use crate::gene_index::GeneIndexOptions;

pub const DEFAULT_CONFIG_FILE: &str = "akg.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub supp_data_dir: Option<String>,
    #[serde(default)]
    pub graph_dir: Option<String>,
    #[serde(default)]
    pub uuid_map: Option<String>,
    #[serde(default)]
    pub article_metadata: Option<String>,
    #[serde(default)]
    pub source_pattern: Option<String>,
    #[serde(default)]
    pub check_delay_secs: Option<u64>,
    #[serde(default)]
    pub reference: Option<ReferenceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ReferenceEntry {
    Shorthand(String),
    Detailed(ReferenceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReferenceEntryObject {
    pub path: String,
    #[serde(default)]
    pub alternate_column: Option<String>,
    #[serde(default)]
    pub symbol_column: Option<String>,
    #[serde(default)]
    pub canonical_prefix: Option<String>,
    #[serde(default)]
    pub alternate_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub path: String,
    pub options: GeneIndexOptions,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub supp_data_dir: String,
    pub graph_dir: String,
    pub uuid_map: String,
    pub article_metadata: Option<String>,
    pub source_pattern: Regex,
    pub check_delay: Duration,
    pub reference: ReferenceConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(input_root: &Utf8Path, path: Option<&str>) -> Result<ResolvedConfig, AkgError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => input_root.join(DEFAULT_CONFIG_FILE).into_std_path_buf(),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AkgError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AkgError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AkgError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let pattern = config
            .source_pattern
            .unwrap_or_else(|| r"^\d{8}$".to_string());
        let source_pattern = Regex::new(&pattern)
            .map_err(|err| AkgError::Configuration(format!("invalid source_pattern: {err}")))?;

        let reference = match config.reference {
            None => ReferenceConfig {
                path: "gene_ids.txt".to_string(),
                options: GeneIndexOptions::default(),
            },
            Some(ReferenceEntry::Shorthand(path)) => ReferenceConfig {
                path,
                options: GeneIndexOptions::default(),
            },
            Some(ReferenceEntry::Detailed(obj)) => {
                let defaults = GeneIndexOptions::default();
                ReferenceConfig {
                    path: obj.path,
                    options: GeneIndexOptions {
                        alternate_column: obj.alternate_column.unwrap_or(defaults.alternate_column),
                        symbol_column: obj.symbol_column.unwrap_or(defaults.symbol_column),
                        canonical_prefix: obj.canonical_prefix.unwrap_or(defaults.canonical_prefix),
                        alternate_prefix: obj.alternate_prefix.unwrap_or(defaults.alternate_prefix),
                    },
                }
            }
        };

        Ok(ResolvedConfig {
            schema_version,
            supp_data_dir: config.supp_data_dir.unwrap_or_else(|| "supp_data".to_string()),
            graph_dir: config.graph_dir.unwrap_or_else(|| "graph".to_string()),
            uuid_map: config
                .uuid_map
                .unwrap_or_else(|| "filename_uuid_map.json".to_string()),
            article_metadata: config.article_metadata,
            source_pattern,
            check_delay: Duration::from_secs(config.check_delay_secs.unwrap_or(0)),
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.supp_data_dir, "supp_data");
        assert_eq!(resolved.reference.path, "gene_ids.txt");
        assert_eq!(resolved.reference.options.canonical_prefix, "HGNC:");
        assert!(resolved.source_pattern.is_match("12345678"));
        assert!(!resolved.source_pattern.is_match("1234"));
        assert_eq!(resolved.check_delay, Duration::ZERO);
    }

    #[test]
    fn reference_shorthand_and_detailed() {
        let config: Config = serde_json::from_str(
            r#"{"reference": "ref/hgnc.tsv", "check_delay_secs": 10}"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.reference.path, "ref/hgnc.tsv");
        assert_eq!(resolved.check_delay, Duration::from_secs(10));

        let config: Config = serde_json::from_str(
            r#"{"reference": {"path": "hgnc.tsv", "alternate_column": "entrez_id", "alternate_prefix": ""}}"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.reference.options.alternate_column, "entrez_id");
        assert_eq!(resolved.reference.options.alternate_prefix, "");
        assert_eq!(resolved.reference.options.symbol_column, "symbol");
    }

    #[test]
    fn invalid_source_pattern() {
        let config = Config {
            source_pattern: Some("(".to_string()),
            ..Config::default()
        };
        assert!(ConfigLoader::resolve_config(config).is_err());
    }
}
