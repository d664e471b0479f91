use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::key::{KeySpace, RecordType, Year};

const DEFAULT_RECORD_TYPES: [&str; 5] = ["PA", "RG", "DN", "DS", "PC"];
const DEFAULT_YEARS: [&str; 9] = ["24", "23", "22", "21", "20", "19", "18", "17", "16"];

/// Comma-bearing names that are not "Surname, Given" pairs.
pub(crate) const DEFAULT_NAME_EXEMPTIONS: [&str; 4] = [
    "X,Y,Z Architecture & Design",
    "Mangion, Mangion & Partners",
    "Nois currently responsible for this case. X,Y,Z Architecture & Design relinquished responsibility on 20 July 2020",
    "Innovative Design Architects (iDA) 23, Triq Titu B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Direct,
    Rendered,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub kind: ClientKind,
    pub base_url: String,
    pub max_retries: u32,
    /// Pause before the first case of every range.
    pub warmup_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub record_types: Vec<RecordType>,
    pub years: Vec<Year>,
    pub failure_threshold: u32,
    pub name_exemptions: Vec<String>,
    pub client: ClientSettings,
}

impl Settings {
    /// Defaults, then `eapps.toml` (or `path`), then `EAPPS_*` environment
    /// variables. Nested keys use `__`, lists are comma-separated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("eapps").required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("output_dir", "data")
            .and_then(|b| b.set_default("record_types", DEFAULT_RECORD_TYPES.to_vec()))
            .and_then(|b| b.set_default("years", DEFAULT_YEARS.to_vec()))
            .and_then(|b| b.set_default("failure_threshold", 5))
            .and_then(|b| b.set_default("name_exemptions", DEFAULT_NAME_EXEMPTIONS.to_vec()))
            .and_then(|b| b.set_default("client.kind", "direct"))
            .and_then(|b| b.set_default("client.base_url", "https://www.pa.org.mt"))
            .and_then(|b| b.set_default("client.max_retries", 3))
            .and_then(|b| b.set_default("client.warmup_delay_ms", 1000))
            .map_err(config_error)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("EAPPS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("record_types")
                    .with_list_parse_key("years"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::Config("failure_threshold must be at least 1".into()));
        }
        self.key_space().map(|_| ())
    }

    pub fn key_space(&self) -> Result<KeySpace> {
        KeySpace::new(self.years.clone(), self.record_types.clone())
    }

    pub fn raw_path(&self) -> PathBuf {
        self.output_dir.join("raw.csv")
    }

    pub fn processed_path(&self) -> PathBuf {
        self.output_dir.join("processed.csv")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join("checkpoint.txt")
    }

    pub fn extraction_date_path(&self) -> PathBuf {
        self.output_dir.join("extraction_date.txt")
    }
}

fn config_error(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eapps.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "out"
record_types = ["RG", "PA"]
years = ["20", "9"]
failure_threshold = 3

[client]
kind = "rendered"
warmup_delay_ms = 0
"#,
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.output_dir, PathBuf::from("out"));
        assert_eq!(s.record_types, vec![RecordType::RG, RecordType::PA]);
        assert_eq!(s.years.iter().map(|y| y.to_string()).collect::<Vec<_>>(), ["20", "09"]);
        assert_eq!(s.failure_threshold, 3);
        assert_eq!(s.client.kind, ClientKind::Rendered);
        assert_eq!(s.client.base_url, "https://www.pa.org.mt");
        assert_eq!(s.client.max_retries, 3);
        assert_eq!(s.name_exemptions.len(), 4);
        assert_eq!(s.checkpoint_path(), PathBuf::from("out/checkpoint.txt"));
    }

    #[test]
    fn zero_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "failure_threshold = 0\n").unwrap();
        assert!(matches!(Settings::load(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_record_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "record_types = [\"PA\", \"ZZ\"]\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
