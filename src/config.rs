//! # src/config.rs
//!
//! Die Konfiguration der Bibliothek. Wird aus einer TOML-Datei oder einem
//! TOML-String geladen; fehlende Felder erhalten Standardwerte.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Basis-URL der REST-API, z.B. `https://api.example.com/`.
    pub api_base_url: String,
    /// Bis zu dieser Anzahl neuer Einsendungen wird ohne Worker entschlüsselt.
    pub sequential_threshold: usize,
    /// Feste Anzahl an Workern. `None` bedeutet: Anzahl der CPU-Kerne.
    pub worker_count: Option<usize>,
    /// Untergrenze der Worker-Anzahl im parallelen Modus.
    pub min_workers: usize,
    /// Name des Fragment-Parameters für den Vertrauensanker.
    pub trust_anchor_param: String,
    /// Wie oft ein Schreibzugriff nach einem Revisionskonflikt wiederholt wird.
    pub storage_conflict_retries: u32,
    pub http_timeout_secs: u64,
    /// Standard-Gültigkeit neuer Schlüssel in Tagen. `0` bedeutet maximale Gültigkeit.
    pub key_validity_days: u32,
    /// Verzeichnis für den lokalen Dokumentenspeicher.
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            api_base_url: "http://localhost:8080/".to_string(),
            sequential_threshold: 100,
            worker_count: None,
            min_workers: 2,
            trust_anchor_param: "ak".to_string(),
            storage_conflict_retries: 3,
            http_timeout_secs: 30,
            key_validity_days: 365,
            data_dir: PathBuf::from("sealed-forms-data"),
        }
    }
}

impl CoreConfig {
    /// Parst eine Konfiguration aus einem TOML-String.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Lädt eine Konfiguration aus einer TOML-Datei.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_workers == 0 {
            return Err(ConfigError::Invalid("min_workers must be at least 1".to_string()));
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::Invalid("worker_count must be at least 1".to_string()));
        }
        if self.trust_anchor_param.trim().is_empty() {
            return Err(ConfigError::Invalid("trust_anchor_param must not be empty".to_string()));
        }
        url::Url::parse(&self.api_base_url)
            .map_err(|e| ConfigError::Invalid(format!("api_base_url: {}", e)))?;
        Ok(())
    }

    /// Die Anzahl der Worker für den parallelen Modus.
    pub fn effective_worker_count(&self) -> usize {
        let detected = self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        detected.max(self.min_workers)
    }
}
