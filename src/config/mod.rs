//! Project configuration: the identifiers that address one Firebase project.
//!
//! A configuration reaches the console as JSON (pasted text, an uploaded file
//! or the local-development environment variables) and is validated before a
//! session ever sees it.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as SerdeValue};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// File name used when exporting a configuration.
pub const EXPORT_FILE_NAME: &str = "firebase-config.json";

/// Configuration files larger than this are refused before parsing.
pub const MAX_CONFIG_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// JSON keys that must be present and non-empty.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "apiKey",
    "authDomain",
    "projectId",
    "storageBucket",
    "messagingSenderId",
    "appId",
];

const CONFIG_ENV: &str = "FIREBASE_CONFIG";
const CONFIG_FILE_ENV: &str = "FIREBASE_CONFIG_FILE";

/// Errors raised while reading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No configuration provided")]
    Empty,
    #[error("Invalid JSON format: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Configuration must be a JSON object")]
    NotAnObject,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Configuration field name must not be empty")]
    BlankField,
    #[error("Configuration file {} is {size} bytes, larger than the 10MB limit", .path.display())]
    TooLarge { path: PathBuf, size: u64 },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The web configuration of a Firebase project.
///
/// Keys beyond the known ones (`databaseURL`, for instance) are kept in
/// `extra` and written back on export in their original order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, SerdeValue>,
}

impl ProjectConfig {
    /// Parses and validates pasted or uploaded configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::Empty);
        }

        let value: SerdeValue = serde_json::from_str(text)?;
        Self::from_json(value)
    }

    /// Validates an already decoded JSON value.
    ///
    /// A required field counts as missing when it is absent, `null` or an empty
    /// string; every missing field is reported at once.
    pub fn from_json(value: SerdeValue) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or(ConfigError::NotAnObject)?;

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| match object.get(*field) {
                None | Some(SerdeValue::Null) => true,
                Some(SerdeValue::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Reads a `.json` configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = fs::metadata(path).map_err(io_err)?.len();
        if size > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size,
            });
        }

        let text = fs::read_to_string(path).map_err(io_err)?;
        Self::parse(&text)
    }

    /// Local-development loader.
    ///
    /// `FIREBASE_CONFIG` holds the JSON inline; `FIREBASE_CONFIG_FILE` names a
    /// file. Returns `Ok(None)` when neither is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        if let Some(text) = lookup(CONFIG_ENV).filter(|t| !t.trim().is_empty()) {
            info!("loading project configuration from {}", CONFIG_ENV);
            return Self::parse(&text).map(Some);
        }

        if let Some(path) = lookup(CONFIG_FILE_ENV).filter(|p| !p.trim().is_empty()) {
            info!(path = %path, "loading project configuration from {}", CONFIG_FILE_ENV);
            return Self::from_file(path.trim()).map(Some);
        }

        Ok(None)
    }

    /// Pretty-printed JSON, the export format.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the pretty-printed configuration to `path`.
    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_pretty_json()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Editable fields in display order, optional and extra ones included
    /// when set. Non-string extra values render as JSON.
    pub fn entries(&self) -> Vec<(&str, String)> {
        let mut entries = vec![
            ("apiKey", self.api_key.clone()),
            ("authDomain", self.auth_domain.clone()),
            ("projectId", self.project_id.clone()),
            ("storageBucket", self.storage_bucket.clone()),
            ("messagingSenderId", self.messaging_sender_id.clone()),
            ("appId", self.app_id.clone()),
        ];
        if let Some(measurement_id) = &self.measurement_id {
            entries.push(("measurementId", measurement_id.clone()));
        }
        entries.extend(self.extra.iter().map(|(key, value)| {
            let text = match value {
                SerdeValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.as_str(), text)
        }));
        entries
    }

    /// Replaces one field by its JSON key. Keys that are not part of the
    /// known set are stored as extra string fields.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        let value = value.into();
        match key {
            "apiKey" => self.api_key = value,
            "authDomain" => self.auth_domain = value,
            "projectId" => self.project_id = value,
            "storageBucket" => self.storage_bucket = value,
            "messagingSenderId" => self.messaging_sender_id = value,
            "appId" => self.app_id = value,
            "measurementId" => self.measurement_id = Some(value),
            other if other.trim().is_empty() => return Err(ConfigError::BlankField),
            other => {
                self.extra.insert(other.to_string(), SerdeValue::String(value));
            }
        }
        Ok(())
    }
}
