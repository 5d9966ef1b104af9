use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata of a stored object as reported by Firebase Storage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: Option<String>,
    pub bucket: Option<String>,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    pub content_type: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub storage_class: Option<String>,
    /// Byte size, sent as a decimal string.
    pub size: Option<String>,
    pub md5_hash: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Comma separated access tokens used to build download URLs.
    pub download_tokens: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl ObjectMetadata {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn first_download_token(&self) -> Option<&str> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub items: Vec<ListItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListItem {
    pub name: String,
}
