//! The Storage explorer: one folder level of the configured bucket at a time.

use crate::session::ConsoleSession;
use crate::storage::models::ObjectMetadata;
use crate::storage::reference::StorageReference;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const LIST_FAILED: &str = "Failed to fetch storage items";
const UPLOAD_FAILED: &str = "Failed to upload file";

/// Interval between synthetic upload progress steps.
pub const PROGRESS_TICK: Duration = Duration::from_millis(200);
/// Synthetic progress never passes this value until the write settles.
pub const PROGRESS_CEILING: f64 = 90.0;

#[derive(Error, Debug)]
pub enum BrowseError {
    #[error("Storage is not initialized")]
    NotReady,
    #[error("'{0}' is a folder")]
    NotAFile(String),
    #[error(transparent)]
    Remote(#[from] StorageError),
}

/// An entry of a folder listing.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageItem {
    Folder {
        name: String,
        full_path: String,
    },
    /// Everything but `name` and `full_path` is absent when the metadata
    /// lookup failed.
    File {
        name: String,
        full_path: String,
        download_url: Option<String>,
        size: Option<u64>,
        content_type: Option<String>,
        updated: Option<DateTime<Utc>>,
    },
}

impl StorageItem {
    pub fn name(&self) -> &str {
        match self {
            StorageItem::Folder { name, .. } | StorageItem::File { name, .. } => name,
        }
    }

    pub fn full_path(&self) -> &str {
        match self {
            StorageItem::Folder { full_path, .. } | StorageItem::File { full_path, .. } => {
                full_path
            }
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, StorageItem::Folder { .. })
    }

    fn folder(reference: &StorageReference) -> Self {
        StorageItem::Folder {
            name: reference.name().to_string(),
            full_path: reference.full_path().to_string(),
        }
    }

    fn file(reference: &StorageReference, details: Option<(String, ObjectMetadata)>) -> Self {
        let (download_url, metadata) = match details {
            Some((url, metadata)) => (Some(url), metadata),
            None => (None, ObjectMetadata::default()),
        };
        StorageItem::File {
            name: reference.name().to_string(),
            full_path: reference.full_path().to_string(),
            download_url,
            size: metadata.size_bytes(),
            content_type: metadata.content_type.clone(),
            updated: metadata.updated_at(),
        }
    }
}

/// Fetches the metadata of one object and derives its download URL from it.
/// A failure of either degrades the item to its name and path.
async fn describe_file(reference: &StorageReference) -> StorageItem {
    let details = reference.get_metadata().await.and_then(|metadata| {
        let url = reference.download_url_from(&metadata)?;
        Ok((url, metadata))
    });
    match details {
        Ok(details) => StorageItem::file(reference, Some(details)),
        Err(err) => {
            warn!(path = reference.full_path(), error = %err, "Error getting file details");
            StorageItem::file(reference, None)
        }
    }
}

#[derive(Default)]
struct BrowserInner {
    current_path: String,
    items: Vec<StorageItem>,
    selected: Option<StorageItem>,
    error: Option<String>,
    upload_progress: f64,
}

pub struct StorageBrowser {
    session: Arc<ConsoleSession>,
    inner: Mutex<BrowserInner>,
}

impl StorageBrowser {
    /// A browser positioned at the bucket root. Nothing is listed until
    /// [`StorageBrowser::list`] runs.
    pub fn new(session: Arc<ConsoleSession>) -> Self {
        Self {
            session,
            inner: Mutex::new(BrowserInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrowserInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folder being shown; empty at the bucket root.
    pub fn current_path(&self) -> String {
        self.lock().current_path.clone()
    }

    pub fn items(&self) -> Vec<StorageItem> {
        self.lock().items.clone()
    }

    pub fn selected(&self) -> Option<StorageItem> {
        self.lock().selected.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Last reported upload progress, in percent.
    pub fn upload_progress(&self) -> f64 {
        self.lock().upload_progress
    }

    /// Lists the current folder: sub-folders first, then files. On failure
    /// the previous items stay in place.
    pub async fn list(&self) -> Result<usize, BrowseError> {
        let storage = self.session.storage().ok_or(BrowseError::NotReady)?;
        let path = {
            let mut inner = self.lock();
            inner.error = None;
            inner.current_path.clone()
        };

        debug!(path = %path, "Listing storage folder");
        let listing = match storage.reference(&path).list_all().await {
            Ok(listing) => listing,
            Err(err) => {
                error!(path = %path, error = %err, "Error fetching storage items");
                self.lock().error = Some(LIST_FAILED.to_string());
                return Err(err.into());
            }
        };

        let files = join_all(listing.items.iter().map(describe_file)).await;
        let items: Vec<StorageItem> = listing
            .prefixes
            .iter()
            .map(StorageItem::folder)
            .chain(files)
            .collect();
        let count = items.len();

        let mut inner = self.lock();
        if inner.current_path == path {
            inner.items = items;
        } else {
            debug!(path = %path, "Dropping listing of a folder no longer shown");
        }
        Ok(count)
    }

    /// Moves into `folder_path` (a full path) and lists it.
    pub async fn navigate_into(&self, folder_path: &str) -> Result<usize, BrowseError> {
        {
            let mut inner = self.lock();
            inner.current_path = folder_path.trim_matches('/').to_string();
            inner.selected = None;
        }
        self.list().await
    }

    /// Moves to the parent folder and lists it. At the root nothing happens.
    pub async fn navigate_up(&self) -> Result<usize, BrowseError> {
        {
            let mut inner = self.lock();
            if inner.current_path.is_empty() {
                return Ok(inner.items.len());
            }
            let parent = match inner.current_path.rfind('/') {
                Some(idx) => inner.current_path[..idx].to_string(),
                None => String::new(),
            };
            inner.current_path = parent;
            inner.selected = None;
        }
        self.list().await
    }

    /// Folders are entered, files become the selection.
    pub async fn select_item(&self, item: &StorageItem) -> Result<(), BrowseError> {
        if item.is_folder() {
            self.navigate_into(item.full_path()).await?;
        } else {
            self.lock().selected = Some(item.clone());
        }
        Ok(())
    }

    fn report_progress(&self, value: f64, on_progress: &mut impl FnMut(f64)) {
        self.lock().upload_progress = value;
        on_progress(value);
    }

    /// Uploads `body` as `file_name` in the current folder, then refreshes
    /// the listing.
    ///
    /// The service gives no progress for a single-request upload, so the
    /// reported progress is cosmetic: every [`PROGRESS_TICK`] it grows by a
    /// random step of up to 10 points, held at [`PROGRESS_CEILING`] until
    /// the write settles. It ends at 100 on success and 0 on failure.
    pub async fn upload(
        &self,
        file_name: &str,
        body: impl Into<reqwest::Body>,
        content_type: &str,
        mut on_progress: impl FnMut(f64),
    ) -> Result<ObjectMetadata, BrowseError> {
        let storage = self.session.storage().ok_or(BrowseError::NotReady)?;
        let target = storage.reference(&format!("{}/{}", self.current_path(), file_name));

        self.report_progress(0.0, &mut on_progress);
        let result = {
            let upload = target.put(body, content_type);
            tokio::pin!(upload);
            let mut ticker = tokio::time::interval(PROGRESS_TICK);
            ticker.tick().await;
            let mut progress = 0.0_f64;
            loop {
                tokio::select! {
                    result = &mut upload => break result,
                    _ = ticker.tick() => {
                        progress = (progress + rand::random::<f64>() * 10.0).min(PROGRESS_CEILING);
                        self.report_progress(progress, &mut on_progress);
                    }
                }
            }
        };

        match result {
            Ok(metadata) => {
                self.report_progress(100.0, &mut on_progress);
                info!(path = target.full_path(), "Uploaded file");
                if let Err(err) = self.list().await {
                    warn!(error = %err, "Listing refresh after upload failed");
                }
                Ok(metadata)
            }
            Err(err) => {
                error!(path = target.full_path(), error = %err, "Error uploading file");
                self.report_progress(0.0, &mut on_progress);
                self.lock().error = Some(UPLOAD_FAILED.to_string());
                Err(err.into())
            }
        }
    }

    /// Downloads the content of a file item.
    pub async fn download(&self, item: &StorageItem) -> Result<bytes::Bytes, BrowseError> {
        if item.is_folder() {
            return Err(BrowseError::NotAFile(item.full_path().to_string()));
        }
        let storage = self.session.storage().ok_or(BrowseError::NotReady)?;
        Ok(storage.reference(item.full_path()).download().await?)
    }
}

/// Human readable byte size, e.g. `"1.5 KB"`. Unknown sizes render empty.
pub fn format_file_size(size: Option<u64>) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    let Some(bytes) = size else {
        return String::new();
    };
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::core::endpoints::Endpoints;
    use httpmock::prelude::*;
    use httpmock::Mock;
    use serde_json::json;

    const BUCKET_PATH: &str = "/v0/b/demo.appspot.com/o";

    fn connected_session(server: &MockServer) -> Arc<ConsoleSession> {
        let session = ConsoleSession::with_endpoints(Endpoints::all(server.url("")));
        session.set_config(ProjectConfig {
            api_key: "test-key".to_string(),
            auth_domain: "demo.firebaseapp.com".to_string(),
            project_id: "demo".to_string(),
            storage_bucket: "demo.appspot.com".to_string(),
            messaging_sender_id: "1".to_string(),
            app_id: "1:1:web:1".to_string(),
            measurement_id: None,
            extra: Default::default(),
        });
        Arc::new(session)
    }

    fn object_metadata(name: &str, size: u64) -> serde_json::Value {
        json!({
            "name": name,
            "bucket": "demo.appspot.com",
            "contentType": "text/plain",
            "size": size.to_string(),
            "updated": "2024-03-01T10:00:00.000Z",
            "downloadTokens": format!("token-{name}")
        })
    }

    fn mock_metadata<'a>(server: &'a MockServer, name: &str, size: u64) -> Mock<'a> {
        let body = object_metadata(name, size);
        server.mock(|when, then| {
            when.method(GET).path(format!("{BUCKET_PATH}/{name}"));
            then.status(200).json_body(body);
        })
    }

    #[tokio::test]
    async fn test_list_degrades_file_with_failing_metadata() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path(BUCKET_PATH)
                .query_param("prefix", "")
                .query_param("delimiter", "/");
            then.status(200).json_body(json!({
                "prefixes": ["images/"],
                "items": [
                    { "name": "a.txt" },
                    { "name": "b.txt" },
                    { "name": "c.txt" }
                ]
            }));
        });
        let a_metadata = mock_metadata(&server, "a.txt", 12);
        mock_metadata(&server, "c.txt", 2048);
        server.mock(|when, then| {
            when.method(GET).path(format!("{BUCKET_PATH}/b.txt"));
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "Permission denied." }
            }));
        });

        let browser = StorageBrowser::new(connected_session(&server));
        assert_eq!(browser.list().await.unwrap(), 4);
        assert!(browser.error().is_none());
        // One metadata request per file; the download URL comes from it.
        a_metadata.assert();

        let items = browser.items();
        assert_eq!(
            items[0],
            StorageItem::Folder {
                name: "images".to_string(),
                full_path: "images".to_string()
            }
        );
        let names: Vec<&str> = items.iter().map(StorageItem::name).collect();
        assert_eq!(names, vec!["images", "a.txt", "b.txt", "c.txt"]);

        match &items[1] {
            StorageItem::File {
                download_url,
                size,
                content_type,
                updated,
                ..
            } => {
                let url = download_url.as_deref().unwrap();
                assert!(url.ends_with("/v0/b/demo.appspot.com/o/a.txt?alt=media&token=token-a.txt"));
                assert_eq!(*size, Some(12));
                assert_eq!(content_type.as_deref(), Some("text/plain"));
                assert_eq!(format_date(*updated), "2024-03-01 10:00:00 UTC");
            }
            other => panic!("expected a file, got {other:?}"),
        }

        assert_eq!(
            items[2],
            StorageItem::File {
                name: "b.txt".to_string(),
                full_path: "b.txt".to_string(),
                download_url: None,
                size: None,
                content_type: None,
                updated: None,
            }
        );
        assert!(matches!(&items[3], StorageItem::File { size: Some(2048), .. }));
    }

    #[tokio::test]
    async fn test_list_failure_keeps_items() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "");
            then.status(200).json_body(json!({ "prefixes": ["docs/"] }));
        });
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "docs/");
            then.status(500).body("");
        });

        let browser = StorageBrowser::new(connected_session(&server));
        browser.list().await.unwrap();

        let err = browser.navigate_into("docs").await.unwrap_err();
        assert!(matches!(err, BrowseError::Remote(StorageError::ApiError(_))));
        assert_eq!(browser.current_path(), "docs");
        assert_eq!(browser.error().as_deref(), Some(LIST_FAILED));
        assert_eq!(browser.items().len(), 1);
    }

    #[tokio::test]
    async fn test_navigation_and_selection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "");
            then.status(200).json_body(json!({ "prefixes": ["photos/"] }));
        });
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "photos/");
            then.status(200).json_body(json!({
                "prefixes": ["photos/2024/"],
                "items": [{ "name": "photos/cover.png" }]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "photos/2024/");
            then.status(200).json_body(json!({}));
        });

        let browser = StorageBrowser::new(connected_session(&server));
        assert_eq!(browser.navigate_up().await.unwrap(), 0);
        assert_eq!(browser.current_path(), "");

        browser.list().await.unwrap();
        let photos = browser.items()[0].clone();
        browser.select_item(&photos).await.unwrap();
        assert_eq!(browser.current_path(), "photos");
        assert_eq!(browser.items().len(), 2);

        let cover = browser.items()[1].clone();
        assert_eq!(cover.full_path(), "photos/cover.png");
        browser.select_item(&cover).await.unwrap();
        assert_eq!(browser.selected(), Some(cover));
        assert_eq!(browser.current_path(), "photos");

        browser.navigate_into("photos/2024").await.unwrap();
        assert!(browser.selected().is_none());
        assert!(browser.items().is_empty());

        browser.navigate_up().await.unwrap();
        assert_eq!(browser.current_path(), "photos");
        browser.navigate_up().await.unwrap();
        assert_eq!(browser.current_path(), "");
    }

    #[tokio::test]
    async fn test_upload_progress_bounds() {
        let server = MockServer::start();
        let upload = server.mock(|when, then| {
            when.method(POST)
                .path(BUCKET_PATH)
                .query_param("name", "notes.txt")
                .header("x-goog-upload-protocol", "raw")
                .body("hello");
            then.status(200)
                .delay(Duration::from_millis(900))
                .json_body(object_metadata("notes.txt", 5));
        });
        server.mock(|when, then| {
            when.method(GET).path(BUCKET_PATH).query_param("prefix", "");
            then.status(200)
                .json_body(json!({ "items": [{ "name": "notes.txt" }] }));
        });
        mock_metadata(&server, "notes.txt", 5);

        let browser = StorageBrowser::new(connected_session(&server));
        let mut reported = Vec::new();
        let metadata = browser
            .upload("notes.txt", "hello", "text/plain", |p| reported.push(p))
            .await
            .unwrap();
        upload.assert();

        assert_eq!(metadata.size_bytes(), Some(5));
        assert_eq!(reported.first(), Some(&0.0));
        assert_eq!(reported.last(), Some(&100.0));
        assert!(reported.len() > 2);
        let synthetic = &reported[..reported.len() - 1];
        assert!(synthetic.iter().all(|p| (0.0..=PROGRESS_CEILING).contains(p)));
        assert!(synthetic.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(browser.upload_progress(), 100.0);
        assert_eq!(browser.items().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_resets_progress() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(BUCKET_PATH);
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "Permission denied." }
            }));
        });

        let browser = StorageBrowser::new(connected_session(&server));
        let mut reported = Vec::new();
        let err = browser
            .upload("notes.txt", "hello", "text/plain", |p| reported.push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, BrowseError::Remote(_)));
        assert_eq!(reported.last(), Some(&0.0));
        assert_eq!(browser.error().as_deref(), Some(UPLOAD_FAILED));
    }

    #[tokio::test]
    async fn test_not_ready_without_config() {
        let browser = StorageBrowser::new(Arc::new(ConsoleSession::new()));
        assert!(matches!(browser.list().await, Err(BrowseError::NotReady)));
        let folder = StorageItem::Folder {
            name: "a".to_string(),
            full_path: "a".to_string(),
        };
        assert!(matches!(
            browser.download(&folder).await,
            Err(BrowseError::NotAFile(_))
        ));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(None), "");
        assert_eq!(format_file_size(Some(0)), "0 Bytes");
        assert_eq!(format_file_size(Some(512)), "512 Bytes");
        assert_eq!(format_file_size(Some(1536)), "1.5 KB");
        assert_eq!(format_file_size(Some(5 * 1024 * 1024)), "5 MB");
    }
}
