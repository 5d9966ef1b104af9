use super::models::{ListResponse, ObjectMetadata};
use super::{ListResult, StorageError};
use crate::core::parse_error_response;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

/// Joins path segments, dropping empty ones so `"a//b/"` becomes `"a/b"`.
pub(crate) fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// A location in a storage bucket: either the root, a folder prefix or an
/// object.
#[derive(Clone)]
pub struct StorageReference {
    client: ClientWithMiddleware,
    base_url: String,
    bucket: String,
    full_path: String,
}

impl std::fmt::Debug for StorageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageReference")
            .field("bucket", &self.bucket)
            .field("full_path", &self.full_path)
            .finish()
    }
}

impl StorageReference {
    pub(crate) fn new(
        client: ClientWithMiddleware,
        base_url: String,
        bucket: String,
        path: &str,
    ) -> Self {
        Self {
            client,
            base_url,
            bucket,
            full_path: normalize_path(path),
        }
    }

    /// The last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.full_path.rsplit('/').next().unwrap_or_default()
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_root(&self) -> bool {
        self.full_path.is_empty()
    }

    /// A reference to `path` below this one.
    pub fn child(&self, path: &str) -> StorageReference {
        self.with_path(&format!("{}/{}", self.full_path, path))
    }

    /// The enclosing folder, or `None` at the root.
    pub fn parent(&self) -> Option<StorageReference> {
        if self.is_root() {
            return None;
        }
        let parent = match self.full_path.rfind('/') {
            Some(idx) => &self.full_path[..idx],
            None => "",
        };
        Some(self.with_path(parent))
    }

    fn with_path(&self, path: &str) -> StorageReference {
        StorageReference::new(
            self.client.clone(),
            self.base_url.clone(),
            self.bucket.clone(),
            path,
        )
    }

    fn bucket_url(&self) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["b", self.bucket.as_str(), "o"]);
        Ok(url)
    }

    /// `{base}/b/{bucket}/o/{path}` with the object path encoded as one
    /// segment (slashes become `%2F`).
    fn object_url(&self) -> Result<Url, StorageError> {
        let mut url = self.bucket_url()?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidUrl(self.base_url.clone()))?
            .push(&self.full_path);
        Ok(url)
    }

    /// Lists the folders and objects directly below this reference, following
    /// page tokens until the listing is complete.
    pub async fn list_all(&self) -> Result<ListResult, StorageError> {
        let url = self.bucket_url()?;
        let prefix = if self.is_root() {
            String::new()
        } else {
            format!("{}/", self.full_path)
        };

        let mut result = ListResult::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("prefix", prefix.clone()), ("delimiter", "/".to_string())];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }

            let response = self
                .client
                .get(url.as_str())
                .query(&params)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(StorageError::ApiError(
                    parse_error_response(response, "List failed").await,
                ));
            }

            let page: ListResponse = response.json().await?;
            result
                .prefixes
                .extend(page.prefixes.iter().map(|p| self.with_path(p)));
            result
                .items
                .extend(page.items.iter().map(|item| self.with_path(&item.name)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(result)
    }

    pub async fn get_metadata(&self) -> Result<ObjectMetadata, StorageError> {
        let response = self.client.get(self.object_url()?.as_str()).send().await?;

        if !response.status().is_success() {
            return Err(StorageError::ApiError(
                parse_error_response(response, "Get metadata failed").await,
            ));
        }

        Ok(response.json().await?)
    }

    /// A long-lived URL serving the object's content, built from its first
    /// download token.
    pub async fn get_download_url(&self) -> Result<String, StorageError> {
        let metadata = self.get_metadata().await?;
        self.download_url_from(&metadata)
    }

    pub(crate) fn download_url_from(&self, metadata: &ObjectMetadata) -> Result<String, StorageError> {
        let token = metadata
            .first_download_token()
            .ok_or_else(|| StorageError::NoDownloadUrl(self.full_path.clone()))?;

        let mut url = self.object_url()?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.to_string())
    }

    /// Uploads `body` as the content of this object.
    pub async fn put(
        &self,
        body: impl Into<reqwest::Body>,
        content_type: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        let url = self.bucket_url()?;

        let response = self
            .client
            .post(url.as_str())
            .query(&[("name", self.full_path.as_str())])
            .header(header::CONTENT_TYPE, content_type)
            .header("X-Goog-Upload-Protocol", "raw")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::ApiError(
                parse_error_response(response, "Upload failed").await,
            ));
        }

        Ok(response.json().await?)
    }

    /// Downloads the object's content.
    pub async fn download(&self) -> Result<bytes::Bytes, StorageError> {
        let response = self
            .client
            .get(self.object_url()?.as_str())
            .query(&[("alt", "media")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::ApiError(
                parse_error_response(response, "Download failed").await,
            ));
        }

        Ok(response.bytes().await?)
    }
}
