//! Cloud Firestore module.
//!
//! Read-only access to the document database: one-shot structured queries
//! against a collection and listing of root collection ids. Results are
//! snapshots, never live listeners.

pub mod models;
pub mod query;
pub mod snapshot;
pub mod value;


use self::models::{ListCollectionIdsRequest, ListCollectionIdsResponse};
use self::query::{ExecutableQuery, Query};
use crate::core::parse_error_response;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

/// Errors that can occur during Firestore operations.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firestore API.
    #[error("{0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Client for interacting with Cloud Firestore.
#[derive(Clone)]
pub struct FirebaseFirestore {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseFirestore {
    /// `api_root` is the service root (`https://firestore.googleapis.com/v1`).
    pub fn new(client: ClientWithMiddleware, api_root: &str, project_id: &str) -> Self {
        let base_url = format!(
            "{}/projects/{}/databases/(default)/documents",
            api_root, project_id
        );
        Self { client, base_url }
    }

    /// The `.../documents` URL every request is relative to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a query over every document of `collection_id`.
    pub fn collection(&self, collection_id: &str) -> ExecutableQuery<'_> {
        self.query(Query::new(collection_id))
    }

    /// Attaches a query definition to this client.
    pub fn query(&self, query: Query) -> ExecutableQuery<'_> {
        ExecutableQuery::new(&self.client, self.base_url.clone(), query)
    }

    /// Lists the ids of the root collections of the database.
    pub async fn list_collection_ids(&self) -> Result<Vec<String>, FirestoreError> {
        let url = format!("{}:listCollectionIds", self.base_url);
        let mut ids = Vec::new();
        let mut next_page_token = None;

        loop {
            let request = ListCollectionIdsRequest {
                page_size: Some(100),
                page_token: next_page_token.take(),
            };

            let response = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&request)?)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(FirestoreError::ApiError(
                    parse_error_response(response, "List collections failed").await,
                ));
            }

            let result: ListCollectionIdsResponse = response.json().await?;
            ids.extend(result.collection_ids);

            match result.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }
}
