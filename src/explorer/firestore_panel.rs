//! The Firestore explorer: a query form bound to a session, the last result
//! set and the bookmarked collections.
//!
//! A panel can be shared between tasks. Every execution takes a generation
//! number and only the newest execution may write results or errors, so a
//! slow response can never overwrite a newer one.

use super::bookmarks::{CollectionBookmarks, KeyValueStore};
use super::query_builder::QueryBuilder;
use crate::firestore::FirestoreError;
use crate::session::ConsoleSession;
use serde_json::Value as SerdeValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No collection selected")]
    NoCollection,
    #[error("Firestore is not initialized")]
    NotReady,
    #[error(transparent)]
    Remote(#[from] FirestoreError),
}

impl QueryError {
    /// True when nothing was sent because the panel was not ready.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, QueryError::NoCollection | QueryError::NotReady)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Results were replaced with this many documents.
    Applied { documents: usize },
    /// A newer execution started meanwhile; this response was dropped.
    Superseded,
}

struct PanelInner {
    builder: QueryBuilder,
    bookmarks: CollectionBookmarks,
    results: Vec<SerdeValue>,
    error: Option<String>,
    in_flight: usize,
}

/// Counts one execution as in flight until dropped, so a cancelled
/// `execute` future still returns the panel to idle.
struct InFlight<'a> {
    inner: &'a Mutex<PanelInner>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }
}

pub struct QueryPanel {
    session: Arc<ConsoleSession>,
    store: Arc<dyn KeyValueStore>,
    inner: Mutex<PanelInner>,
    generation: AtomicU64,
}

impl QueryPanel {
    /// Loads the saved bookmarks and preselects the first one.
    pub fn new(session: Arc<ConsoleSession>, store: Arc<dyn KeyValueStore>) -> Self {
        let bookmarks = CollectionBookmarks::load(store.as_ref());
        let builder = QueryBuilder::new(bookmarks.first().unwrap_or_default());

        Self {
            session,
            store,
            inner: Mutex::new(PanelInner {
                builder,
                bookmarks,
                results: Vec::new(),
                error: None,
                in_flight: 0,
            }),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PanelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edits the query form in place.
    pub fn with_builder<R>(&self, f: impl FnOnce(&mut QueryBuilder) -> R) -> R {
        f(&mut self.lock().builder)
    }

    pub fn builder(&self) -> QueryBuilder {
        self.lock().builder.clone()
    }

    pub fn select_collection(&self, name: &str) {
        self.lock().builder.collection = name.to_string();
    }

    /// Bookmarks `name` (if new) and selects it. Blank names are ignored.
    pub fn add_bookmark(&self, name: &str) -> bool {
        if name.trim().is_empty() {
            return false;
        }
        let mut inner = self.lock();
        let added = inner.bookmarks.add(name);
        if added {
            inner.bookmarks.persist(self.store.as_ref());
        }
        inner.builder.collection = name.to_string();
        added
    }

    /// Drops a bookmark. If it was selected, the first remaining one (or
    /// nothing) becomes selected.
    pub fn remove_bookmark(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if !inner.bookmarks.remove(name) {
            return false;
        }
        inner.bookmarks.persist(self.store.as_ref());
        if inner.builder.collection == name {
            let next = inner.bookmarks.first().unwrap_or_default().to_string();
            inner.builder.collection = next;
        }
        true
    }

    pub fn bookmarks(&self) -> Vec<String> {
        self.lock().bookmarks.names().to_vec()
    }

    pub fn results(&self) -> Vec<SerdeValue> {
        self.lock().results.clone()
    }

    /// The result set as pretty-printed JSON.
    pub fn results_json(&self) -> String {
        let results = SerdeValue::Array(self.results());
        serde_json::to_string_pretty(&results).unwrap_or_else(|_| "[]".to_string())
    }

    /// `"1 document"`, `"3 documents"`.
    pub fn result_count_label(&self) -> String {
        match self.lock().results.len() {
            1 => "1 document".to_string(),
            n => format!("{} documents", n),
        }
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn state(&self) -> PanelState {
        if self.lock().in_flight > 0 {
            PanelState::Executing
        } else {
            PanelState::Idle
        }
    }

    /// Runs the current query once.
    ///
    /// Not-ready conditions return before any request is made. On success the
    /// results are replaced and the collection is bookmarked; on failure the
    /// message is recorded and the previous results stay.
    pub async fn execute(&self) -> Result<ExecutionOutcome, QueryError> {
        let (builder, firestore, generation) = {
            let mut inner = self.lock();
            if inner.builder.collection.is_empty() {
                return Err(QueryError::NoCollection);
            }
            let firestore = self.session.firestore().ok_or(QueryError::NotReady)?;

            inner.error = None;
            inner.in_flight += 1;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (inner.builder.clone(), firestore, generation)
        };

        let in_flight = InFlight { inner: &self.inner };

        debug!(collection = %builder.collection, generation, "executing query");
        let result = async {
            let query = builder.build()?;
            firestore.query(query).get().await?.to_records()
        }
        .await;

        drop(in_flight);
        let mut inner = self.lock();

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(collection = %builder.collection, generation, "discarding stale query response");
            return Ok(ExecutionOutcome::Superseded);
        }

        match result {
            Ok(records) => {
                let documents = records.len();
                inner.results = records;
                if inner.bookmarks.add(&builder.collection) {
                    inner.bookmarks.persist(self.store.as_ref());
                }
                info!(collection = %builder.collection, documents, "query executed");
                Ok(ExecutionOutcome::Applied { documents })
            }
            Err(e) => {
                error!(collection = %builder.collection, error = %e, "error executing query");
                inner.error = Some(e.to_string());
                Err(QueryError::Remote(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::core::endpoints::Endpoints;
    use crate::explorer::bookmarks::{MemoryStore, COLLECTIONS_STORAGE_KEY};
    use crate::explorer::query_builder::QueryCondition;
    use crate::firestore::models::FieldOperator;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    const RUN_QUERY_PATH: &str = "/v1/projects/demo/databases/(default)/documents:runQuery";

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

    fn user_doc(id: &str, age: i64) -> serde_json::Value {
        json!({
            "document": {
                "name": format!("projects/demo/databases/(default)/documents/users/{}", id),
                "fields": { "age": { "integerValue": age.to_string() } },
                "createTime": "2024-01-01T00:00:00Z",
                "updateTime": "2024-01-01T00:00:00Z"
            },
            "readTime": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_not_ready_without_connection() {
        let panel = QueryPanel::new(
            Arc::new(ConsoleSession::new()),
            Arc::new(MemoryStore::default()),
        );
        panel.select_collection("users");

        let err = panel.execute().await.unwrap_err();
        assert!(matches!(err, QueryError::NotReady));
        assert!(err.is_not_ready());
        assert_eq!(panel.state(), PanelState::Idle);
    }

    #[tokio::test]
    async fn test_no_collection_sends_nothing() {
        let server = MockServer::start();
        let panel = QueryPanel::new(connected_session(&server), Arc::new(MemoryStore::default()));

        assert!(matches!(panel.execute().await, Err(QueryError::NoCollection)));
        assert_eq!(panel.state(), PanelState::Idle);
    }

    #[tokio::test]
    async fn test_success_replaces_results_and_bookmarks_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(RUN_QUERY_PATH)
                .json_body(json!({
                    "structuredQuery": {
                        "from": [{ "collectionId": "users" }],
                        "where": { "fieldFilter": {
                            "field": { "fieldPath": "age" },
                            "op": "GREATER_THAN_OR_EQUAL",
                            "value": { "integerValue": "18" }
                        }},
                        "limit": 10
                    }
                }));
            then.status(200)
                .json_body(json!([user_doc("alice", 30), user_doc("bob", 41)]));
        });

        let store = Arc::new(MemoryStore::default());
        let panel = QueryPanel::new(connected_session(&server), store.clone());
        panel.with_builder(|b| {
            b.collection = "users".to_string();
            b.push_condition(QueryCondition::new("age", FieldOperator::GreaterThanOrEqual, "18"));
            b.set_limit("-5");
        });

        let outcome = panel.execute().await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Applied { documents: 2 });
        mock.assert();
        panel.execute().await.unwrap();

        assert_eq!(panel.results()[0], json!({ "id": "alice", "age": 30 }));
        assert_eq!(panel.result_count_label(), "2 documents");
        assert_eq!(panel.bookmarks(), vec!["users".to_string()]);
        assert_eq!(
            store.get(COLLECTIONS_STORAGE_KEY).unwrap().as_deref(),
            Some(r#"["users"]"#)
        );
        assert!(panel.results_json().starts_with("[\n  {\n    \"id\": \"alice\""));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(RUN_QUERY_PATH).body_includes("\"users\"");
            then.status(200).json_body(json!([user_doc("alice", 30)]));
        });
        server.mock(|when, then| {
            when.method(POST).path(RUN_QUERY_PATH).body_includes("\"orders\"");
            then.status(400).json_body(json!({
                "error": {
                    "code": 400,
                    "message": "The query requires an index.",
                    "status": "FAILED_PRECONDITION"
                }
            }));
        });

        let panel = QueryPanel::new(connected_session(&server), Arc::new(MemoryStore::default()));
        panel.select_collection("users");
        panel.execute().await.unwrap();

        panel.select_collection("orders");
        let err = panel.execute().await.unwrap_err();
        assert!(matches!(err, QueryError::Remote(_)));
        assert_eq!(
            panel.error().as_deref(),
            Some("The query requires an index. (code: 400, status: FAILED_PRECONDITION)")
        );
        assert_eq!(panel.results().len(), 1);
        assert_eq!(panel.bookmarks(), vec!["users".to_string()]);
        assert_eq!(panel.state(), PanelState::Idle);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(RUN_QUERY_PATH).body_includes("\"slow\"");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!([user_doc("old", 1)]));
        });
        server.mock(|when, then| {
            when.method(POST).path(RUN_QUERY_PATH).body_includes("\"fast\"");
            then.status(200).json_body(json!([user_doc("new", 2)]));
        });

        let panel = QueryPanel::new(connected_session(&server), Arc::new(MemoryStore::default()));
        panel.select_collection("slow");

        let (slow, fast) = tokio::join!(panel.execute(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            panel.select_collection("fast");
            panel.execute().await
        });

        assert_eq!(slow.unwrap(), ExecutionOutcome::Superseded);
        assert_eq!(fast.unwrap(), ExecutionOutcome::Applied { documents: 1 });
        assert_eq!(panel.results()[0]["id"], json!("new"));
        assert_eq!(panel.bookmarks(), vec!["fast".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_execution_returns_to_idle() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(RUN_QUERY_PATH);
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!([user_doc("alice", 30)]));
        });

        let panel = QueryPanel::new(connected_session(&server), Arc::new(MemoryStore::default()));
        panel.select_collection("users");

        let timed_out = tokio::time::timeout(Duration::from_millis(50), panel.execute()).await;
        assert!(timed_out.is_err());
        assert_eq!(panel.state(), PanelState::Idle);
        assert!(panel.results().is_empty());
        assert!(panel.bookmarks().is_empty());
    }

    #[test]
    fn test_bookmark_selection() {
        let store = Arc::new(MemoryStore::default());
        store
            .set(COLLECTIONS_STORAGE_KEY, r#"["orders","users"]"#)
            .unwrap();

        let panel = QueryPanel::new(Arc::new(ConsoleSession::new()), store.clone());
        assert_eq!(panel.builder().collection, "orders");

        assert!(panel.add_bookmark("products"));
        assert!(!panel.add_bookmark("users"));
        assert_eq!(panel.builder().collection, "users");

        assert!(panel.remove_bookmark("users"));
        assert_eq!(panel.builder().collection, "orders");
        assert_eq!(
            store.get(COLLECTIONS_STORAGE_KEY).unwrap().as_deref(),
            Some(r#"["orders","products"]"#)
        );
    }
}
