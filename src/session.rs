//! The console session: the active project configuration and the connection
//! every panel reads its remote handles from.
//!
//! The connection is created by the first configuration that is set and then
//! kept for the lifetime of the session. Setting a different configuration
//! later replaces the stored record but keeps talking to the original project.

use crate::auth::models::{SignInResponse, UserRecord};
use crate::auth::{AuthError, FirebaseAuth};
use crate::config::{ConfigError, ProjectConfig};
use crate::core::build_client;
use crate::core::endpoints::Endpoints;
use crate::core::middleware::{ApiKeyMiddleware, Credentials, TokenScheme};
use crate::firestore::FirebaseFirestore;
use crate::storage::FirebaseStorage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Firebase is not initialized")]
    NotConnected,
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Handles to the three remote services of one project.
pub struct Connection {
    config: ProjectConfig,
    credentials: Credentials,
    auth: FirebaseAuth,
    firestore: FirebaseFirestore,
    storage: FirebaseStorage,
}

impl Connection {
    pub fn connect(config: &ProjectConfig, endpoints: &Endpoints) -> Result<Self, SessionError> {
        let credentials = Credentials::new();

        // Identity Toolkit calls carry the API key only.
        let auth_client = build_client(ApiKeyMiddleware::new(
            config.api_key.as_str(),
            Credentials::new(),
            TokenScheme::Bearer,
        ))?;
        let firestore_client = build_client(ApiKeyMiddleware::new(
            config.api_key.as_str(),
            credentials.clone(),
            TokenScheme::Bearer,
        ))?;
        let storage_client = build_client(ApiKeyMiddleware::new(
            config.api_key.as_str(),
            credentials.clone(),
            TokenScheme::Firebase,
        ))?;

        Ok(Self {
            config: config.clone(),
            auth: FirebaseAuth::new(auth_client, endpoints.auth.clone(), credentials.clone()),
            firestore: FirebaseFirestore::new(
                firestore_client,
                &endpoints.firestore,
                &config.project_id,
            ),
            storage: FirebaseStorage::new(storage_client, &endpoints.storage, &config.storage_bucket),
            credentials,
        })
    }

    /// The configuration this connection was created from.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn auth(&self) -> &FirebaseAuth {
        &self.auth
    }

    pub fn firestore(&self) -> &FirebaseFirestore {
        &self.firestore
    }

    pub fn storage(&self) -> &FirebaseStorage {
        &self.storage
    }
}

enum ConnectionState {
    NotConnected,
    Connected(Arc<Connection>),
}

/// Shared by every panel, usually behind an `Arc`.
pub struct ConsoleSession {
    endpoints: Endpoints,
    config: RwLock<Option<ProjectConfig>>,
    state: RwLock<ConnectionState>,
    connection_attempts: AtomicUsize,
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSession {
    /// A session against the production endpoints.
    pub fn new() -> Self {
        Self::with_endpoints(Endpoints::default())
    }

    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            config: RwLock::new(None),
            state: RwLock::new(ConnectionState::NotConnected),
            connection_attempts: AtomicUsize::new(0),
        }
    }

    /// Stores `config` and connects if no connection exists yet.
    ///
    /// An existing connection is reused as is. Initialization failures are
    /// logged and leave the session not connected.
    pub fn set_config(&self, config: ProjectConfig) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match &*state {
            ConnectionState::Connected(existing) => {
                debug!(
                    project = %existing.config().project_id,
                    "reusing existing connection"
                );
            }
            ConnectionState::NotConnected => {
                self.connection_attempts.fetch_add(1, Ordering::SeqCst);
                match Connection::connect(&config, &self.endpoints) {
                    Ok(connection) => {
                        info!(project = %config.project_id, "connected to Firebase project");
                        *state = ConnectionState::Connected(Arc::new(connection));
                    }
                    Err(e) => error!(error = %e, "Firebase initialization failed"),
                }
            }
        }

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    /// Same as [`set_config`](Self::set_config); used by the config editor.
    pub fn update_config(&self, config: ProjectConfig) {
        self.set_config(config);
    }

    /// Validates pasted or uploaded JSON and, only if it is valid, sets it.
    pub fn submit_config_text(&self, text: &str) -> Result<(), ConfigError> {
        let config = ProjectConfig::parse(text)?;
        self.set_config(config);
        Ok(())
    }

    pub fn config(&self) -> Option<ProjectConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            ConnectionState::Connected(connection) => Some(connection.clone()),
            ConnectionState::NotConnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// How many times a connection was initialized.
    pub fn connection_attempts(&self) -> usize {
        self.connection_attempts.load(Ordering::SeqCst)
    }

    pub fn auth(&self) -> Option<FirebaseAuth> {
        self.connection().map(|c| c.auth().clone())
    }

    pub fn firestore(&self) -> Option<FirebaseFirestore> {
        self.connection().map(|c| c.firestore().clone())
    }

    pub fn storage(&self) -> Option<FirebaseStorage> {
        self.connection().map(|c| c.storage().clone())
    }

    /// Signs in and reports the outcome.
    pub async fn try_sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, SessionError> {
        let auth = self.auth().ok_or(SessionError::NotConnected)?;
        Ok(auth.sign_in_with_password(email, password).await?)
    }

    /// Fire-and-forget sign-in: failures are logged, not returned.
    pub async fn sign_in(&self, email: &str, password: &str) {
        if let Err(e) = self.try_sign_in(email, password).await {
            error!(error = %e, "sign in failed");
        }
    }

    pub fn sign_out(&self) {
        if let Some(auth) = self.auth() {
            auth.sign_out();
        }
    }

    pub async fn current_user(&self) -> Result<UserRecord, SessionError> {
        let auth = self.auth().ok_or(SessionError::NotConnected)?;
        Ok(auth.current_user().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::query::Query;
    use httpmock::prelude::*;
    use serde_json::json;

    fn sample_config(project_id: &str) -> ProjectConfig {
        ProjectConfig {
            api_key: "test-key".to_string(),
            auth_domain: format!("{}.firebaseapp.com", project_id),
            project_id: project_id.to_string(),
            storage_bucket: format!("{}.appspot.com", project_id),
            messaging_sender_id: "1234".to_string(),
            app_id: "1:1234:web:abcd".to_string(),
            measurement_id: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_new_session_is_not_connected() {
        let session = ConsoleSession::new();
        assert!(!session.is_connected());
        assert!(session.config().is_none());
        assert!(session.firestore().is_none());
        assert!(session.storage().is_none());
        assert!(session.auth().is_none());
    }

    #[test]
    fn test_connection_is_initialized_once() {
        let session = ConsoleSession::new();

        session.set_config(sample_config("first"));
        assert_eq!(session.connection_attempts(), 1);
        let first = session.connection().unwrap();

        session.update_config(sample_config("second"));
        assert_eq!(session.connection_attempts(), 1);
        let second = session.connection().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        // The stored record is replaced, the live connection is not.
        assert_eq!(session.config().unwrap().project_id, "second");
        assert_eq!(second.config().project_id, "first");
    }

    #[test]
    fn test_empty_strings_still_connect() {
        let session = ConsoleSession::new();
        let mut config = sample_config("p");
        config.api_key.clear();
        config.project_id.clear();

        session.set_config(config);
        assert!(session.is_connected());
        assert_eq!(session.connection_attempts(), 1);
    }

    #[test]
    fn test_invalid_text_never_connects() {
        let session = ConsoleSession::new();
        let text = json!({
            "apiKey": "k",
            "authDomain": "d",
            "projectId": "p",
            "storageBucket": "b",
            "messagingSenderId": "m"
        })
        .to_string();

        let err = session.submit_config_text(&text).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: appId");
        assert_eq!(session.connection_attempts(), 0);
        assert!(session.config().is_none());

        assert!(session.submit_config_text("not json").is_err());
        assert_eq!(session.connection_attempts(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_before_connecting() {
        let session = ConsoleSession::new();
        assert!(matches!(
            session.try_sign_in("a@b.c", "pw").await,
            Err(SessionError::NotConnected)
        ));
        // Reported through the log only.
        session.sign_in("a@b.c", "pw").await;
    }

    #[tokio::test]
    async fn test_signed_in_token_reaches_firestore() {
        let server = MockServer::start();
        let session = ConsoleSession::with_endpoints(Endpoints::all(server.url("")));
        session.set_config(sample_config("demo"));

        let sign_in = server.mock(|when, then| {
            when.method(POST).path("/v1/accounts:signInWithPassword");
            then.status(200).json_body(json!({
                "localId": "uid-1",
                "idToken": "id-token-1"
            }));
        });
        let query = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/demo/databases/(default)/documents:runQuery")
                .header("authorization", "Bearer id-token-1");
            then.status(200).json_body(json!([]));
        });

        session.sign_in("ada@example.com", "pw").await;
        sign_in.assert();

        let firestore = session.firestore().unwrap();
        firestore.query(Query::new("users")).get().await.unwrap();
        query.assert();

        session.sign_out();
        assert!(!session.connection().unwrap().credentials().is_signed_in());
    }
}
