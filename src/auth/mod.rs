//! Firebase Authentication, as seen by a client holding the project's web API key.
//!
//! Signing in stores the returned ID token in the shared [`Credentials`], so
//! Firestore and Storage requests made afterwards run as that user.

pub mod models;


use crate::auth::models::{
    LookupRequest, LookupResponse, SignInResponse, SignInWithPasswordRequest, UserRecord,
};
use crate::core::middleware::Credentials;
use crate::core::parse_error_response;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("No user is signed in")]
    NotSignedIn,
    #[error("User not found")]
    UserNotFound,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Client for the Identity Toolkit REST API.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
    credentials: Credentials,
}

impl FirebaseAuth {
    /// `client` must not attach the ID token itself; `credentials` is the cell
    /// the other clients read from.
    pub fn new(client: ClientWithMiddleware, base_url: String, credentials: Credentials) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, AuthError> {
        let url = format!("{}/accounts:signInWithPassword", self.base_url);
        let request = SignInWithPasswordRequest {
            email: email.to_string(),
            password: password.to_string(),
            return_secure_token: true,
        };

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Sign in failed").await,
            ));
        }

        let result: SignInResponse = response.json().await?;
        self.credentials.set_id_token(result.id_token.clone());
        info!(uid = %result.local_id, "signed in");
        Ok(result)
    }

    /// Looks up the account behind the stored ID token.
    pub async fn current_user(&self) -> Result<UserRecord, AuthError> {
        let id_token = self.credentials.id_token().ok_or(AuthError::NotSignedIn)?;
        let url = format!("{}/accounts:lookup", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&LookupRequest { id_token })?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Get user failed").await,
            ));
        }

        let result: LookupResponse = response.json().await?;

        result
            .users
            .and_then(|mut users| users.pop())
            .ok_or(AuthError::UserNotFound)
    }

    pub fn sign_out(&self) {
        self.credentials.clear();
    }
}
