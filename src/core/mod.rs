//! Plumbing shared by the REST clients: the Google API error envelope,
//! service endpoints and the request middleware.

pub mod endpoints;
pub mod middleware;


use self::middleware::ApiKeyMiddleware;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        match &self.error.status {
            Some(status) => format!(
                "{} (code: {}, status: {})",
                self.error.message, self.error.code, status
            ),
            None => format!("{} (code: {})", self.error.message, self.error.code),
        }
    }
}

/// Reads a failed response and turns it into a human readable message.
///
/// Google APIs wrap failures in `{"error": {...}}`; anything else falls back to
/// `default_msg` plus the HTTP status.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<FirebaseErrorResponse>(&text) {
        Ok(error_resp) => error_resp.display_message(),
        Err(_) if text.trim().is_empty() => format!("{}: {}", default_msg, status),
        Err(_) => format!("{}: {}: {}", default_msg, status, text.trim()),
    }
}

/// Builds an HTTP client that signs every request with `middleware`.
///
/// No retry layer is installed: every failure is reported to the caller as is.
pub fn build_client(middleware: ApiKeyMiddleware) -> Result<ClientWithMiddleware, reqwest::Error> {
    let client = Client::builder().build()?;
    Ok(ClientBuilder::new(client).with(middleware).build())
}
