use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next};
use http::Extensions;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// The ID token of the signed-in user, shared between the auth client (writer)
/// and the Firestore and Storage clients (readers).
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    id_token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_id_token(&self, token: impl Into<String>) {
        *self.id_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.id_token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn id_token(&self) -> Option<String> {
        self.id_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.id_token().is_some()
    }
}

/// How the ID token is presented in the `Authorization` header.
///
/// Firestore accepts a standard bearer token; Firebase Storage expects the
/// `Firebase` scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenScheme {
    Bearer,
    Firebase,
}

impl TokenScheme {
    fn prefix(self) -> &'static str {
        match self {
            TokenScheme::Bearer => "Bearer",
            TokenScheme::Firebase => "Firebase",
        }
    }
}

/// Appends the project's web API key to every request and, once a user has
/// signed in, their ID token.
#[derive(Clone, Debug)]
pub struct ApiKeyMiddleware {
    api_key: String,
    credentials: Credentials,
    scheme: TokenScheme,
}

impl ApiKeyMiddleware {
    pub fn new(api_key: impl Into<String>, credentials: Credentials, scheme: TokenScheme) -> Self {
        Self {
            api_key: api_key.into(),
            credentials,
            scheme,
        }
    }
}

#[async_trait::async_trait]
impl Middleware for ApiKeyMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if !self.api_key.is_empty() {
            req.url_mut()
                .query_pairs_mut()
                .append_pair("key", &self.api_key);
        }

        if let Some(token) = self.credentials.id_token() {
            let value = header::HeaderValue::from_str(&format!("{} {}", self.scheme.prefix(), token))
                .map_err(|e| {
                    reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                        "Invalid ID token header: {}",
                        e
                    ))
                })?;
            req.headers_mut().insert(header::AUTHORIZATION, value);
        }

        debug!(method = %req.method(), path = req.url().path(), "sending request");
        next.run(req, extensions).await
    }
}
