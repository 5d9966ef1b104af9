use std::env;

const IDENTITY_TOOLKIT_V1_API: &str = "https://identitytoolkit.googleapis.com/v1";
const FIRESTORE_V1_API: &str = "https://firestore.googleapis.com/v1";
const FIREBASE_STORAGE_V0_API: &str = "https://firebasestorage.googleapis.com/v0";

/// Base URLs of the three remote services a console session talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// Identity Toolkit root, e.g. `https://identitytoolkit.googleapis.com/v1`.
    pub auth: String,
    /// Firestore root, e.g. `https://firestore.googleapis.com/v1`.
    pub firestore: String,
    /// Firebase Storage root, e.g. `https://firebasestorage.googleapis.com/v0`.
    pub storage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: IDENTITY_TOOLKIT_V1_API.to_string(),
            firestore: FIRESTORE_V1_API.to_string(),
            storage: FIREBASE_STORAGE_V0_API.to_string(),
        }
    }
}

impl Endpoints {
    /// Production endpoints, overridden per service by the usual emulator
    /// variables (`FIREBASE_AUTH_EMULATOR_HOST`, `FIRESTORE_EMULATOR_HOST`,
    /// `FIREBASE_STORAGE_EMULATOR_HOST`).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut endpoints = Self::default();
        let host = |name: &str| lookup(name).filter(|h| !h.trim().is_empty());

        if let Some(host) = host("FIREBASE_AUTH_EMULATOR_HOST") {
            endpoints.auth = format!("http://{}/identitytoolkit.googleapis.com/v1", host.trim());
        }
        if let Some(host) = host("FIRESTORE_EMULATOR_HOST") {
            endpoints.firestore = format!("http://{}/v1", host.trim());
        }
        if let Some(host) = host("FIREBASE_STORAGE_EMULATOR_HOST") {
            endpoints.storage = format!("http://{}/v0", host.trim());
        }

        endpoints
    }

    /// Points every service at the same root, which is what the tests do with a
    /// single mock server.
    pub fn all(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            auth: format!("{}/v1", base_url),
            firestore: format!("{}/v1", base_url),
            storage: format!("{}/v0", base_url),
        }
    }
}
