use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithPasswordRequest {
    pub email: String,
    pub password: String,
    pub return_secure_token: bool,
}

/// Result of a successful email/password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds, sent as a string.
    pub expires_in: Option<String>,
    pub registered: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    pub users: Option<Vec<UserRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub local_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    pub last_login_at: Option<String>,
    pub created_at: Option<String>,
    pub provider_user_info: Option<Vec<ProviderUserInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUserInfo {
    pub provider_id: String,
    pub federated_id: Option<String>,
    pub email: Option<String>,
    pub raw_id: Option<String>,
}
