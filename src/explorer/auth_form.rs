//! Email/password sign-in form.

use crate::session::ConsoleSession;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthForm {
    pub email: String,
    pub password: String,
}

impl AuthForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Hands the credentials to the session. The outcome is only logged; check
    /// [`ConsoleSession::connection`] credentials to see whether it worked.
    pub async fn submit(&self, session: &ConsoleSession) {
        session.sign_in(&self.email, &self.password).await;
    }
}
