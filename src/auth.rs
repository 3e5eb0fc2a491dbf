//! Signed-in user as seen by this crate.
//!
//! Authentication itself happens elsewhere; the session is handed in from
//! configuration and only read here.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOGIN_URL: &str = "http://127.0.0.1:3000/login";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
}

impl User {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug)]
pub struct AuthSession {
    user: Option<User>,
    token: Option<String>,
    loading: bool,
    login_url: String,
}

impl AuthSession {
    pub fn signed_in(user: User, token: Option<String>) -> Self {
        Self {
            user: Some(user),
            token,
            loading: false,
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            token: None,
            loading: false,
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }

    /// Session whose user lookup has not resolved yet.
    pub fn pending() -> Self {
        Self {
            loading: true,
            ..Self::anonymous()
        }
    }

    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        !self.loading && self.user.is_some()
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Forget the user and credentials.
    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            log::info!("signed out {}", user.display_name());
        }
        self.token = None;
        self.loading = false;
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_clears_user_and_token() {
        let mut session = AuthSession::signed_in(
            User {
                id: "u-1".to_string(),
                name: Some("Mona".to_string()),
            },
            Some("secret".to_string()),
        );
        assert!(session.is_authenticated());
        assert_eq!(session.user().map(User::display_name), Some("Mona"));

        session.logout();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert_eq!(session.login_url(), DEFAULT_LOGIN_URL);
    }

    #[test]
    fn pending_session_is_not_authenticated() {
        let session = AuthSession::pending();
        assert!(session.is_loading());
        assert!(!session.is_authenticated());
    }
}
