//! App session state and the authentication boundary.
//!
//! Real sign-in providers live outside this crate. They plug in through
//! [`AuthProvider`]; [`DemoAuthProvider`] accepts any non-empty credentials.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CatalogError, Result};

/// A signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_out(&self) -> Result<()>;
}

/// Accepts any non-blank email and password.
#[derive(Debug, Default, Clone)]
pub struct DemoAuthProvider;

#[async_trait]
impl AuthProvider for DemoAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(CatalogError::Auth(
                "email and password are required".into(),
            ));
        }
        Ok(AuthUser {
            uid: format!("demo-{}", email.to_lowercase()),
            email: email.to_string(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

/// Onboarding and login state of the running app.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppSession {
    onboarded: bool,
    user: Option<AuthUser>,
}

impl AppSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_onboarded(&self) -> bool {
        self.onboarded
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn complete_onboarding(&mut self) {
        self.onboarded = true;
    }

    pub async fn login(
        &mut self,
        provider: &dyn AuthProvider,
        email: &str,
        password: &str,
    ) -> Result<&AuthUser> {
        let user = provider.sign_in(email, password).await?;
        tracing::info!("Signed in as {}", user.email);
        let user = self.user.insert(user);
        Ok(&*user)
    }

    /// Sign out. Local state is cleared even if the provider call fails.
    pub async fn logout(&mut self, provider: &dyn AuthProvider) -> Result<()> {
        let result = provider.sign_out().await;
        if let Some(user) = self.user.take() {
            tracing::info!("Signed out {}", user.email);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_flow() {
        let provider = DemoAuthProvider;
        let mut session = AppSession::new();
        assert!(!session.is_onboarded());
        session.complete_onboarding();
        assert!(session.is_onboarded());

        let user = session
            .login(&provider, "Ana@Example.com", "secret")
            .await
            .unwrap();
        assert_eq!(user.uid, "demo-ana@example.com");
        assert!(session.is_logged_in());

        session.logout(&provider).await.unwrap();
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_login_rejects_blank_credentials() {
        let mut session = AppSession::new();
        let err = session
            .login(&DemoAuthProvider, "  ", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Auth(_)));
        assert!(session.login(&DemoAuthProvider, "a@b.c", "").await.is_err());
        assert!(!session.is_logged_in());
    }
}
