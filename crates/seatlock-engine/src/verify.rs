//! Credential verification.
//!
//! Login is delegated to a [`CredentialVerifier`]. The manager never
//! inspects passwords itself; it forwards the pair and relays any rejection
//! message verbatim to the caller as
//! [`SessionError::AuthenticationFailed`](seatlock_protocol::SessionError::AuthenticationFailed).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use seatlock_protocol::AccountId;
use thiserror::Error;

/// A rejected login. The message travels to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct VerifyError(pub String);

/// Result type for verification.
pub type VerifyResult = std::result::Result<(), VerifyError>;

/// Checks account credentials.
///
/// This trait abstracts the verification backend (HTTP service, fixed table
/// for tests, etc.). Implementations own the policy; the session manager
/// only relays the outcome.
pub trait CredentialVerifier: Send + Sync {
    /// Verifies `password` for `account`.
    fn verify<'a>(
        &'a self,
        account: &'a AccountId,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = VerifyResult> + Send + 'a>>;
}

/// A verifier backed by a fixed credential table.
///
/// Intended for tests and demos. An empty table rejects every login.
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    accounts: HashMap<AccountId, String>,
}

impl StaticVerifier {
    /// Creates a verifier that rejects everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an accepted account/password pair.
    pub fn with_account(mut self, account: &str, password: &str) -> Self {
        self.accounts
            .insert(AccountId::new(account), password.to_string());
        self
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify<'a>(
        &'a self,
        account: &'a AccountId,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = VerifyResult> + Send + 'a>> {
        Box::pin(async move {
            match self.accounts.get(account) {
                Some(expected) if expected == password => Ok(()),
                Some(_) => Err(VerifyError("invalid password".to_string())),
                None => Err(VerifyError(format!("unknown account: {}", account))),
            }
        })
    }
}

/// Request body sent to the verification endpoint.
#[derive(Debug, serde::Serialize)]
struct VerifyRequest<'a> {
    account_id: &'a str,
    password: &'a str,
}

/// A verifier that POSTs credentials to an HTTP endpoint.
///
/// Any 2xx answer accepts the login. For other statuses the response body
/// is used as the rejection message, so the service's own wording reaches
/// the user.
pub struct HttpVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVerifier {
    /// Creates a verifier for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build verification HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl CredentialVerifier for HttpVerifier {
    fn verify<'a>(
        &'a self,
        account: &'a AccountId,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = VerifyResult> + Send + 'a>> {
        Box::pin(async move {
            let body = VerifyRequest {
                account_id: account.as_str(),
                password,
            };

            let resp = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    VerifyError(format!("verification service unreachable: {}", e))
                })?;

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }

            let message = resp.text().await.unwrap_or_default();
            let message = message.trim();
            if message.is_empty() {
                Err(VerifyError(format!("authentication failed (HTTP {})", status.as_u16())))
            } else {
                Err(VerifyError(message.to_string()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_verify_error_display_is_verbatim() {
        let err = VerifyError("Too many attempts. Try again later.".to_string());
        assert_eq!(err.to_string(), "Too many attempts. Try again later.");
    }

    #[tokio::test]
    async fn test_static_verifier_accepts_known_pair() {
        let verifier = StaticVerifier::new().with_account("user@example.com", "hunter2");
        let account = AccountId::new("user@example.com");

        assert!(verifier.verify(&account, "hunter2").await.is_ok());
    }

    #[tokio::test]
    async fn test_static_verifier_rejects_wrong_password() {
        let verifier = StaticVerifier::new().with_account("user@example.com", "hunter2");
        let account = AccountId::new("user@example.com");

        let err = verifier.verify(&account, "letmein").await.unwrap_err();
        assert_eq!(err.0, "invalid password");
    }

    #[tokio::test]
    async fn test_static_verifier_rejects_unknown_account() {
        let verifier = StaticVerifier::new();
        let account = AccountId::new("nobody@example.com");

        let err = verifier.verify(&account, "anything").await.unwrap_err();
        assert!(err.0.contains("unknown account"));
    }

    #[tokio::test]
    async fn test_static_verifier_matches_normalized_account() {
        let verifier = StaticVerifier::new().with_account("  User@Example.COM ", "hunter2");
        let account = AccountId::new("user@example.com");

        assert!(verifier.verify(&account, "hunter2").await.is_ok());
    }

    #[tokio::test]
    async fn test_verifier_as_trait_object() {
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(StaticVerifier::new().with_account("user@example.com", "pw"));
        let account = AccountId::new("user@example.com");

        assert!(verifier.verify(&account, "pw").await.is_ok());
    }

    #[test]
    fn test_http_verifier_construction() {
        assert!(HttpVerifier::new("https://auth.example.com/verify").is_ok());
    }

    /// Integration test against a live verification endpoint.
    ///
    /// Note: This test requires a running verification server to pass.
    /// It is marked as ignore by default.
    #[tokio::test]
    #[ignore = "requires running verification server"]
    async fn test_http_verifier_integration() {
        let verifier = HttpVerifier::new("http://localhost:8080/verify").unwrap();
        let account = AccountId::new("trial@seatlock.dev");

        let result = verifier.verify(&account, "trial").await;
        assert!(result.is_ok());
    }
}
