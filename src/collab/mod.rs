//! External collaborator contracts.
//!
//! Each trait is a narrow seam around a managed service: the identity
//! provider (account directory + credential checks), object storage
//! (presigned file URLs), the mailer, and the event bus. Repositories hold
//! them as trait objects; test doubles live with the test suite.
//!
//! Failure policy differs per collaborator and the callers enforce it:
//! identity-provider failures abort the workflow, mailer and event-bus
//! failures are logged and swallowed.

use async_trait::async_trait;
use tracing::info;

pub mod s3;
pub mod sns;

pub use s3::S3ObjectStorage;
pub use sns::SnsEventBus;

/// Result type for collaborator operations.
pub type Result<T> = std::result::Result<T, CollabError>;

/// Errors raised by external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("identity provider: {0}")]
    Identity(String),

    #[error("object storage: {0}")]
    ObjectStorage(String),

    #[error("mail delivery: {0}")]
    Mail(String),

    #[error("event bus: {0}")]
    Bus(String),
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Credentials accepted; tokens issued.
    Tokens {
        id_token: String,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i32,
    },
    /// The provider demands a follow-up step (e.g. forced password change).
    Challenge { kind: String, session: String },
}

/// Account directory and credential verification.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register an account. The profile item is written separately by the
    /// caller; a failure after this call leaves an orphan account.
    async fn create_account(
        &self,
        username: &str,
        email: &str,
        temporary_password: &str,
    ) -> Result<()>;

    /// Verify credentials, returning tokens or a pending challenge.
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome>;

    /// Resolve the account email behind an access token.
    async fn email_for_token(&self, access_token: &str) -> Result<String>;

    /// Answer a pending challenge (new password flow).
    async fn respond_to_challenge(
        &self,
        username: &str,
        session: &str,
        new_password: &str,
    ) -> Result<AuthOutcome>;
}

/// Presigned-URL issuing for file attachments. The service never proxies
/// file bytes; clients talk to storage directly.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn issue_upload_url(
        &self,
        object_key: &str,
        content_type: &str,
        expires_secs: u64,
    ) -> Result<String>;

    async fn issue_download_url(&self, object_key: &str, expires_secs: u64) -> Result<String>;
}

/// Outbound email. Callers treat delivery as fire-and-forget.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<()>;
}

/// Best-effort domain event publication.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event_type: &str, payload: serde_json::Value) -> Result<()>;
}

/// Mailer that only logs. Stands in where no mail transport is configured.
#[derive(Default)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, to: &[String], subject: &str, _body: &str) -> Result<()> {
        info!(recipients = to.len(), subject = %subject, "Mail suppressed (logging mailer)");
        Ok(())
    }
}
