//! Error taxonomy for the verification subsystem.
//!
//! A single tagged error type carries a `kind` discriminator plus the partial
//! `passed` output captured before a script/codelab failure. Severity is
//! derived from the kind, not stored separately:
//!   - Warning  : recoverable, caused by the user (retry limit, wrong answer, timeout)
//!   - Error    : caller/author mistakes (bad config, unknown target)
//!   - Critical : unexpected internal faults (logged, surfaced generically)

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyErrorKind {
    /// Author misconfiguration. Fatal at startup, never raised per-request.
    Config,
    /// User must wait before re-submitting.
    RetryLimit,
    /// The submission itself was wrong or incomplete.
    User,
    /// A sandboxed process exceeded its time budget and was killed.
    Timeout,
    /// No verification target registered under the requested name.
    TargetName,
    /// Verification was requested but the registry was never built.
    FactoryInit,
    /// Outbound progress/catalog request failed.
    Http,
    /// Anything else. Should be logged with full context.
    Internal,
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct VerifyError {
    pub kind: VerifyErrorKind,
    pub message: String,
    /// Stdout lines captured before the failure, so the UI can show
    /// partial progress even when verification fails.
    pub passed: Vec<String>,
}

impl VerifyError {
    pub fn new(kind: VerifyErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), passed: Vec::new() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::Config, message)
    }

    pub fn retry_limit(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::RetryLimit, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::User, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::Timeout, message)
    }

    pub fn target_name(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::TargetName, message)
    }

    pub fn factory_init(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::FactoryInit, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::Http, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::Internal, message)
    }

    pub fn with_passed(mut self, passed: Vec<String>) -> Self {
        self.passed = passed;
        self
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            VerifyErrorKind::RetryLimit | VerifyErrorKind::User | VerifyErrorKind::Timeout => {
                Severity::Warning
            }
            VerifyErrorKind::Config
            | VerifyErrorKind::TargetName
            | VerifyErrorKind::FactoryInit
            | VerifyErrorKind::Http => Severity::Error,
            VerifyErrorKind::Internal => Severity::Critical,
        }
    }
}

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a document is not found for {0}")]
    NotFound(String),
}

impl From<StoreError> for VerifyError {
    fn from(err: StoreError) -> Self {
        VerifyError::internal(err.to_string())
    }
}
