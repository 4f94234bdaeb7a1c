//! Error taxonomy for workspace provisioning
//!
//! Every provisioning component reports outcomes using three error kinds:
//! [`RetryError`] (transient, requeue the reconcile), [`FailError`] (terminal for
//! the workspace lifecycle, surfaced to the user) and [`WarningError`] (advisory,
//! reported without blocking startup). Store I/O errors that fit none of these
//! pass through [`WorkspaceError::Store`] unchanged and are treated by the caller
//! as retryable.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cluster::StoreError;
use crate::sync::SyncError;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Error Kinds
// =============================================================================

/// A transient condition: the caller should re-invoke the same operation,
/// optionally after `requeue_after`. A zero delay means the operation likely
/// already advanced cluster state and an immediate retry will make progress.
#[derive(Debug)]
pub struct RetryError {
    /// User-friendly explanation of why the reconcile must be retried
    pub message: String,
    /// Underlying error, if any. Not included in `Display` when `None`
    pub cause: Option<Cause>,
    /// How long to wait before requeueing. Zero means requeue immediately
    pub requeue_after: Duration,
}

impl RetryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            requeue_after: Duration::ZERO,
        }
    }

    pub fn after(message: impl Into<String>, requeue_after: Duration) -> Self {
        Self {
            message: message.into(),
            cause: None,
            requeue_after,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cause, self.message.is_empty()) {
            (Some(cause), false) => write!(f, "{}: {}", self.message, cause),
            (Some(cause), true) => write!(f, "{cause}"),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as _)
    }
}

/// An unrecoverable condition: retrying with the same input cannot succeed, so
/// workspace startup must be marked failed and the message surfaced to the user.
#[derive(Debug)]
pub struct FailError {
    /// User-friendly explanation of why provisioning failed
    pub message: String,
    /// Underlying error, if any. Not included in `Display` when `None`
    pub cause: Option<Cause>,
}

impl FailError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for FailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cause, self.message.is_empty()) {
            (Some(cause), false) => write!(f, "{}: {}", self.message, cause),
            (Some(cause), true) => write!(f, "{cause}"),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for FailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as _)
    }
}

/// A non-fatal condition reported to the user without retrying or failing
/// (e.g. an unsupported feature was ignored).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct WarningError {
    pub message: String,
}

impl WarningError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Umbrella Error
// =============================================================================

/// Unified error type for the provisioning core
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Retry(#[from] RetryError),

    #[error(transparent)]
    Fail(#[from] FailError),

    #[error(transparent)]
    Warning(#[from] WarningError),

    /// Generic cluster-store error that fits no other category. Callers treat
    /// this as retryable (fail-safe: when uncertain, retry).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Action the outer reconcile loop should take for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue the reconcile, optionally after a delay
    RequeueAfter(Duration),
    /// Mark the workspace failed and report to the user
    Fail,
    /// Attach the message to the workspace status without failing
    Warn,
}

impl WorkspaceError {
    pub fn retry(message: impl Into<String>) -> Self {
        RetryError::new(message).into()
    }

    pub fn retry_after(message: impl Into<String>, requeue_after: Duration) -> Self {
        RetryError::after(message, requeue_after).into()
    }

    pub fn fail(message: impl Into<String>) -> Self {
        FailError::new(message).into()
    }

    pub fn fail_with(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        FailError::new(message).with_cause(cause).into()
    }

    pub fn warning(message: impl Into<String>) -> Self {
        WarningError::new(message).into()
    }

    /// Determine what the reconcile loop should do with this error
    pub fn action(&self) -> ReconcileAction {
        match self {
            WorkspaceError::Retry(e) => ReconcileAction::RequeueAfter(e.requeue_after),
            WorkspaceError::Fail(_) => ReconcileAction::Fail,
            WorkspaceError::Warning(_) => ReconcileAction::Warn,
            WorkspaceError::Store(_) => ReconcileAction::RequeueAfter(Duration::ZERO),
        }
    }

    /// Check whether the reconcile can make progress by retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ReconcileAction::RequeueAfter(_))
    }
}

/// Translates a sync-engine outcome into the provisioning error taxonomy:
/// an object pending convergence becomes [`RetryError`], an invalid desired
/// object becomes [`FailError`], and store I/O errors pass through unchanged.
impl From<SyncError> for WorkspaceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotInSync { .. } => RetryError::new("").with_cause(err).into(),
            SyncError::Unrecoverable { .. } => FailError::new("").with_cause(err).into(),
            SyncError::Store(store) => WorkspaceError::Store(store),
        }
    }
}

/// Result type alias for the provisioning core
pub type Result<T> = std::result::Result<T, WorkspaceError>;
