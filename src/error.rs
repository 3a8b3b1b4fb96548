// ⚠️ Error taxonomy for the household merge flow
//
// Library errors are typed. The flow controller collapses them into one of
// five failure kinds, each with a fixed user-facing message and a recovery
// class that decides whether cancel is still offered.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

// ============================================================================
// SYNC COLLABORATOR
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("network unavailable: {0}")]
    Network(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("share rejected: {0}")]
    Rejected(String),
}

// ============================================================================
// MERGE EXECUTOR
// ============================================================================

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("household {0} is not one of the joining user's households")]
    SourceNotOwned(String),

    #[error("cannot merge household {0} into itself")]
    SelfMerge(String),

    #[error("household {0} not found")]
    HouseholdNotFound(String),

    #[error("no merge snapshot was captured before the share was accepted")]
    MissingSnapshot,

    #[error("shared household has not been fetched yet")]
    SharedHouseholdUnavailable,

    #[error("merge transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl MergeError {
    /// Precondition failures happen before any row is touched
    pub fn is_precondition(&self) -> bool {
        !matches!(self, MergeError::Transaction(_))
    }
}

impl From<rusqlite::Error> for MergeError {
    fn from(err: rusqlite::Error) -> Self {
        MergeError::Transaction(StoreError::Sqlite(err))
    }
}

// ============================================================================
// DATA WIPE
// ============================================================================

#[derive(Debug, Error)]
pub enum WipeError {
    #[error("failed to wipe local data: {0}")]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for WipeError {
    fn from(err: rusqlite::Error) -> Self {
        WipeError::Store(StoreError::Sqlite(err))
    }
}

// ============================================================================
// FLOW
// ============================================================================

/// What the user may do from an error screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryClass {
    /// Nothing irreversible happened yet; retry or walk away
    RetryWithCancel,

    /// Local state already changed irreversibly; only retry is offered
    RetryOnly,
}

impl RecoveryClass {
    pub fn can_cancel(&self) -> bool {
        matches!(self, RecoveryClass::RetryWithCancel)
    }
}

/// The five failure classes surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    ShareAcceptance,
    MergePrecondition,
    MergeTransaction,
    Wipe,
    PostWipeAccept,
}

impl FailureKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::ShareAcceptance => {
                "Couldn't join the shared home. Check your connection and try again."
            }
            FailureKind::MergePrecondition => {
                "Your homes couldn't be merged. Nothing was changed."
            }
            FailureKind::MergeTransaction => {
                "The merge failed and was rolled back completely. Nothing was changed."
            }
            FailureKind::Wipe => "Your local data couldn't be cleared. Nothing was deleted.",
            FailureKind::PostWipeAccept => {
                "Your local data was cleared, but joining the shared home failed. Please try again."
            }
        }
    }

    pub fn recovery(&self) -> RecoveryClass {
        match self {
            FailureKind::PostWipeAccept => RecoveryClass::RetryOnly,
            _ => RecoveryClass::RetryWithCancel,
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("accepting the share failed: {0}")]
    ShareAcceptance(#[source] SyncError),

    #[error("merge precondition failed: {0}")]
    MergePrecondition(#[source] MergeError),

    #[error("merge transaction failed: {0}")]
    MergeTransaction(#[source] MergeError),

    #[error("wipe failed: {0}")]
    Wipe(#[source] WipeError),

    #[error("accepting the share after wiping local data failed: {0}")]
    PostWipeAccept(#[source] SyncError),
}

impl FlowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::ShareAcceptance(_) => FailureKind::ShareAcceptance,
            FlowError::MergePrecondition(_) => FailureKind::MergePrecondition,
            FlowError::MergeTransaction(_) => FailureKind::MergeTransaction,
            FlowError::Wipe(_) => FailureKind::Wipe,
            FlowError::PostWipeAccept(_) => FailureKind::PostWipeAccept,
        }
    }

    pub fn recovery(&self) -> RecoveryClass {
        self.kind().recovery()
    }
}

impl From<MergeError> for FlowError {
    fn from(err: MergeError) -> Self {
        if err.is_precondition() {
            FlowError::MergePrecondition(err)
        } else {
            FlowError::MergeTransaction(err)
        }
    }
}

/// Returned when a controller entry point is called from a state that doesn't offer it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidTransition {
    #[error("{action} is not available while {state}")]
    NotAvailable {
        action: &'static str,
        state: &'static str,
    },

    #[error("household {0} is not offered for merging")]
    UnknownHousehold(String),
}

// ============================================================================
// TESTS
// ============================================================================
