// Household Merge Engine - Core Library
// Reconciles a joining user's local households with a shared household
// after accepting an invitation.

pub mod config;
pub mod db;
pub mod deduplication;
pub mod error;
pub mod flow;
pub mod invitation;
pub mod merge;
pub mod snapshot;
pub mod sync;
pub mod wipe;

// Re-export commonly used types
pub use config::MergeConfig;
pub use db::{
    Household, HouseholdCounts, InsurancePolicy, Item, Label, Location, RecordRef, Store,
    setup_database, get_all_households, household_counts,
};
pub use deduplication::{DedupPreference, NameIndex, normalize_name};
pub use error::{
    FailureKind, FlowError, InvalidTransition, MergeError, RecoveryClass, StoreError, SyncError,
    WipeError,
};
pub use flow::{
    FlowAction, FlowController, FlowFailure, FlowOutcome, FlowState, HomeOption, PendingAction,
};
pub use invitation::{ShareInvitation, resolve_shared_household};
pub use merge::{MergeExecutor, MergeStep, MergeSummary};
pub use snapshot::MergeSnapshot;
pub use sync::{FetchWait, SyncService, wait_for_fetch};
pub use wipe::{
    DerivedCache, FileCache, NoopCache, WipeSummary, derived_cache, wipe_all_local_data,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
