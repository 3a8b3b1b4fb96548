// 🧭 Flow Controller - the "you've been invited to a shared home" state machine
//
//   ChoosingOption ─┬─ JoinAlongside ─────────────────────────┐
//                   ├─ StartFresh ────────────────────────────┤
//                   └─ MergeHomePicker → MergeDedupChoice ────┤
//                                                             ▼
//                          Working(action) → Success | Error ─┬─ retry → Working(action)
//                                                             └─ cancel (RetryWithCancel only)
//
// Retry re-enters the last attempted action. Destructive or remote steps
// already done in this attempt (share accepted, data wiped) are never re-run.
// Once the share is accepted the action always runs to Success or Error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::MergeConfig;
use crate::db::{get_all_households, get_household, household_counts, HouseholdCounts, Store};
use crate::deduplication::DedupPreference;
use crate::error::{
    FailureKind, FlowError, InvalidTransition, MergeError, RecoveryClass, StoreError, SyncError,
};
use crate::invitation::{resolve_shared_household, ShareInvitation};
use crate::merge::{MergeExecutor, MergeSummary};
use crate::snapshot::MergeSnapshot;
use crate::sync::{wait_for_fetch, FetchWait, SyncService};
use crate::wipe::{wipe_all_local_data, DerivedCache, WipeSummary};

// ============================================================================
// ACTIONS
// ============================================================================

/// What the user picked on the first screen (or in the home picker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    JoinAlongside,
    StartFresh,
    SelectForMerge(String),
}

/// The action being executed, kept for retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    JoinAlongside,
    StartFresh,
    Merge {
        source_household_id: String,
        dedup: DedupPreference,
    },
}

// ============================================================================
// STATE
// ============================================================================

/// One of the joiner's households offered as a merge source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeOption {
    pub household_id: String,
    pub name: String,
    pub counts: HouseholdCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowOutcome {
    JoinedAlongside {
        household_name: String,
    },
    StartedFresh {
        household_name: String,
        wiped: WipeSummary,
    },
    Merged {
        source_name: String,
        household_name: String,
        summary: MergeSummary,
    },
}

impl FlowOutcome {
    pub fn describe(&self) -> String {
        match self {
            FlowOutcome::JoinedAlongside { household_name } => {
                format!("You joined {}", household_name)
            }
            FlowOutcome::StartedFresh { household_name, .. } => {
                format!("Started fresh in {}", household_name)
            }
            FlowOutcome::Merged {
                source_name,
                household_name,
                summary,
            } => format!(
                "Merged {} into {}. {}",
                source_name,
                household_name,
                summary.describe()
            ),
        }
    }
}

/// What the error screen shows; never carries internal error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowFailure {
    pub kind: FailureKind,
    pub message: String,
    pub recovery: RecoveryClass,
}

impl From<&FlowError> for FlowFailure {
    fn from(err: &FlowError) -> Self {
        let kind = err.kind();
        FlowFailure {
            kind,
            message: kind.user_message().to_string(),
            recovery: kind.recovery(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    ChoosingOption,
    MergeHomePicker { homes: Vec<HomeOption> },
    MergeDedupChoice { source: HomeOption },
    Working(PendingAction),
    Success(FlowOutcome),
    Error(FlowFailure),
    Cancelled,
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::ChoosingOption => "choosing-option",
            FlowState::MergeHomePicker { .. } => "merge-home-picker",
            FlowState::MergeDedupChoice { .. } => "merge-dedup-choice",
            FlowState::Working(_) => "working",
            FlowState::Success(_) => "success",
            FlowState::Error(_) => "error",
            FlowState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Success(_) | FlowState::Cancelled)
    }
}

/// Per-attempt bookkeeping, dropped once the flow terminates
#[derive(Debug, Default)]
struct Attempt {
    snapshot: Option<MergeSnapshot>,
    pending: Option<PendingAction>,
    has_accepted_share: bool,
    has_wiped_data: bool,
    wiped: WipeSummary,
}

// ============================================================================
// FLOW CONTROLLER
// ============================================================================

pub struct FlowController {
    store: Store,
    sync: Arc<dyn SyncService>,
    cache: Arc<dyn DerivedCache>,
    invitation: ShareInvitation,
    config: MergeConfig,
    cancel: CancellationToken,
    state: watch::Sender<FlowState>,
    attempt: Attempt,
}

impl FlowController {
    /// Start a flow for one invitation
    ///
    /// Captures the merge snapshot right away, before anything can be fetched.
    pub fn new(
        store: Store,
        sync: Arc<dyn SyncService>,
        cache: Arc<dyn DerivedCache>,
        invitation: ShareInvitation,
        config: MergeConfig,
    ) -> Result<Self, StoreError> {
        let snapshot = MergeSnapshot::capture(&store)?;
        tracing::info!(
            joiner_records = snapshot.total(),
            record = %invitation.root_record.record_name,
            "merge flow started"
        );

        let (state, _) = watch::channel(FlowState::ChoosingOption);

        Ok(FlowController {
            store,
            sync,
            cache,
            invitation,
            config,
            cancel: CancellationToken::new(),
            state,
            attempt: Attempt {
                snapshot: Some(snapshot),
                ..Attempt::default()
            },
        })
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    /// Observe every state change, including `Working`
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// Cancelling this token cuts a fetch wait short; the action still completes
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> Option<&MergeSnapshot> {
        self.attempt.snapshot.as_ref()
    }

    pub fn invitation(&self) -> &ShareInvitation {
        &self.invitation
    }

    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    /// ChoosingOption → MergeHomePicker
    pub fn open_merge_picker(&mut self) -> Result<(), InvalidTransition> {
        self.expect_state("open merge picker", |s| matches!(s, FlowState::ChoosingOption))?;
        self.show_home_picker();
        Ok(())
    }

    pub async fn choose_action(&mut self, action: FlowAction) -> Result<(), InvalidTransition> {
        match action {
            FlowAction::JoinAlongside => {
                self.expect_state("join alongside", |s| matches!(s, FlowState::ChoosingOption))?;
                self.run(PendingAction::JoinAlongside).await;
            }
            FlowAction::StartFresh => {
                self.expect_state("start fresh", |s| matches!(s, FlowState::ChoosingOption))?;
                self.run(PendingAction::StartFresh).await;
            }
            FlowAction::SelectForMerge(household_id) => {
                self.expect_state("select a home to merge", |s| {
                    matches!(s, FlowState::ChoosingOption | FlowState::MergeHomePicker { .. })
                })?;

                let homes = match self.state() {
                    FlowState::MergeHomePicker { homes } => homes,
                    _ => match self.list_merge_homes() {
                        Ok(homes) => homes,
                        Err(e) => {
                            self.fail_home_listing(e);
                            return Ok(());
                        }
                    },
                };
                let source = homes
                    .into_iter()
                    .find(|h| h.household_id == household_id)
                    .ok_or(InvalidTransition::UnknownHousehold(household_id))?;

                self.set_state(FlowState::MergeDedupChoice { source });
            }
        }
        Ok(())
    }

    /// MergeDedupChoice → Working(Merge)
    pub async fn choose_dedup_preference(
        &mut self,
        dedup: DedupPreference,
    ) -> Result<(), InvalidTransition> {
        let source = match self.state() {
            FlowState::MergeDedupChoice { source } => source,
            other => {
                return Err(InvalidTransition::NotAvailable {
                    action: "choose a dedup preference",
                    state: other.name(),
                })
            }
        };

        self.run(PendingAction::Merge {
            source_household_id: source.household_id,
            dedup,
        })
        .await;
        Ok(())
    }

    /// Error → Working(last action), resuming past completed steps
    pub async fn retry(&mut self) -> Result<(), InvalidTransition> {
        self.expect_state("retry", |s| matches!(s, FlowState::Error(_)))?;

        match self.attempt.pending.clone() {
            Some(action) => self.run(action).await,
            // Nothing was attempted yet (the home list failed to load)
            None => self.set_state(FlowState::ChoosingOption),
        }
        Ok(())
    }

    /// Abandon the flow; refused once local data has changed irreversibly
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.expect_state("cancel", |s| match s {
            FlowState::ChoosingOption
            | FlowState::MergeHomePicker { .. }
            | FlowState::MergeDedupChoice { .. } => true,
            FlowState::Error(failure) => failure.recovery.can_cancel(),
            _ => false,
        })?;

        self.finish(FlowState::Cancelled);
        Ok(())
    }

    /// MergeDedupChoice → MergeHomePicker → ChoosingOption
    pub fn back(&mut self) -> Result<(), InvalidTransition> {
        match self.state() {
            FlowState::MergeDedupChoice { .. } => self.show_home_picker(),
            FlowState::MergeHomePicker { .. } => self.set_state(FlowState::ChoosingOption),
            other => {
                return Err(InvalidTransition::NotAvailable {
                    action: "go back",
                    state: other.name(),
                })
            }
        }
        Ok(())
    }

    // ========================================================================
    // HOME PICKER
    // ========================================================================

    /// The joiner's own households, excluding the shared one, with live counts
    pub fn list_merge_homes(&self) -> Result<Vec<HomeOption>, StoreError> {
        let shared_id = resolve_shared_household(&self.store, &self.invitation)?.map(|h| h.id);
        let snapshot = self.attempt.snapshot.as_ref();

        self.store.read(|conn| {
            let mut homes = Vec::new();
            for household in get_all_households(conn)? {
                if shared_id.as_deref() == Some(household.id.as_str()) {
                    continue;
                }
                if snapshot.is_some_and(|s| !s.owns_household(&household.id)) {
                    continue;
                }
                let counts = household_counts(conn, &household.id)?;
                homes.push(HomeOption {
                    household_id: household.id,
                    name: household.name,
                    counts,
                });
            }
            Ok(homes)
        })
    }

    fn show_home_picker(&mut self) {
        match self.list_merge_homes() {
            Ok(homes) => self.set_state(FlowState::MergeHomePicker { homes }),
            Err(e) => self.fail_home_listing(e),
        }
    }

    fn fail_home_listing(&mut self, err: StoreError) {
        tracing::error!(error = %err, "failed to list homes for merge");
        self.attempt.pending = None;
        let failure = FlowFailure::from(&FlowError::MergePrecondition(err.into()));
        self.set_state(FlowState::Error(failure));
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    async fn run(&mut self, action: PendingAction) {
        self.attempt.pending = Some(action.clone());
        self.set_state(FlowState::Working(action.clone()));

        let result = match &action {
            PendingAction::JoinAlongside => self.join_alongside().await,
            PendingAction::StartFresh => self.start_fresh().await,
            PendingAction::Merge {
                source_household_id,
                dedup,
            } => self.merge(source_household_id, *dedup).await,
        };

        match result {
            Ok(outcome) => {
                tracing::info!(outcome = %outcome.describe(), "merge flow finished");
                self.finish(FlowState::Success(outcome));
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    kind = ?err.kind(),
                    recovery = ?err.recovery(),
                    "merge flow action failed"
                );
                self.set_state(FlowState::Error(FlowFailure::from(&err)));
            }
        }
    }

    async fn join_alongside(&mut self) -> Result<FlowOutcome, FlowError> {
        self.accept_share_once(FlowError::ShareAcceptance).await?;
        self.wait_for_fetch().await;

        Ok(FlowOutcome::JoinedAlongside {
            household_name: self.shared_display_name(),
        })
    }

    async fn start_fresh(&mut self) -> Result<FlowOutcome, FlowError> {
        if !self.attempt.has_wiped_data {
            let wiped = wipe_all_local_data(&self.store, self.cache.as_ref())
                .map_err(FlowError::Wipe)?;
            self.attempt.has_wiped_data = true;
            self.attempt.wiped = wiped;
        }

        self.accept_share_once(FlowError::PostWipeAccept).await?;
        self.wait_for_fetch().await;

        Ok(FlowOutcome::StartedFresh {
            household_name: self.shared_display_name(),
            wiped: self.attempt.wiped,
        })
    }

    async fn merge(
        &mut self,
        source_household_id: &str,
        dedup: DedupPreference,
    ) -> Result<FlowOutcome, FlowError> {
        self.accept_share_once(FlowError::ShareAcceptance).await?;
        self.wait_for_fetch().await;

        let shared = resolve_shared_household(&self.store, &self.invitation)
            .map_err(MergeError::from)?
            .ok_or(MergeError::SharedHouseholdUnavailable)?;

        let source_name = self
            .store
            .read(|conn| get_household(conn, source_household_id))
            .map_err(MergeError::from)?
            .map(|h| h.name)
            .unwrap_or_else(|| source_household_id.to_string());

        let summary = MergeExecutor::new(self.store.clone()).execute(
            source_household_id,
            &shared.id,
            dedup,
            self.attempt.snapshot.as_ref(),
        )?;

        Ok(FlowOutcome::Merged {
            source_name,
            household_name: shared.name,
            summary,
        })
    }

    async fn accept_share_once(
        &mut self,
        on_failure: fn(SyncError) -> FlowError,
    ) -> Result<(), FlowError> {
        if self.attempt.has_accepted_share {
            return Ok(());
        }
        self.sync
            .accept_share(&self.invitation)
            .await
            .map_err(on_failure)?;
        self.attempt.has_accepted_share = true;
        tracing::info!(record = %self.invitation.root_record.record_name, "share accepted");
        Ok(())
    }

    /// Only ever called after the share is accepted, so no outcome stops the action
    async fn wait_for_fetch(&self) {
        let waited = wait_for_fetch(
            self.sync.as_ref(),
            self.config.fetch_poll_interval(),
            self.config.fetch_timeout(),
            &self.cancel,
        )
        .await;
        if waited == FetchWait::Cancelled {
            tracing::info!("fetch wait cut short, finishing the action with local data");
        }
    }

    /// Shared household's name, or the invitation title if it hasn't arrived
    fn shared_display_name(&self) -> String {
        match resolve_shared_household(&self.store, &self.invitation) {
            Ok(Some(household)) => household.name,
            Ok(None) => self.invitation.title.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "could not resolve shared household name");
                self.invitation.title.clone()
            }
        }
    }

    // ========================================================================
    // STATE PLUMBING
    // ========================================================================

    fn expect_state(
        &self,
        action: &'static str,
        allowed: impl Fn(&FlowState) -> bool,
    ) -> Result<(), InvalidTransition> {
        let state = self.state.borrow();
        if allowed(&*state) {
            Ok(())
        } else {
            Err(InvalidTransition::NotAvailable {
                action,
                state: state.name(),
            })
        }
    }

    fn set_state(&mut self, next: FlowState) {
        let previous = self.state.send_replace(next);
        tracing::info!(
            from = previous.name(),
            to = self.state.borrow().name(),
            "merge flow transition"
        );
    }

    /// Enter a terminal state and drop the attempt (snapshot included)
    fn finish(&mut self, terminal: FlowState) {
        self.attempt = Attempt::default();
        self.set_state(terminal);
    }
}

// ============================================================================
// TESTS
// ============================================================================
