// 📨 Share invitations and the Invitation Resolver
//
// An invitation points at a remote root record. After the fetch completes,
// the matching household is found by sync provenance (record, zone, owner),
// never by comparing names or addresses.

use serde::{Deserialize, Serialize};

use crate::db::{find_household_by_record, Household, RecordRef, Store};
use crate::error::StoreError;

/// Invitation metadata handed over by the sync layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareInvitation {
    /// Reference to the shared household's root record
    pub root_record: RecordRef,

    /// Title shown in the invitation (inviter's household name at share time)
    pub title: String,

    pub inviter_name: Option<String>,
}

impl ShareInvitation {
    pub fn new(root_record: RecordRef, title: &str) -> Self {
        ShareInvitation {
            root_record,
            title: title.to_string(),
            inviter_name: None,
        }
    }
}

/// Pure lookup of the locally materialized shared household
///
/// Returns `None` while the fetch hasn't produced the record yet; waiting is
/// the caller's job.
pub fn resolve_shared_household(
    store: &Store,
    invitation: &ShareInvitation,
) -> Result<Option<Household>, StoreError> {
    store.read(|conn| find_household_by_record(conn, &invitation.root_record))
}
