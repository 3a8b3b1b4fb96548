// 🔀 Merge Executor - fold a joiner's household into the shared household
//
// Everything runs inside ONE write transaction:
//   1. Locations  - merge into a uniquely-matching shared location, or reparent
//   2. Items      - anything still under the source household moves across
//   3. Labels     - joiner labels collapse onto same-named owner labels (dedup only)
//   4. Policies   - same-named policies collapse, others are repointed
//   5. Household  - the emptied source household is deleted last
//
// The executor only reassigns foreign keys, deletes rows and rewrites join
// rows. It never creates locations, items, labels or policies.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::db::{
    get_all_labels, get_household, get_item_labels_for_label, get_items_for_household,
    get_items_for_location, get_locations_for_household, get_policies_for_household,
    HouseholdPolicy, Store,
};
use crate::deduplication::{DedupPreference, NameIndex};
use crate::error::MergeError;
use crate::snapshot::MergeSnapshot;

// ============================================================================
// MERGE SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub moved_items: usize,
    pub merged_locations: usize,
    pub merged_labels: usize,
    pub merged_policies: usize,
}

impl MergeSummary {
    /// Short sentence for the success screen
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("Moved {}", plural(self.moved_items, "item"))];
        if self.merged_locations > 0 {
            parts.push(format!("merged {}", plural(self.merged_locations, "location")));
        }
        if self.merged_labels > 0 {
            parts.push(format!("merged {}", plural(self.merged_labels, "label")));
        }
        if self.merged_policies > 0 {
            parts.push(format!("merged {}", plural(self.merged_policies, "policy")));
        }
        parts.join(", ")
    }
}

fn plural(count: usize, noun: &str) -> String {
    match (count, noun) {
        (1, _) => format!("1 {}", noun),
        (_, "policy") => format!("{} policies", count),
        _ => format!("{} {}s", count, noun),
    }
}

/// The five phases of a merge, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStep {
    Locations,
    Items,
    Labels,
    Policies,
    DeleteSource,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStep::Locations => "locations",
            MergeStep::Items => "items",
            MergeStep::Labels => "labels",
            MergeStep::Policies => "policies",
            MergeStep::DeleteSource => "delete-source",
        };
        f.write_str(name)
    }
}

// ============================================================================
// MERGE EXECUTOR
// ============================================================================

pub struct MergeExecutor {
    store: Store,
}

impl MergeExecutor {
    pub fn new(store: Store) -> Self {
        MergeExecutor { store }
    }

    /// Merge `source_id` into `shared_id` atomically
    ///
    /// Preconditions, each a distinct error: a snapshot exists, the source is
    /// joiner-owned, source != shared, and both households exist. On any
    /// failure the transaction is rolled back and no summary is produced.
    pub fn execute(
        &self,
        source_id: &str,
        shared_id: &str,
        dedup: DedupPreference,
        snapshot: Option<&MergeSnapshot>,
    ) -> Result<MergeSummary, MergeError> {
        let snapshot = snapshot.ok_or(MergeError::MissingSnapshot)?;

        if !snapshot.owns_household(source_id) {
            return Err(MergeError::SourceNotOwned(source_id.to_string()));
        }
        if source_id == shared_id {
            return Err(MergeError::SelfMerge(source_id.to_string()));
        }

        let summary = self.store.write(|tx| -> Result<MergeSummary, MergeError> {
            for id in [source_id, shared_id] {
                if get_household(tx, id)?.is_none() {
                    return Err(MergeError::HouseholdNotFound(id.to_string()));
                }
            }

            let mut moved_items: HashSet<String> = HashSet::new();

            tracing::debug!(step = %MergeStep::Locations, source_id, shared_id, "merge step");
            let merged_locations = merge_locations(tx, source_id, shared_id, dedup, &mut moved_items)?;

            tracing::debug!(step = %MergeStep::Items, "merge step");
            move_remaining_items(tx, source_id, shared_id, &mut moved_items)?;

            let merged_labels = if dedup.is_enabled() {
                tracing::debug!(step = %MergeStep::Labels, "merge step");
                merge_labels(tx, snapshot)?
            } else {
                0
            };

            tracing::debug!(step = %MergeStep::Policies, "merge step");
            let merged_policies = merge_policies(tx, source_id, shared_id, dedup)?;

            tracing::debug!(step = %MergeStep::DeleteSource, "merge step");
            tx.execute("DELETE FROM households WHERE id = ?1", [source_id])?;

            Ok(MergeSummary {
                moved_items: moved_items.len(),
                merged_locations,
                merged_labels,
                merged_policies,
            })
        })?;

        tracing::info!(
            source_id,
            shared_id,
            ?dedup,
            moved_items = summary.moved_items,
            merged_locations = summary.merged_locations,
            merged_labels = summary.merged_labels,
            merged_policies = summary.merged_policies,
            "merge committed"
        );

        Ok(summary)
    }
}

// ============================================================================
// STEP 1: LOCATIONS
// ============================================================================

fn merge_locations(
    conn: &Connection,
    source_id: &str,
    shared_id: &str,
    dedup: DedupPreference,
    moved_items: &mut HashSet<String>,
) -> Result<usize, MergeError> {
    // Match only against locations that were in the shared household before the merge
    let shared_locations = get_locations_for_household(conn, shared_id)?;
    let index = NameIndex::build(
        shared_locations
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str())),
    );

    let mut merged = 0;

    for location in get_locations_for_household(conn, source_id)? {
        let target = if dedup.is_enabled() {
            index.unique_match(&location.name)
        } else {
            None
        };

        match target {
            Some(target_id) => {
                for item in get_items_for_location(conn, &location.id)? {
                    moved_items.insert(item.id);
                }
                conn.execute(
                    "UPDATE items SET location_id = ?1, household_id = ?2 WHERE location_id = ?3",
                    params![target_id, shared_id, location.id],
                )?;
                conn.execute("DELETE FROM locations WHERE id = ?1", [&location.id])?;
                merged += 1;
            }
            None => {
                // Items follow by reference; their household FK is fixed in step 2
                conn.execute(
                    "UPDATE locations SET household_id = ?1 WHERE id = ?2",
                    params![shared_id, location.id],
                )?;
            }
        }
    }

    Ok(merged)
}

// ============================================================================
// STEP 2: ITEMS
// ============================================================================

fn move_remaining_items(
    conn: &Connection,
    source_id: &str,
    shared_id: &str,
    moved_items: &mut HashSet<String>,
) -> Result<(), MergeError> {
    for item in get_items_for_household(conn, source_id)? {
        moved_items.insert(item.id);
    }
    conn.execute(
        "UPDATE items SET household_id = ?1 WHERE household_id = ?2",
        params![shared_id, source_id],
    )?;
    Ok(())
}

// ============================================================================
// STEP 3: LABELS
// ============================================================================

fn merge_labels(conn: &Connection, snapshot: &MergeSnapshot) -> Result<usize, MergeError> {
    let (joiner_labels, owner_labels): (Vec<_>, Vec<_>) = get_all_labels(conn)?
        .into_iter()
        .partition(|label| snapshot.owns_label(&label.id));

    let owner_index = NameIndex::build(
        owner_labels
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str())),
    );

    let mut merged = 0;

    for label in &joiner_labels {
        let Some(owner_id) = owner_index.first_match(&label.name) else {
            continue;
        };

        for row in get_item_labels_for_label(conn, &label.id)? {
            if item_label_exists(conn, &row.item_id, owner_id)? {
                // Item already carries the owner's label
                conn.execute("DELETE FROM item_labels WHERE id = ?1", [&row.id])?;
            } else {
                conn.execute(
                    "UPDATE item_labels SET label_id = ?1 WHERE id = ?2",
                    params![owner_id, row.id],
                )?;
            }
        }

        conn.execute("DELETE FROM labels WHERE id = ?1", [&label.id])?;
        merged += 1;
    }

    Ok(merged)
}

fn item_label_exists(conn: &Connection, item_id: &str, label_id: &str) -> Result<bool, MergeError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM item_labels WHERE item_id = ?1 AND label_id = ?2)",
        params![item_id, label_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ============================================================================
// STEP 4: INSURANCE POLICIES
// ============================================================================

fn merge_policies(
    conn: &Connection,
    source_id: &str,
    shared_id: &str,
    dedup: DedupPreference,
) -> Result<usize, MergeError> {
    let shared_policies = get_policies_for_household(conn, shared_id)?;
    let already_shared: HashSet<&str> = shared_policies
        .iter()
        .map(|(_, p)| p.id.as_str())
        .collect();
    let index = NameIndex::build(
        shared_policies
            .iter()
            .map(|(_, p)| (p.id.as_str(), p.provider_name.as_str())),
    );

    let mut merged = 0;

    for (link, policy) in get_policies_for_household(conn, source_id)? {
        if already_shared.contains(policy.id.as_str()) {
            // Same policy on both sides; keep the shared association only
            conn.execute("DELETE FROM household_policies WHERE id = ?1", [&link.id])?;
            continue;
        }

        let duplicate = if dedup.is_enabled() {
            index.first_match(&policy.provider_name)
        } else {
            None
        };

        match duplicate {
            Some(_) => {
                conn.execute("DELETE FROM household_policies WHERE id = ?1", [&link.id])?;
                delete_policy_if_unreferenced(conn, &policy.id)?;
                merged += 1;
            }
            None => repoint_policy_link(conn, &link, shared_id)?,
        }
    }

    Ok(merged)
}

fn repoint_policy_link(
    conn: &Connection,
    link: &HouseholdPolicy,
    shared_id: &str,
) -> Result<(), MergeError> {
    conn.execute(
        "UPDATE household_policies SET household_id = ?1 WHERE id = ?2",
        params![shared_id, link.id],
    )?;
    Ok(())
}

fn delete_policy_if_unreferenced(conn: &Connection, policy_id: &str) -> Result<(), MergeError> {
    conn.execute(
        "DELETE FROM insurance_policies
         WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM household_policies WHERE policy_id = ?1)",
        [policy_id],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
