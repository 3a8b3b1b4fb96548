// 📸 Merge Snapshot - which records belonged to the joiner before the fetch
//
// Once the shared household is fetched, owner and joiner records live side by
// side in the same store. The only way to tell them apart afterwards is ID-set
// membership in a snapshot taken before the share was accepted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::{get_ids, EntityTable, Store};
use crate::error::StoreError;

/// Joiner-owned ids per entity type. In-memory only, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSnapshot {
    pub household_ids: HashSet<String>,
    pub location_ids: HashSet<String>,
    pub item_ids: HashSet<String>,
    pub label_ids: HashSet<String>,
    pub policy_ids: HashSet<String>,
}

impl MergeSnapshot {
    /// One read-only scan of all five entity tables
    ///
    /// Must run before the share is accepted; afterwards the scan would also
    /// pick up the owner's records.
    pub fn capture(store: &Store) -> Result<Self, StoreError> {
        store.read(|conn| {
            let mut snapshot = MergeSnapshot::default();
            for table in EntityTable::ALL {
                let ids: HashSet<String> = get_ids(conn, table)?.into_iter().collect();
                *snapshot.ids_mut(table) = ids;
            }
            Ok(snapshot)
        })
    }

    pub fn ids(&self, table: EntityTable) -> &HashSet<String> {
        match table {
            EntityTable::Households => &self.household_ids,
            EntityTable::Locations => &self.location_ids,
            EntityTable::Items => &self.item_ids,
            EntityTable::Labels => &self.label_ids,
            EntityTable::Policies => &self.policy_ids,
        }
    }

    fn ids_mut(&mut self, table: EntityTable) -> &mut HashSet<String> {
        match table {
            EntityTable::Households => &mut self.household_ids,
            EntityTable::Locations => &mut self.location_ids,
            EntityTable::Items => &mut self.item_ids,
            EntityTable::Labels => &mut self.label_ids,
            EntityTable::Policies => &mut self.policy_ids,
        }
    }

    pub fn owns_household(&self, id: &str) -> bool {
        self.household_ids.contains(id)
    }

    pub fn owns_label(&self, id: &str) -> bool {
        self.label_ids.contains(id)
    }

    pub fn total(&self) -> usize {
        EntityTable::ALL.iter().map(|t| self.ids(*t).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_household, insert_label, insert_location, Household, Label, Location};

    #[test]
    fn test_capture_records_ids_per_type() {
        let store = Store::open_in_memory().unwrap();
        let home = Household::new("Mine");
        let garage = Location::new("Garage", &home.id);
        let label = Label::new("Tools");

        store
            .write(|tx| {
                insert_household(tx, &home)?;
                insert_location(tx, &garage)?;
                insert_label(tx, &label)
            })
            .unwrap();

        let snapshot = MergeSnapshot::capture(&store).unwrap();

        assert!(snapshot.owns_household(&home.id));
        assert!(snapshot.location_ids.contains(&garage.id));
        assert!(snapshot.owns_label(&label.id));
        assert!(snapshot.item_ids.is_empty());
        assert_eq!(snapshot.total(), 3);
    }

    #[test]
    fn test_records_added_later_are_not_joiner_owned() {
        let store = Store::open_in_memory().unwrap();
        let snapshot = MergeSnapshot::capture(&store).unwrap();

        let shared = Household::new("Theirs");
        store.write(|tx| insert_household(tx, &shared)).unwrap();

        assert!(!snapshot.owns_household(&shared.id));
    }
}
