// 🗄️ Household Store - SQLite persistence for the household aggregate
//
// Households own locations and items; labels are global; insurance policies
// attach to households through a join table. Every id is a UUID string that is
// assigned once at creation and never reused.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

// ============================================================================
// ENTITIES
// ============================================================================

/// Aggregate root - the sharing boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub id: String,
    pub name: String,
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub created_at: DateTime<Utc>,

    // ========================================================================
    // SYNC PROVENANCE (only set for records materialized by the sync layer)
    // ========================================================================
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_record: Option<RecordRef>,
}

/// Sync-layer reference to a remote record: record name, zone and owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_name: String,
    pub zone_name: String,
    pub owner_name: String,
}

impl Household {
    pub fn new(name: &str) -> Self {
        Household {
            id: new_id(),
            name: name.to_string(),
            street: String::new(),
            city: String::new(),
            region: String::new(),
            postal_code: String::new(),
            country: String::new(),
            created_at: Utc::now(),
            sync_record: None,
        }
    }

    /// Mark this household as materialized from a shared remote record
    pub fn with_sync_record(mut self, record: RecordRef) -> Self {
        self.sync_record = Some(record);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub household_id: String,
    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn new(name: &str, household_id: &str) -> Self {
        Location {
            id: new_id(),
            name: name.to_string(),
            household_id: household_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub location_id: Option<String>,
    pub household_id: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an item; when placed in a location it inherits that location's household
    pub fn new(title: &str, household_id: &str, location_id: Option<&str>) -> Self {
        Item {
            id: new_id(),
            title: title.to_string(),
            location_id: location_id.map(str::to_string),
            household_id: household_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Global label - not owned by any household
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Label {
    pub fn new(name: &str) -> Self {
        Label {
            id: new_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub id: String,
    pub provider_name: String,
    pub created_at: DateTime<Utc>,
}

impl InsurancePolicy {
    pub fn new(provider_name: &str) -> Self {
        InsurancePolicy {
            id: new_id(),
            provider_name: provider_name.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Join row between an item and a label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLabel {
    pub id: String,
    pub item_id: String,
    pub label_id: String,
}

/// Join row between a household and an insurance policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdPolicy {
    pub id: String,
    pub household_id: String,
    pub policy_id: String,
}

/// Live per-household counts (used by the merge home picker)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdCounts {
    pub items: usize,
    pub locations: usize,
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// Cloneable handle over a single SQLite connection
///
/// `read` runs a closure against the connection; `write` runs it inside one
/// transaction that commits only when the closure returns `Ok`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a store on disk and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_database(&conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside a write transaction; any error rolls the whole thing back
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Deletion order is enforced by the engine, not by convention
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS households (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            street TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL DEFAULT '',
            postal_code TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            sync_record_name TEXT,
            sync_zone_name TEXT,
            sync_owner_name TEXT
        );

        CREATE TABLE IF NOT EXISTS locations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            household_id TEXT NOT NULL REFERENCES households(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            location_id TEXT REFERENCES locations(id),
            household_id TEXT NOT NULL REFERENCES households(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS labels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS insurance_policies (
            id TEXT PRIMARY KEY,
            provider_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS item_labels (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL REFERENCES items(id),
            label_id TEXT NOT NULL REFERENCES labels(id),
            UNIQUE (item_id, label_id)
        );

        CREATE TABLE IF NOT EXISTS household_policies (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL REFERENCES households(id),
            policy_id TEXT NOT NULL REFERENCES insurance_policies(id),
            UNIQUE (household_id, policy_id)
        );

        CREATE INDEX IF NOT EXISTS idx_locations_household ON locations(household_id);
        CREATE INDEX IF NOT EXISTS idx_items_household ON items(household_id);
        CREATE INDEX IF NOT EXISTS idx_items_location ON items(location_id);
        CREATE INDEX IF NOT EXISTS idx_item_labels_label ON item_labels(label_id);
        CREATE INDEX IF NOT EXISTS idx_household_policies_policy ON household_policies(policy_id);
        CREATE INDEX IF NOT EXISTS idx_households_sync
            ON households(sync_record_name, sync_zone_name, sync_owner_name);",
    )?;

    Ok(())
}

// ============================================================================
// INSERTS
// ============================================================================

pub fn insert_household(conn: &Connection, household: &Household) -> Result<(), StoreError> {
    let record = household.sync_record.as_ref();
    conn.execute(
        "INSERT INTO households (
            id, name, street, city, region, postal_code, country, created_at,
            sync_record_name, sync_zone_name, sync_owner_name
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            household.id,
            household.name,
            household.street,
            household.city,
            household.region,
            household.postal_code,
            household.country,
            household.created_at.to_rfc3339(),
            record.map(|r| r.record_name.as_str()),
            record.map(|r| r.zone_name.as_str()),
            record.map(|r| r.owner_name.as_str()),
        ],
    )?;
    Ok(())
}

pub fn insert_location(conn: &Connection, location: &Location) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO locations (id, name, household_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            location.id,
            location.name,
            location.household_id,
            location.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn insert_item(conn: &Connection, item: &Item) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO items (id, title, location_id, household_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            item.id,
            item.title,
            item.location_id,
            item.household_id,
            item.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn insert_label(conn: &Connection, label: &Label) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO labels (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![label.id, label.name, label.created_at.to_rfc3339()],
    )?;
    Ok(())
}

pub fn insert_policy(conn: &Connection, policy: &InsurancePolicy) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO insurance_policies (id, provider_name, created_at) VALUES (?1, ?2, ?3)",
        params![policy.id, policy.provider_name, policy.created_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Attach a label to an item; returns the join row
pub fn attach_label(conn: &Connection, item_id: &str, label_id: &str) -> Result<ItemLabel, StoreError> {
    let row = ItemLabel {
        id: new_id(),
        item_id: item_id.to_string(),
        label_id: label_id.to_string(),
    };
    conn.execute(
        "INSERT INTO item_labels (id, item_id, label_id) VALUES (?1, ?2, ?3)",
        params![row.id, row.item_id, row.label_id],
    )?;
    Ok(row)
}

/// Attach a policy to a household; returns the join row
pub fn attach_policy(
    conn: &Connection,
    household_id: &str,
    policy_id: &str,
) -> Result<HouseholdPolicy, StoreError> {
    let row = HouseholdPolicy {
        id: new_id(),
        household_id: household_id.to_string(),
        policy_id: policy_id.to_string(),
    };
    conn.execute(
        "INSERT INTO household_policies (id, household_id, policy_id) VALUES (?1, ?2, ?3)",
        params![row.id, row.household_id, row.policy_id],
    )?;
    Ok(row)
}

// ============================================================================
// QUERIES
// ============================================================================

fn parse_time(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn household_from_row(row: &Row<'_>) -> rusqlite::Result<Household> {
    let record_name: Option<String> = row.get(8)?;
    let zone_name: Option<String> = row.get(9)?;
    let owner_name: Option<String> = row.get(10)?;

    let sync_record = match (record_name, zone_name, owner_name) {
        (Some(record_name), Some(zone_name), Some(owner_name)) => Some(RecordRef {
            record_name,
            zone_name,
            owner_name,
        }),
        _ => None,
    };

    Ok(Household {
        id: row.get(0)?,
        name: row.get(1)?,
        street: row.get(2)?,
        city: row.get(3)?,
        region: row.get(4)?,
        postal_code: row.get(5)?,
        country: row.get(6)?,
        created_at: parse_time(row.get(7)?),
        sync_record,
    })
}

const HOUSEHOLD_COLUMNS: &str = "id, name, street, city, region, postal_code, country, created_at,
     sync_record_name, sync_zone_name, sync_owner_name";

pub fn get_household(conn: &Connection, id: &str) -> Result<Option<Household>, StoreError> {
    let sql = format!("SELECT {} FROM households WHERE id = ?1", HOUSEHOLD_COLUMNS);
    let household = conn
        .query_row(&sql, [id], household_from_row)
        .optional()?;
    Ok(household)
}

pub fn get_all_households(conn: &Connection) -> Result<Vec<Household>, StoreError> {
    let sql = format!(
        "SELECT {} FROM households ORDER BY created_at, id",
        HOUSEHOLD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let households = stmt
        .query_map([], household_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(households)
}

/// Find the household materialized from a given remote record
pub fn find_household_by_record(
    conn: &Connection,
    record: &RecordRef,
) -> Result<Option<Household>, StoreError> {
    let sql = format!(
        "SELECT {} FROM households
         WHERE sync_record_name = ?1 AND sync_zone_name = ?2 AND sync_owner_name = ?3
         ORDER BY created_at, id
         LIMIT 1",
        HOUSEHOLD_COLUMNS
    );
    let household = conn
        .query_row(
            &sql,
            params![record.record_name, record.zone_name, record.owner_name],
            household_from_row,
        )
        .optional()?;
    Ok(household)
}

pub fn get_locations_for_household(
    conn: &Connection,
    household_id: &str,
) -> Result<Vec<Location>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, household_id, created_at FROM locations
         WHERE household_id = ?1
         ORDER BY created_at, id",
    )?;
    let locations = stmt
        .query_map([household_id], |row| {
            Ok(Location {
                id: row.get(0)?,
                name: row.get(1)?,
                household_id: row.get(2)?,
                created_at: parse_time(row.get(3)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(locations)
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        title: row.get(1)?,
        location_id: row.get(2)?,
        household_id: row.get(3)?,
        created_at: parse_time(row.get(4)?),
    })
}

pub fn get_item(conn: &Connection, id: &str) -> Result<Option<Item>, StoreError> {
    let item = conn
        .query_row(
            "SELECT id, title, location_id, household_id, created_at FROM items WHERE id = ?1",
            [id],
            item_from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn get_items_for_household(
    conn: &Connection,
    household_id: &str,
) -> Result<Vec<Item>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, location_id, household_id, created_at FROM items
         WHERE household_id = ?1
         ORDER BY created_at, id",
    )?;
    let items = stmt
        .query_map([household_id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn get_items_for_location(conn: &Connection, location_id: &str) -> Result<Vec<Item>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, location_id, household_id, created_at FROM items
         WHERE location_id = ?1
         ORDER BY created_at, id",
    )?;
    let items = stmt
        .query_map([location_id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn get_all_labels(conn: &Connection) -> Result<Vec<Label>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM labels ORDER BY created_at, id")?;
    let labels = stmt
        .query_map([], |row| {
            Ok(Label {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_time(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(labels)
}

pub fn get_item_labels_for_label(
    conn: &Connection,
    label_id: &str,
) -> Result<Vec<ItemLabel>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, item_id, label_id FROM item_labels WHERE label_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([label_id], |row| {
            Ok(ItemLabel {
                id: row.get(0)?,
                item_id: row.get(1)?,
                label_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Label ids attached to an item
pub fn get_label_ids_for_item(conn: &Connection, item_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT label_id FROM item_labels WHERE item_id = ?1 ORDER BY label_id")?;
    let ids = stmt
        .query_map([item_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Policies associated with a household, paired with the join row id
pub fn get_policies_for_household(
    conn: &Connection,
    household_id: &str,
) -> Result<Vec<(HouseholdPolicy, InsurancePolicy)>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT hp.id, hp.household_id, hp.policy_id, p.provider_name, p.created_at
         FROM household_policies hp
         JOIN insurance_policies p ON p.id = hp.policy_id
         WHERE hp.household_id = ?1
         ORDER BY p.created_at, p.id",
    )?;
    let rows = stmt
        .query_map([household_id], |row| {
            let link = HouseholdPolicy {
                id: row.get(0)?,
                household_id: row.get(1)?,
                policy_id: row.get(2)?,
            };
            let policy = InsurancePolicy {
                id: link.policy_id.clone(),
                provider_name: row.get(3)?,
                created_at: parse_time(row.get(4)?),
            };
            Ok((link, policy))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_rows(conn: &Connection, table: EntityTable) -> Result<usize, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.table_name());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Live item/location counts for one household
pub fn household_counts(conn: &Connection, household_id: &str) -> Result<HouseholdCounts, StoreError> {
    let items: i64 = conn.query_row(
        "SELECT COUNT(*) FROM items WHERE household_id = ?1",
        [household_id],
        |row| row.get(0),
    )?;
    let locations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM locations WHERE household_id = ?1",
        [household_id],
        |row| row.get(0),
    )?;
    Ok(HouseholdCounts {
        items: items as usize,
        locations: locations as usize,
    })
}

/// All ids from one entity table
pub fn get_ids(conn: &Connection, table: EntityTable) -> Result<Vec<String>, StoreError> {
    let sql = format!("SELECT id FROM {}", table.table_name());
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

// ============================================================================
// ENTITY TABLES
// ============================================================================

/// Tables holding user-created entities (not join rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityTable {
    Households,
    Locations,
    Items,
    Labels,
    Policies,
}

impl EntityTable {
    pub const ALL: [EntityTable; 5] = [
        EntityTable::Households,
        EntityTable::Locations,
        EntityTable::Items,
        EntityTable::Labels,
        EntityTable::Policies,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            EntityTable::Households => "households",
            EntityTable::Locations => "locations",
            EntityTable::Items => "items",
            EntityTable::Labels => "labels",
            EntityTable::Policies => "insurance_policies",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_household_roundtrip_with_provenance() {
        let store = Store::open_in_memory().unwrap();
        let record = RecordRef {
            record_name: "home-record".to_string(),
            zone_name: "share-zone".to_string(),
            owner_name: "owner-1".to_string(),
        };
        let home = Household::new("Lake House").with_sync_record(record.clone());

        store
            .write(|tx| insert_household(tx, &home))
            .unwrap();

        let loaded = store
            .read(|conn| get_household(conn, &home.id))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "Lake House");
        assert_eq!(loaded.sync_record, Some(record.clone()));

        let found = store
            .read(|conn| find_household_by_record(conn, &record))
            .unwrap();
        assert_eq!(found.map(|h| h.id), Some(home.id));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let home = Household::new("Main");

        let result: Result<(), StoreError> = store.write(|tx| {
            insert_household(tx, &home)?;
            // Location pointing at a household that doesn't exist
            insert_location(tx, &Location::new("Attic", "missing-household"))
        });
        assert!(result.is_err());

        let count = store
            .read(|conn| count_rows(conn, EntityTable::Households))
            .unwrap();
        assert_eq!(count, 0, "household insert must be rolled back");
    }

    #[test]
    fn test_household_counts_are_scoped() {
        let store = Store::open_in_memory().unwrap();
        let a = Household::new("A");
        let b = Household::new("B");
        let kitchen = Location::new("Kitchen", &a.id);

        store
            .write(|tx| {
                insert_household(tx, &a)?;
                insert_household(tx, &b)?;
                insert_location(tx, &kitchen)?;
                insert_item(tx, &Item::new("Kettle", &a.id, Some(&kitchen.id)))?;
                insert_item(tx, &Item::new("Loose", &a.id, None))?;
                insert_item(tx, &Item::new("Bike", &b.id, None))
            })
            .unwrap();

        let counts = store.read(|conn| household_counts(conn, &a.id)).unwrap();
        assert_eq!(counts, HouseholdCounts { items: 2, locations: 1 });

        let counts = store.read(|conn| household_counts(conn, &b.id)).unwrap();
        assert_eq!(counts, HouseholdCounts { items: 1, locations: 0 });
    }

    #[test]
    fn test_duplicate_label_pair_rejected() {
        let store = Store::open_in_memory().unwrap();
        let home = Household::new("Main");
        let item = Item::new("TV", &home.id, None);
        let label = Label::new("Electronics");

        let result: Result<(), StoreError> = store.write(|tx| {
            insert_household(tx, &home)?;
            insert_item(tx, &item)?;
            insert_label(tx, &label)?;
            attach_label(tx, &item.id, &label.id)?;
            attach_label(tx, &item.id, &label.id)?;
            Ok(())
        });

        assert!(result.is_err(), "(item, label) pairs must be unique");
    }
}
