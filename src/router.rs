//! Shard routing: the [`Router`] seam and a slot-hashing implementation.
//!
//! A sharded table is split into a fixed number of hash slots.  Each
//! partition owns a half-open slot range `[start, end)` and lives on one
//! backend as a physical table (e.g. `orders_0001`).  Routing a literal key
//! means hashing it to a slot and picking the partition whose range covers
//! that slot; routing without a key means "every partition of the table".

use std::collections::HashMap;
use std::hash::Hasher;

use log::trace;
use serde::Serialize;
use siphasher::sip::SipHasher13;
use sqlparser::ast::Value;
use thiserror::Error;

use crate::config::{ShardConfig, TableConfig};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Half-open slot range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyRange {
    pub start: u32,
    pub end: u32,
}

impl KeyRange {
    pub fn contains(&self, slot: u32) -> bool {
        self.start <= slot && slot < self.end
    }
}

/// One physical shard target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Physical table name on the backend.
    pub table: String,
    /// Backend holding the physical table.
    pub backend: String,
    pub range: KeyRange,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Database '{0}' not found in shard map")]
    DatabaseNotFound(String),

    #[error("Table '{database}.{table}' not found in shard map")]
    TableNotFound { database: String, table: String },

    #[error("Cannot route on key {key}: only integer, string and boolean literals hash to a slot")]
    UnroutableKey { key: String },

    #[error("Range routing is not supported (start: {start:?}, end: {end:?})")]
    RangeUnsupported {
        start: Option<String>,
        end: Option<String>,
    },

    #[error("Slot {slot} of table '{table}' is not covered by any partition")]
    SlotNotCovered { table: String, slot: u32 },
}

/// Maps a table and an optional key to the segments holding its rows.
pub trait Router {
    /// Segments for `table`.
    ///
    /// `start == end == None` means every segment of the table; equal
    /// literal keys mean an exact-match lookup.
    fn lookup(
        &self,
        database: &str,
        table: &str,
        start: Option<&Value>,
        end: Option<&Value>,
    ) -> Result<Vec<Segment>, RouterError>;

    /// The routing key column of `table`, or `None` for unsharded tables.
    fn shard_key(&self, database: &str, table: &str) -> Result<Option<String>, RouterError>;
}

// ---------------------------------------------------------------------------
// Hash router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TableRoute {
    shard_key: Option<String>,
    slots: u32,
    segments: Vec<Segment>,
}

impl TableRoute {
    fn from_config(table: &TableConfig) -> Self {
        let segments = table
            .partitions
            .iter()
            .map(|p| Segment {
                table: p.table.clone(),
                backend: p.backend.clone(),
                range: KeyRange {
                    start: p.start,
                    end: p.end,
                },
            })
            .collect();
        Self {
            shard_key: table.shard_key.clone().filter(|k| !k.is_empty()),
            slots: table.slots,
            segments,
        }
    }
}

/// Router over a validated [`ShardConfig`].  Immutable once built.
#[derive(Debug, Clone)]
pub struct HashRouter {
    databases: HashMap<String, HashMap<String, TableRoute>>,
}

impl HashRouter {
    pub fn new(config: &ShardConfig) -> Self {
        let databases = config
            .databases
            .iter()
            .map(|(db_name, db)| {
                let tables = db
                    .tables
                    .iter()
                    .map(|(name, table)| (name.clone(), TableRoute::from_config(table)))
                    .collect();
                (db_name.clone(), tables)
            })
            .collect();
        Self { databases }
    }

    fn table(&self, database: &str, table: &str) -> Result<&TableRoute, RouterError> {
        let tables = self
            .databases
            .get(database)
            .ok_or_else(|| RouterError::DatabaseNotFound(database.to_string()))?;
        tables.get(table).ok_or_else(|| RouterError::TableNotFound {
            database: database.to_string(),
            table: table.to_string(),
        })
    }
}

impl Router for HashRouter {
    fn lookup(
        &self,
        database: &str,
        table: &str,
        start: Option<&Value>,
        end: Option<&Value>,
    ) -> Result<Vec<Segment>, RouterError> {
        let route = self.table(database, table)?;

        let key = match (start, end) {
            (None, None) => return Ok(route.segments.clone()),
            (Some(start), Some(end)) if start == end => start,
            (start, end) => {
                return Err(RouterError::RangeUnsupported {
                    start: start.map(|v| v.to_string()),
                    end: end.map(|v| v.to_string()),
                })
            }
        };

        // Unsharded tables live in a single partition whatever the key.
        if route.segments.len() == 1 {
            return Ok(route.segments.clone());
        }

        let slot = (hash_key(key)? % u64::from(route.slots)) as u32;
        trace!("{database}.{table}: key {key} hashed to slot {slot}");

        route
            .segments
            .iter()
            .find(|s| s.range.contains(slot))
            .map(|s| vec![s.clone()])
            .ok_or_else(|| RouterError::SlotNotCovered {
                table: table.to_string(),
                slot,
            })
    }

    fn shard_key(&self, database: &str, table: &str) -> Result<Option<String>, RouterError> {
        Ok(self.table(database, table)?.shard_key.clone())
    }
}

/// Stable SipHash-1-3 of a literal key.
///
/// Integers hash their little-endian `i64` bytes, so `7` and `07` share a
/// slot; strings hash their UTF-8 bytes.
pub fn hash_key(key: &Value) -> Result<u64, RouterError> {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    match key {
        Value::Number(n, _) => match n.parse::<i64>() {
            Ok(i) => hasher.write(&i.to_le_bytes()),
            Err(_) => hasher.write(n.as_bytes()),
        },
        Value::Boolean(b) => hasher.write(&i64::from(*b).to_le_bytes()),
        Value::SingleQuotedString(s)
        | Value::DoubleQuotedString(s)
        | Value::NationalStringLiteral(s) => hasher.write(s.as_bytes()),
        other => {
            return Err(RouterError::UnroutableKey {
                key: other.to_string(),
            })
        }
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_router() -> HashRouter {
        let json = r#"{
            "databases": {
                "shop": {
                    "tables": {
                        "orders": {
                            "shard_key": "id",
                            "slots": 16,
                            "partitions": [
                                { "table": "orders_0000", "backend": "node-a", "start": 0, "end": 8 },
                                { "table": "orders_0001", "backend": "node-b", "start": 8, "end": 16 }
                            ]
                        },
                        "regions": {
                            "partitions": [
                                { "table": "regions", "backend": "node-a", "start": 0, "end": 4096 }
                            ]
                        }
                    }
                }
            }
        }"#;
        HashRouter::new(&ShardConfig::from_json(json).unwrap())
    }

    fn number(n: &str) -> Value {
        Value::Number(n.to_string(), false)
    }

    #[test]
    fn unbounded_lookup_returns_all_segments_in_order() {
        let router = sample_router();
        let segments = router.lookup("shop", "orders", None, None).unwrap();
        let names: Vec<_> = segments.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(names, vec!["orders_0000", "orders_0001"]);
    }

    #[test]
    fn literal_lookup_returns_single_covering_segment() {
        let router = sample_router();
        let key = number("42");
        let segments = router.lookup("shop", "orders", Some(&key), Some(&key)).unwrap();
        assert_eq!(segments.len(), 1);

        let slot = (hash_key(&key).unwrap() % 16) as u32;
        assert!(segments[0].range.contains(slot));

        let again = router.lookup("shop", "orders", Some(&key), Some(&key)).unwrap();
        assert_eq!(segments, again);
    }

    #[test]
    fn unsharded_table_ignores_key() {
        let router = sample_router();
        let key = Value::SingleQuotedString("eu".to_string());
        let segments = router.lookup("shop", "regions", Some(&key), Some(&key)).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].table, "regions");
        assert_eq!(router.shard_key("shop", "regions").unwrap(), None);
        assert_eq!(router.shard_key("shop", "orders").unwrap(), Some("id".to_string()));
    }

    #[test]
    fn unknown_database_and_table() {
        let router = sample_router();
        assert_eq!(
            router.lookup("nope", "orders", None, None).unwrap_err(),
            RouterError::DatabaseNotFound("nope".to_string())
        );
        assert!(matches!(
            router.shard_key("shop", "nope").unwrap_err(),
            RouterError::TableNotFound { .. }
        ));
    }

    #[test]
    fn range_and_unroutable_keys_rejected() {
        let router = sample_router();
        let (a, b) = (number("1"), number("2"));
        assert!(matches!(
            router.lookup("shop", "orders", Some(&a), Some(&b)).unwrap_err(),
            RouterError::RangeUnsupported { .. }
        ));
        assert!(matches!(
            router.lookup("shop", "orders", Some(&a), None).unwrap_err(),
            RouterError::RangeUnsupported { .. }
        ));

        let null = Value::Null;
        assert!(matches!(
            router.lookup("shop", "orders", Some(&null), Some(&null)).unwrap_err(),
            RouterError::UnroutableKey { .. }
        ));
    }

    #[test]
    fn hash_key_distinguishes_integer_and_text() {
        let int = hash_key(&number("7")).unwrap();
        assert_eq!(int, hash_key(&number("7")).unwrap());
        assert_eq!(int, hash_key(&number("07")).unwrap());
        assert_ne!(
            int,
            hash_key(&Value::SingleQuotedString("7".to_string())).unwrap()
        );
        assert_eq!(
            hash_key(&Value::Boolean(true)).unwrap(),
            hash_key(&number("1")).unwrap()
        );
    }
}
