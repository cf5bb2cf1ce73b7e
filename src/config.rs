//! Shard map configuration loaded from JSON (file or `SHARDPLAN_CONFIG`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{PlanError, PlanResult};
use crate::parser::SqlDialect;

/// Environment variable holding an inline JSON shard map.
pub const CONFIG_ENV: &str = "SHARDPLAN_CONFIG";

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// Top-level shard map: databases, their tables and the partitions of each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    #[serde(default)]
    pub planner: PlannerSettings,
    pub databases: BTreeMap<String, DatabaseConfig>,
}

/// Parser settings used when planning raw SQL text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    #[serde(default)]
    pub dialect: SqlDialect,
    /// Maximum expression nesting depth accepted from clients.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

fn default_recursion_limit() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub tables: BTreeMap<String, TableConfig>,
}

/// A logical table.  Tables with a single partition need no shard key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub shard_key: Option<String>,
    #[serde(default = "default_slots")]
    pub slots: u32,
    pub partitions: Vec<PartitionConfig>,
}

fn default_slots() -> u32 {
    4096
}

/// A physical table owning the slot range `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub table: String,
    pub backend: String,
    pub start: u32,
    pub end: u32,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl ShardConfig {
    /// Read the shard map from `SHARDPLAN_CONFIG`.
    pub fn from_env() -> PlanResult<Self> {
        let raw = env::var(CONFIG_ENV)
            .map_err(|_| PlanError::config(format!("{CONFIG_ENV} environment variable is not set")))?;
        Self::from_json(&raw)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PlanResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            PlanError::config(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse a shard map from JSON and validate it.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let config: ShardConfig = serde_json::from_str(json)
            .map_err(|e| PlanError::config(format!("failed to parse shard map JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the shard map, reporting the first problem found.
    pub fn validate(&self) -> PlanResult<()> {
        if self.planner.recursion_limit == 0 {
            return Err(PlanError::config("planner.recursion_limit must be positive"));
        }

        for (db_name, db) in &self.databases {
            if db_name.trim().is_empty() {
                return Err(PlanError::config("database names must be non-empty"));
            }
            for (name, table) in &db.tables {
                if name.trim().is_empty() {
                    return Err(PlanError::config(format!(
                        "database '{db_name}': table names must be non-empty"
                    )));
                }
                table
                    .validate()
                    .map_err(|msg| PlanError::config(format!("table '{db_name}.{name}': {msg}")))?;
            }
        }

        Ok(())
    }
}

impl TableConfig {
    fn validate(&self) -> Result<(), String> {
        if self.slots == 0 {
            return Err("slots must be positive".to_string());
        }
        if self.partitions.is_empty() {
            return Err("at least one partition is required".to_string());
        }
        let has_key = self.shard_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if self.partitions.len() > 1 && !has_key {
            return Err("tables with more than one partition need a shard_key".to_string());
        }

        // Partitions must tile [0, slots) in order.
        let mut expected = 0;
        for p in &self.partitions {
            if p.table.trim().is_empty() || p.backend.trim().is_empty() {
                return Err("partition table and backend must be non-empty".to_string());
            }
            if p.start != expected {
                let problem = if p.start < expected { "overlaps" } else { "leaves a gap before" };
                return Err(format!(
                    "partition '{}' [{}, {}) {problem} slot {expected}",
                    p.table, p.start, p.end
                ));
            }
            if p.end <= p.start {
                return Err(format!("partition '{}' has an empty slot range", p.table));
            }
            expected = p.end;
        }
        if expected != self.slots {
            return Err(format!(
                "partitions cover slots [0, {expected}) but the table has {} slots",
                self.slots
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
            "planner": { "dialect": "postgres" },
            "databases": {
                "shop": {
                    "tables": {
                        "orders": {
                            "shard_key": "id",
                            "slots": 8,
                            "partitions": [
                                { "table": "orders_0", "backend": "a", "start": 0, "end": 4 },
                                { "table": "orders_1", "backend": "b", "start": 4, "end": 8 }
                            ]
                        },
                        "regions": {
                            "partitions": [
                                { "table": "regions", "backend": "a", "start": 0, "end": 4096 }
                            ]
                        }
                    }
                }
            }
        }"#
    }

    fn orders_json(partitions: &str, extra: &str) -> String {
        format!(
            r#"{{ "databases": {{ "shop": {{ "tables": {{ "orders": {{ {extra} "partitions": [{partitions}] }} }} }} }} }}"#
        )
    }

    #[test]
    fn parse_valid_config() {
        let cfg = ShardConfig::from_json(sample_json()).unwrap();
        assert_eq!(cfg.planner.dialect, SqlDialect::Postgres);
        assert_eq!(cfg.planner.recursion_limit, 64);

        let tables = &cfg.databases["shop"].tables;
        assert_eq!(tables["orders"].slots, 8);
        assert_eq!(tables["orders"].partitions.len(), 2);
        assert_eq!(tables["regions"].slots, 4096);
        assert!(tables["regions"].shard_key.is_none());
    }

    #[test]
    fn gap_rejected() {
        let json = orders_json(
            r#"{ "table": "o0", "backend": "a", "start": 0, "end": 4 },
               { "table": "o1", "backend": "b", "start": 5, "end": 8 }"#,
            r#""shard_key": "id", "slots": 8,"#,
        );
        let err = ShardConfig::from_json(&json).unwrap_err().to_string();
        assert!(err.contains("gap"), "error was: {err}");
    }

    #[test]
    fn overlap_rejected() {
        let json = orders_json(
            r#"{ "table": "o0", "backend": "a", "start": 0, "end": 5 },
               { "table": "o1", "backend": "b", "start": 4, "end": 8 }"#,
            r#""shard_key": "id", "slots": 8,"#,
        );
        let err = ShardConfig::from_json(&json).unwrap_err().to_string();
        assert!(err.contains("overlaps"), "error was: {err}");
    }

    #[test]
    fn incomplete_coverage_rejected() {
        let json = orders_json(
            r#"{ "table": "o0", "backend": "a", "start": 0, "end": 4 }"#,
            r#""slots": 8,"#,
        );
        let err = ShardConfig::from_json(&json).unwrap_err().to_string();
        assert!(err.contains("[0, 4)"), "error was: {err}");
    }

    #[test]
    fn zero_slots_and_missing_shard_key_rejected() {
        let json = orders_json(
            r#"{ "table": "o0", "backend": "a", "start": 0, "end": 1 }"#,
            r#""slots": 0,"#,
        );
        let err = ShardConfig::from_json(&json).unwrap_err().to_string();
        assert!(err.contains("slots must be positive"), "error was: {err}");

        let json = orders_json(
            r#"{ "table": "o0", "backend": "a", "start": 0, "end": 4 },
               { "table": "o1", "backend": "b", "start": 4, "end": 8 }"#,
            r#""slots": 8,"#,
        );
        let err = ShardConfig::from_json(&json).unwrap_err().to_string();
        assert!(err.contains("shard_key"), "error was: {err}");
    }

    #[test]
    fn malformed_json_returns_err() {
        let err = ShardConfig::from_json("{ not valid json }}}").unwrap_err();
        assert!(matches!(err, PlanError::ConfigError { .. }));
    }

    #[test]
    fn from_file_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();
        let cfg = ShardConfig::from_file(file.path()).unwrap();
        assert!(cfg.databases.contains_key("shop"));

        let err = ShardConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn from_env_reads_inline_json() {
        env::set_var(CONFIG_ENV, sample_json());
        let cfg = ShardConfig::from_env().unwrap();
        assert_eq!(cfg.databases["shop"].tables.len(), 2);
        env::remove_var(CONFIG_ENV);
    }
}
