//! # shardplan
//!
//! Predicate routing and select-list rewriting for SQL statements running
//! against a sharded backend.
//!
//! Given a parsed statement the planner decides which shard segments it must
//! reach and, for a SELECT fanning out to several segments, how the select
//! list has to be validated and rewritten so a coordinator can merge the
//! per-shard partial results.
//!
//! ## Quick Start
//!
//! ```rust
//! use shardplan::{HashRouter, Planner, ShardConfig, SqlParser};
//!
//! let config = ShardConfig::from_json(r#"{
//!     "databases": { "shop": { "tables": { "orders": {
//!         "shard_key": "id",
//!         "slots": 4,
//!         "partitions": [
//!             { "table": "orders_0", "backend": "a", "start": 0, "end": 2 },
//!             { "table": "orders_1", "backend": "b", "start": 2, "end": 4 }
//!         ]
//!     } } } }
//! }"#).unwrap();
//!
//! let router = HashRouter::new(&config);
//! let planner = Planner::new(&router);
//! let parser = SqlParser::default();
//!
//! // Equality on the shard key reaches one segment.
//! let plan = planner.plan_sql(&parser, "shop", "SELECT a FROM orders WHERE id = 5").unwrap();
//! assert_eq!(plan.segments.len(), 1);
//!
//! // Anything else is broadcast, and AVG is split into SUM and COUNT.
//! let plan = planner.plan_sql(&parser, "shop", "SELECT avg(a) AS m FROM orders").unwrap();
//! assert_eq!(plan.segments.len(), 2);
//! assert_eq!(plan.projection, vec!["sum(a) AS m", "count(a)"]);
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod logging;
pub mod parser;
pub mod planner;
pub mod router;
pub mod routing;
pub mod select;

pub use config::ShardConfig;
pub use error::{PlanError, PlanResult, Unsupported};
pub use parser::{SqlDialect, SqlParser};
pub use planner::{Planner, RoutePlan, StatementKind};
pub use router::{HashRouter, KeyRange, Router, RouterError, Segment};
pub use routing::{check_comparison, is_shard_key_changing, resolve_routing};
pub use select::{check_in_tuple, decompose_avg, parse_select_expr, parse_select_exprs, SelectTuple};
