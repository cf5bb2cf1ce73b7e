use std::fmt;

use thiserror::Error;

use crate::router::RouterError;

/// Constructs the planner refuses to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unsupported {
    /// Subquery in the select list, WHERE clause or FROM clause
    Subquery,
    /// GROUP_CONCAT in the select list
    GroupConcat,
    /// Sequence `nextval(...)` in the select list
    Nextval,
    /// Aggregate called with anything other than exactly one argument
    InvalidGroupFunction,
    /// `*` passed to an aggregate other than COUNT
    SyntaxError,
    /// Comparison whose right-hand side is not a literal value
    ValueCompareRequired,
    /// Window function in the select list
    WindowFunction,
    /// DISTINCT aggregate whose per-shard partials cannot be merged
    DistinctAggregate,
    /// UPDATE assigning the shard key column
    ShardKeyUpdate,
    /// Statement touching more than one table
    CrossShardJoin,
    /// GROUP BY item missing from the select list
    GroupByField,
    /// ORDER BY item missing from the select list
    OrderByField,
    /// Statement kind the planner does not handle
    Statement,
}

impl Unsupported {
    pub fn name(&self) -> &'static str {
        match self {
            Unsupported::Subquery => "subqueries",
            Unsupported::GroupConcat => "group_concat",
            Unsupported::Nextval => "nextval",
            Unsupported::InvalidGroupFunction => "invalid use of group function",
            Unsupported::SyntaxError => "syntax error",
            Unsupported::ValueCompareRequired => "value compare required",
            Unsupported::WindowFunction => "window functions",
            Unsupported::DistinctAggregate => "distinct aggregate across shards",
            Unsupported::ShardKeyUpdate => "shard key update",
            Unsupported::CrossShardJoin => "cross-shard join",
            Unsupported::GroupByField => "group by field not in select list",
            Unsupported::OrderByField => "order by field not in select list",
            Unsupported::Statement => "statement",
        }
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Unsupported: {kind}. Context: {context}")]
    UnsupportedConstruct { kind: Unsupported, context: String },

    #[error("Aggregate function nested inside select expression '{field}'")]
    AggregateNesting { field: String },

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl PlanError {
    pub fn unsupported(kind: Unsupported, context: impl Into<String>) -> Self {
        PlanError::UnsupportedConstruct {
            kind,
            context: context.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PlanError::ConfigError {
            message: message.into(),
        }
    }

    /// The unsupported-construct kind, if this is a rejection of that sort.
    pub fn unsupported_kind(&self) -> Option<Unsupported> {
        match self {
            PlanError::UnsupportedConstruct { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_display_carries_context() {
        let err = PlanError::unsupported(Unsupported::ValueCompareRequired, "t1.id = t2.id");
        let msg = err.to_string();
        assert!(msg.contains("value compare required"), "got: {msg}");
        assert!(msg.contains("t1.id = t2.id"), "got: {msg}");
        assert_eq!(err.unsupported_kind(), Some(Unsupported::ValueCompareRequired));
    }

    #[test]
    fn router_error_is_transparent() {
        let inner = RouterError::TableNotFound {
            database: "db".to_string(),
            table: "t".to_string(),
        };
        let err: PlanError = inner.clone().into();
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.unsupported_kind(), None);
    }
}
