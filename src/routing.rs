//! Predicate routing for a single-table statement.
//!
//! Only equality on the shard key narrows a statement to one segment.  Every
//! other predicate shape is ignored here and the statement is broadcast to
//! all segments of the table.

use log::debug;
use sqlparser::ast::{Assignment, AssignmentTarget, Expr, ObjectName};

use crate::error::{PlanError, PlanResult, Unsupported};
use crate::expr::{as_comparison, name_match, skip_parenthesis, split_and_expression, CompareOp};
use crate::router::{Router, Segment};

/// Segments a statement on `table` must reach, given its WHERE clause.
///
/// The first conjunct of the form `<shard_key> = <literal>` decides the
/// route; later conjuncts are not consulted, so `id = 5 AND id = 6` routes
/// on `5`.  Without such a conjunct the lookup is unbounded.
pub fn resolve_routing(
    database: &str,
    table: &str,
    shard_key: Option<&str>,
    where_expr: Option<&Expr>,
    router: &dyn Router,
) -> PlanResult<Vec<Segment>> {
    let key = shard_key.filter(|k| !k.is_empty());

    if let Some(key) = key {
        for filter in split_and_expression(where_expr) {
            let filter = skip_parenthesis(filter);
            let Some(cmp) = as_comparison(filter) else {
                continue;
            };
            if cmp.op != CompareOp::Eq || !name_match(cmp.left, table, key) {
                continue;
            }
            if let Some(value) = cmp.right_literal() {
                debug!("{database}.{table}: routing on {key} = {value}");
                let segments = router.lookup(database, table, Some(&value), Some(&value))?;
                return Ok(segments);
            }
        }
    }

    debug!("{database}.{table}: no shard key equality, routing to all segments");
    Ok(router.lookup(database, table, None, None)?)
}

/// True if any assignment writes the shard key column.
pub fn is_shard_key_changing(assignments: &[Assignment], shard_key: &str) -> bool {
    assignments.iter().any(|assignment| match &assignment.target {
        AssignmentTarget::ColumnName(name) => column_name(name) == Some(shard_key),
        AssignmentTarget::Tuple(names) => names.iter().any(|n| column_name(n) == Some(shard_key)),
    })
}

fn column_name(name: &ObjectName) -> Option<&str> {
    name.0.last().map(|ident| ident.value.as_str())
}

/// Require every comparison conjunct to compare against a literal.
///
/// Conjuncts are checked as written; a parenthesised comparison is not a
/// comparison node and passes.
pub fn check_comparison(expr: Option<&Expr>) -> PlanResult<()> {
    for filter in split_and_expression(expr) {
        if let Some(cmp) = as_comparison(filter) {
            if !cmp.right_is_literal() {
                return Err(PlanError::unsupported(
                    Unsupported::ValueCompareRequired,
                    filter.to_string(),
                ));
            }
        }
    }
    Ok(())
}
