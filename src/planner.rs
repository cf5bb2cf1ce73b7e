//! Statement planner: turns a parsed SELECT, UPDATE or DELETE into a
//! [`RoutePlan`].
//!
//! The planner only handles statements over a single sharded table.  For a
//! SELECT it also validates the select list against what a coordinator can
//! merge and, when the query fans out to several segments, rewrites AVG into
//! SUM/COUNT partials.

use log::debug;
use serde::Serialize;
use sqlparser::ast::{
    Delete, Expr, FromTable, GroupByExpr, JoinConstraint, JoinOperator, ObjectName, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};

use crate::error::{PlanError, PlanResult, Unsupported};
use crate::expr::{column_ref, has_subquery};
use crate::parser::SqlParser;
use crate::router::{Router, Segment};
use crate::routing::{check_comparison, is_shard_key_changing, resolve_routing};
use crate::select::{check_in_tuple, decompose_avg, parse_select_exprs, SelectTuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Update,
    Delete,
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }
}

/// Where a statement runs and what each shard is asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    pub kind: StatementKind,
    pub database: String,
    pub table: String,
    pub segments: Vec<Segment>,
    /// Per-shard select list as SQL text; empty for UPDATE and DELETE.
    pub projection: Vec<String>,
    /// True when AVG items were split into SUM and COUNT.
    pub rewritten: bool,
}

pub struct Planner<'r> {
    router: &'r dyn Router,
}

impl<'r> Planner<'r> {
    pub fn new(router: &'r dyn Router) -> Self {
        Self { router }
    }

    /// Parse `sql` and plan it against `database`.
    pub fn plan_sql(&self, parser: &SqlParser, database: &str, sql: &str) -> PlanResult<RoutePlan> {
        let statement = parser.parse_statement(sql)?;
        self.plan(database, &statement)
    }

    pub fn plan(&self, database: &str, statement: &Statement) -> PlanResult<RoutePlan> {
        let plan = match statement {
            Statement::Query(query) => self.plan_query(database, query)?,
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                if !table.joins.is_empty() || from.is_some() {
                    return Err(PlanError::unsupported(
                        Unsupported::CrossShardJoin,
                        statement.to_string(),
                    ));
                }
                let (database, table) = plain_table(database, &table.relation)?;
                reject_subquery(selection.as_ref())?;

                let shard_key = self.router.shard_key(&database, &table)?;
                if let Some(key) = shard_key.as_deref() {
                    if is_shard_key_changing(assignments, key) {
                        return Err(PlanError::unsupported(
                            Unsupported::ShardKeyUpdate,
                            statement.to_string(),
                        ));
                    }
                }
                self.dml_plan(StatementKind::Update, database, table, shard_key, selection.as_ref())?
            }
            Statement::Delete(delete) => self.plan_delete(database, delete, statement)?,
            other => {
                return Err(PlanError::unsupported(
                    Unsupported::Statement,
                    other.to_string(),
                ))
            }
        };

        debug!(
            "planned {} on {}.{}: {} segment(s)",
            plan.kind.name(),
            plan.database,
            plan.table,
            plan.segments.len()
        );
        Ok(plan)
    }

    fn plan_query(&self, database: &str, query: &Query) -> PlanResult<RoutePlan> {
        if query.with.is_some() {
            return Err(PlanError::unsupported(Unsupported::Subquery, query.to_string()));
        }
        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select.as_ref(),
            _ => {
                return Err(PlanError::unsupported(
                    Unsupported::Statement,
                    query.to_string(),
                ))
            }
        };

        let relation = single_relation(select)?;
        let (database, table) = plain_table(database, relation)?;
        reject_subquery(select.selection.as_ref())?;
        reject_subquery(select.having.as_ref())?;

        let tuples = parse_select_exprs(&select.projection)?;

        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                reject_subquery(Some(expr))?;
                require_projected(expr, &tuples, Unsupported::GroupByField)?;
            }
        }
        if let Some(order_by) = &query.order_by {
            for item in &order_by.exprs {
                reject_subquery(Some(&item.expr))?;
                require_projected(&item.expr, &tuples, Unsupported::OrderByField)?;
            }
        }

        let shard_key = self.router.shard_key(&database, &table)?;
        let segments = resolve_routing(
            &database,
            &table,
            shard_key.as_deref(),
            select.selection.as_ref(),
            self.router,
        )?;

        let scatter = segments.len() > 1;
        if scatter {
            // Shards may hold the same value, so per-shard distinct
            // partials cannot be added up.
            if let Some(tuple) = tuples.iter().find(|t| t.is_distinct_aggregate()) {
                return Err(PlanError::unsupported(
                    Unsupported::DistinctAggregate,
                    tuple.expr.to_string(),
                ));
            }
        }

        let mut rewritten = false;
        let mut projection = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            if scatter && tuple.aggr_func == "avg" {
                projection.extend(decompose_avg(tuple).iter().map(SelectItem::to_string));
                rewritten = true;
            } else {
                projection.push(tuple.expr.to_string());
            }
        }

        Ok(RoutePlan {
            kind: StatementKind::Select,
            database,
            table,
            segments,
            projection,
            rewritten,
        })
    }

    fn plan_delete(
        &self,
        database: &str,
        delete: &Delete,
        statement: &Statement,
    ) -> PlanResult<RoutePlan> {
        let from = match &delete.from {
            FromTable::WithFromKeyword(from) | FromTable::WithoutKeyword(from) => from,
        };
        let relation = match from.as_slice() {
            [only] if only.joins.is_empty() && delete.tables.is_empty() && delete.using.is_none() => {
                &only.relation
            }
            _ => {
                return Err(PlanError::unsupported(
                    Unsupported::CrossShardJoin,
                    statement.to_string(),
                ))
            }
        };
        let (database, table) = plain_table(database, relation)?;
        reject_subquery(delete.selection.as_ref())?;

        let shard_key = self.router.shard_key(&database, &table)?;
        self.dml_plan(
            StatementKind::Delete,
            database,
            table,
            shard_key,
            delete.selection.as_ref(),
        )
    }

    fn dml_plan(
        &self,
        kind: StatementKind,
        database: String,
        table: String,
        shard_key: Option<String>,
        selection: Option<&Expr>,
    ) -> PlanResult<RoutePlan> {
        let segments = resolve_routing(
            &database,
            &table,
            shard_key.as_deref(),
            selection,
            self.router,
        )?;
        Ok(RoutePlan {
            kind,
            database,
            table,
            segments,
            projection: Vec::new(),
            rewritten: false,
        })
    }
}

/// The one FROM item of a SELECT.
///
/// Several FROM items or any JOIN make the query cross-shard.  Join
/// conditions and the WHERE clause are validated first, so a column-to-column
/// condition reports the comparison rather than the join.
fn single_relation(select: &Select) -> PlanResult<&TableFactor> {
    match select.from.as_slice() {
        [] => Err(PlanError::unsupported(
            Unsupported::Statement,
            select.to_string(),
        )),
        [only] if only.joins.is_empty() => Ok(&only.relation),
        from => {
            for table in from {
                check_join_conditions(table)?;
            }
            check_comparison(select.selection.as_ref())?;
            Err(PlanError::unsupported(
                Unsupported::CrossShardJoin,
                from.iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ))
        }
    }
}

fn check_join_conditions(table: &TableWithJoins) -> PlanResult<()> {
    for join in &table.joins {
        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c) => c,
            _ => continue,
        };
        if let JoinConstraint::On(expr) = constraint {
            check_comparison(Some(expr))?;
        }
    }
    Ok(())
}

/// Resolve a FROM item to `(database, table)`; a schema qualifier overrides
/// the session database.
fn plain_table(database: &str, relation: &TableFactor) -> PlanResult<(String, String)> {
    match relation {
        TableFactor::Table { name, .. } => split_table_name(database, name).ok_or_else(|| {
            PlanError::unsupported(Unsupported::Statement, relation.to_string())
        }),
        TableFactor::Derived { .. } => Err(PlanError::unsupported(
            Unsupported::Subquery,
            relation.to_string(),
        )),
        other => Err(PlanError::unsupported(
            Unsupported::Statement,
            other.to_string(),
        )),
    }
}

fn split_table_name(database: &str, name: &ObjectName) -> Option<(String, String)> {
    let parts = &name.0;
    let table = parts.last()?.value.clone();
    let database = match parts.len() {
        0 | 1 => database.to_string(),
        n => parts[n - 2].value.clone(),
    };
    Some((database, table))
}

fn reject_subquery(selection: Option<&Expr>) -> PlanResult<()> {
    match selection {
        Some(expr) if has_subquery(expr) => Err(PlanError::unsupported(
            Unsupported::Subquery,
            expr.to_string(),
        )),
        _ => Ok(()),
    }
}

/// GROUP BY and ORDER BY items must be columns the select list produces.
fn require_projected(expr: &Expr, tuples: &[SelectTuple<'_>], kind: Unsupported) -> PlanResult<()> {
    match column_ref(expr) {
        Some(col) if check_in_tuple(col.name, col.qualifier, tuples) => Ok(()),
        _ => Err(PlanError::unsupported(kind, expr.to_string())),
    }
}
