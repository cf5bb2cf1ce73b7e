//! Select-list analysis for scatter-gather execution.
//!
//! Every item of a SELECT list is parsed into a [`SelectTuple`]: the name the
//! backend will return the column under, the tables the item reads from, and
//! the aggregate it computes (if any).  The tuples drive three decisions:
//!
//! - whether the list can be pushed to shards at all (no subqueries,
//!   GROUP_CONCAT, nested or malformed aggregates);
//! - whether GROUP BY / ORDER BY references name something the list produces
//!   ([`check_in_tuple`]);
//! - how AVG is rewritten so per-shard partials merge correctly
//!   ([`decompose_avg`]).
//!
//! For `SELECT count(*), count(distinct x.a) AS cstar, max(x.a) AS mb, t.a AS a1, x.b FROM t, x`:
//!
//! | field      | refer_tables | aggr_func | aggr_field | distinct |
//! |------------|--------------|-----------|------------|----------|
//! | `count(*)` | `[]`         | `count`   | `*`        | false    |
//! | `cstar`    | `[x]`        | `count`   | `x.a`      | true     |
//! | `mb`       | `[x]`        | `max`     | `x.a`      | false    |
//! | `a1`       | `[t]`        |           |            | false    |
//! | `b`        | `[x]`        |           |            | false    |

use std::ops::ControlFlow;

use serde::Serialize;
use sqlparser::ast::{
    visit_expressions, DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr,
    FunctionArgumentList, FunctionArguments, Ident, ObjectName, SelectItem,
};

use crate::error::{PlanError, PlanResult, Unsupported};
use crate::expr::{column_ref, function_name, is_subquery};

/// Aggregate function names, lower-cased.
pub const AGGREGATES: &[&str] = &[
    "avg",
    "bit_and",
    "bit_or",
    "bit_xor",
    "count",
    "max",
    "min",
    "std",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "sum",
    "var_pop",
    "var_samp",
    "variance",
];

pub fn is_aggregate(name: &str) -> bool {
    AGGREGATES.contains(&name.to_lowercase().as_str())
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// Table names in first-seen order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSet(Vec<String>);

impl TableSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add `table` unless already present; returns whether it was added.
    pub fn insert(&mut self, table: &str) -> bool {
        if self.contains(table) {
            return false;
        }
        self.0.push(table.to_string());
        true
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.iter().any(|t| t == table)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// One parsed select-list item.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectTuple<'a> {
    /// The original item.
    pub expr: &'a SelectItem,
    /// Column name the backend returns: alias, bare column name, or the
    /// expression text.
    pub field: String,
    pub refer_tables: TableSet,
    /// Lower-cased aggregate name, empty for non-aggregates.
    pub aggr_func: String,
    /// Text of the aggregate's single argument.
    pub aggr_field: String,
    pub distinct: bool,
}

impl<'a> SelectTuple<'a> {
    pub fn is_aggregate(&self) -> bool {
        !self.aggr_func.is_empty()
    }

    /// True if the item is an aggregate whose own call carries DISTINCT.
    ///
    /// Unlike `distinct`, arguments are not consulted, so
    /// `count(DISTINCT upper(a))` qualifies.  MIN and MAX are excluded: their
    /// result does not depend on duplicates.
    pub fn is_distinct_aggregate(&self) -> bool {
        if !self.is_aggregate() || matches!(self.aggr_func.as_str(), "min" | "max") {
            return false;
        }
        match self.expr {
            SelectItem::UnnamedExpr(Expr::Function(func))
            | SelectItem::ExprWithAlias {
                expr: Expr::Function(func),
                ..
            } => is_distinct(func),
            _ => false,
        }
    }

    fn star(item: &'a SelectItem, table: Option<&str>) -> Self {
        let mut refer_tables = TableSet::new();
        if let Some(table) = table {
            refer_tables.insert(table);
        }
        Self {
            expr: item,
            field: "*".to_string(),
            refer_tables,
            aggr_func: String::new(),
            aggr_field: String::new(),
            distinct: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one select item into a [`SelectTuple`].
pub fn parse_select_expr(item: &SelectItem) -> PlanResult<SelectTuple<'_>> {
    let (expr, alias) = match item {
        SelectItem::UnnamedExpr(expr) => (expr, None),
        SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias)),
        SelectItem::Wildcard(_) => return Ok(SelectTuple::star(item, None)),
        SelectItem::QualifiedWildcard(name, _) => {
            return Ok(SelectTuple::star(item, object_table(name)))
        }
    };

    let field = match (alias, column_ref(expr)) {
        (Some(alias), _) => alias.value.clone(),
        (None, Some(col)) => col.name.to_string(),
        (None, None) => expr.to_string(),
    };

    let mut refer_tables = TableSet::new();
    let mut aggr_func = String::new();
    let mut aggr_field = String::new();
    let mut distinct = false;

    let flow = visit_expressions(expr, |node| {
        if is_subquery(node) {
            return ControlFlow::Break(PlanError::unsupported(
                Unsupported::Subquery,
                node.to_string(),
            ));
        }

        match node {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                if let Some(table) = column_ref(node).and_then(|col| col.qualifier) {
                    refer_tables.insert(table);
                }
            }
            Expr::Function(func) => {
                let name = function_name(func);
                if name == "group_concat" {
                    return ControlFlow::Break(PlanError::unsupported(
                        Unsupported::GroupConcat,
                        node.to_string(),
                    ));
                }
                if func.over.is_some() {
                    return ControlFlow::Break(PlanError::unsupported(
                        Unsupported::WindowFunction,
                        node.to_string(),
                    ));
                }

                distinct = is_distinct(func);
                if is_aggregate(&name) {
                    if !std::ptr::eq(node, expr) {
                        return ControlFlow::Break(PlanError::AggregateNesting {
                            field: field.clone(),
                        });
                    }
                    let Some(arg) = single_argument(func) else {
                        return ControlFlow::Break(PlanError::unsupported(
                            Unsupported::InvalidGroupFunction,
                            name,
                        ));
                    };
                    aggr_field = arg.to_string();
                    if aggr_field == "*" && name != "count" {
                        return ControlFlow::Break(PlanError::unsupported(
                            Unsupported::SyntaxError,
                            field.clone(),
                        ));
                    }
                    aggr_func = name;
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });

    if let ControlFlow::Break(err) = flow {
        return Err(err);
    }

    Ok(SelectTuple {
        expr: item,
        field,
        refer_tables,
        aggr_func,
        aggr_field,
        distinct,
    })
}

/// Parse a whole select list, stopping at the first rejected item.
pub fn parse_select_exprs(items: &[SelectItem]) -> PlanResult<Vec<SelectTuple<'_>>> {
    items
        .iter()
        .map(|item| {
            if is_nextval(item) {
                return Err(PlanError::unsupported(Unsupported::Nextval, item.to_string()));
            }
            parse_select_expr(item)
        })
        .collect()
}

fn is_nextval(item: &SelectItem) -> bool {
    match item {
        SelectItem::UnnamedExpr(Expr::Function(func))
        | SelectItem::ExprWithAlias {
            expr: Expr::Function(func),
            ..
        } => function_name(func) == "nextval",
        _ => false,
    }
}

fn is_distinct(func: &Function) -> bool {
    match &func.args {
        FunctionArguments::List(list) => {
            matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct))
        }
        _ => false,
    }
}

/// The sole unnamed argument of `func`, if it has exactly one.
fn single_argument(func: &Function) -> Option<&FunctionArgExpr> {
    match &func.args {
        FunctionArguments::List(list) if list.args.len() == 1 => match &list.args[0] {
            FunctionArg::Unnamed(arg) => Some(arg),
            _ => None,
        },
        _ => None,
    }
}

fn object_table(name: &ObjectName) -> Option<&str> {
    name.0.last().map(|ident| ident.value.as_str())
}

// ---------------------------------------------------------------------------
// Projection membership
// ---------------------------------------------------------------------------

/// True if some tuple produces `field`, attributed to `table` when given.
///
/// A tuple reading from several tables never satisfies a table-qualified
/// lookup: its origin table is ambiguous.
pub fn check_in_tuple(field: &str, table: Option<&str>, tuples: &[SelectTuple<'_>]) -> bool {
    let table = table.filter(|t| !t.is_empty());
    tuples.iter().any(|tuple| {
        if tuple.field != "*" && tuple.field != field {
            return false;
        }
        match table {
            None => true,
            Some(table) => {
                tuple.refer_tables.is_empty()
                    || (tuple.refer_tables.len() == 1 && tuple.refer_tables.contains(table))
            }
        }
    })
}

// ---------------------------------------------------------------------------
// AVG decomposition
// ---------------------------------------------------------------------------

/// Rewrite `avg(x)` into `sum(x) AS <field>` and `count(x)`.
///
/// The coordinator computes the average as `SUM(sums) / SUM(counts)`; the
/// sum keeps the original output name so merge logic finds it there.
pub fn decompose_avg(tuple: &SelectTuple<'_>) -> Vec<SelectItem> {
    let arg = aggregate_argument(tuple.expr).cloned().unwrap_or_else(|| {
        FunctionArgExpr::Expr(Expr::Identifier(Ident::new(tuple.aggr_field.clone())))
    });

    vec![
        SelectItem::ExprWithAlias {
            expr: Expr::Function(make_func("sum", arg.clone())),
            alias: alias_ident(&tuple.field),
        },
        SelectItem::UnnamedExpr(Expr::Function(make_func("count", arg))),
    ]
}

fn aggregate_argument(item: &SelectItem) -> Option<&FunctionArgExpr> {
    match item {
        SelectItem::UnnamedExpr(Expr::Function(func))
        | SelectItem::ExprWithAlias {
            expr: Expr::Function(func),
            ..
        } => single_argument(func),
        _ => None,
    }
}

/// Quote the alias unless it is a plain identifier.
fn alias_ident(field: &str) -> Ident {
    let plain = !field.is_empty()
        && !field.starts_with(|c: char| c.is_ascii_digit())
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Ident::new(field)
    } else {
        Ident::with_quote('"', field)
    }
}

/// Create a `Function` AST node for a single-argument function.
fn make_func(name: &str, arg: FunctionArgExpr) -> Function {
    Function {
        name: ObjectName(vec![Ident::new(name)]),
        uses_odbc_syntax: false,
        parameters: FunctionArguments::None,
        args: FunctionArguments::List(FunctionArgumentList {
            duplicate_treatment: None,
            args: vec![FunctionArg::Unnamed(arg)],
            clauses: vec![],
        }),
        filter: None,
        null_treatment: None,
        over: None,
        within_group: vec![],
    }
}
