//! Expression-tree helpers shared by the routing and select analyzers.
//!
//! Everything here reads `sqlparser` expression trees without mutating them.
//! The helpers answer small structural questions: which conjuncts make up a
//! WHERE clause, whether a node is a comparison, a column reference or a
//! literal, and whether a subquery hides anywhere below a node.

use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, BinaryOperator, Expr, Function, FunctionArguments, UnaryOperator, Value,
};

// ---------------------------------------------------------------------------
// Conjunct decomposition
// ---------------------------------------------------------------------------

/// Break an expression into its AND-separated conjuncts.
///
/// Nested ANDs are flattened left to right and parenthesised ANDs are
/// unwrapped to the same depth.  Any other node, including a parenthesised
/// non-AND expression, is returned as a single conjunct.  `None` yields an
/// empty list.
pub fn split_and_expression(expr: Option<&Expr>) -> Vec<&Expr> {
    let mut filters = Vec::new();
    if let Some(expr) = expr {
        split_into(&mut filters, expr);
    }
    filters
}

fn split_into<'a>(filters: &mut Vec<&'a Expr>, node: &'a Expr) {
    match node {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_into(filters, left);
            split_into(filters, right);
        }
        Expr::Nested(inner) if is_and(inner) => split_into(filters, inner),
        _ => filters.push(node),
    }
}

fn is_and(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::BinaryOp {
            op: BinaryOperator::And,
            ..
        }
    )
}

/// Strip every layer of parentheses around `expr`.
pub fn skip_parenthesis(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => skip_parenthesis(inner),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Column references and literals
// ---------------------------------------------------------------------------

/// A column reference with its optional table qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef<'a> {
    pub qualifier: Option<&'a str>,
    pub name: &'a str,
}

/// View `expr` as a column reference.
///
/// For `db.t.col` the qualifier is `t`: only the table part takes part in
/// table attribution.
pub fn column_ref(expr: &Expr) -> Option<ColumnRef<'_>> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnRef {
            qualifier: None,
            name: &ident.value,
        }),
        Expr::CompoundIdentifier(idents) if !idents.is_empty() => {
            let name = &idents[idents.len() - 1].value;
            let qualifier = if idents.len() >= 2 {
                Some(idents[idents.len() - 2].value.as_str())
            } else {
                None
            };
            Some(ColumnRef { qualifier, name })
        }
        _ => None,
    }
}

/// True if `expr` is a reference to `shard_key`, either unqualified or
/// qualified with `table`.
pub fn name_match(expr: &Expr, table: &str, shard_key: &str) -> bool {
    match column_ref(expr) {
        Some(col) => col.qualifier.map_or(true, |q| q == table) && col.name == shard_key,
        None => false,
    }
}

/// The literal carried by `expr`, if it is one.
///
/// Signed numeric literals such as `-5` parse as a unary operator applied to
/// a number; they are folded back into a single numeric value.  `NULL` is
/// not a literal: it neither routes nor satisfies a value comparison.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Value(Value::Null) => None,
        Expr::Value(value) => Some(value.clone()),
        Expr::UnaryOp { op, expr } => match (op, expr.as_ref()) {
            (UnaryOperator::Minus, Expr::Value(Value::Number(n, long))) => {
                Some(Value::Number(format!("-{n}"), *long))
            }
            (UnaryOperator::Plus, Expr::Value(value @ Value::Number(..))) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}

pub fn is_literal(expr: &Expr) -> bool {
    literal_value(expr).is_some()
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    NullSafeEq,
    In,
    NotIn,
    Like,
    NotLike,
    Regexp,
    NotRegexp,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, Copy)]
pub enum ComparisonRhs<'a> {
    Expr(&'a Expr),
    /// Value list of an `IN (...)` comparison
    List(&'a [Expr]),
}

#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    pub op: CompareOp,
    pub left: &'a Expr,
    pub right: ComparisonRhs<'a>,
}

impl<'a> Comparison<'a> {
    /// An IN list is a tuple, never a single literal value.
    pub fn right_is_literal(&self) -> bool {
        match self.right {
            ComparisonRhs::Expr(expr) => is_literal(expr),
            ComparisonRhs::List(_) => false,
        }
    }

    pub fn right_literal(&self) -> Option<Value> {
        match self.right {
            ComparisonRhs::Expr(expr) => literal_value(expr),
            ComparisonRhs::List(_) => None,
        }
    }
}

/// View `expr` as a comparison, if it is one.
pub fn as_comparison(expr: &Expr) -> Option<Comparison<'_>> {
    let (op, left, right) = match expr {
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::Eq => CompareOp::Eq,
                BinaryOperator::NotEq => CompareOp::NotEq,
                BinaryOperator::Lt => CompareOp::Lt,
                BinaryOperator::LtEq => CompareOp::LtEq,
                BinaryOperator::Gt => CompareOp::Gt,
                BinaryOperator::GtEq => CompareOp::GtEq,
                BinaryOperator::Spaceship => CompareOp::NullSafeEq,
                _ => return None,
            };
            (op, left.as_ref(), ComparisonRhs::Expr(right.as_ref()))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let op = if *negated { CompareOp::NotIn } else { CompareOp::In };
            (op, expr.as_ref(), ComparisonRhs::List(list.as_slice()))
        }
        Expr::Like {
            negated,
            expr,
            pattern,
            ..
        }
        | Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => {
            let op = if *negated { CompareOp::NotLike } else { CompareOp::Like };
            (op, expr.as_ref(), ComparisonRhs::Expr(pattern.as_ref()))
        }
        Expr::RLike {
            negated,
            expr,
            pattern,
            ..
        } => {
            let op = if *negated {
                CompareOp::NotRegexp
            } else {
                CompareOp::Regexp
            };
            (op, expr.as_ref(), ComparisonRhs::Expr(pattern.as_ref()))
        }
        _ => return None,
    };
    Some(Comparison { op, left, right })
}

// ---------------------------------------------------------------------------
// Functions and subqueries
// ---------------------------------------------------------------------------

/// Lower-cased, unqualified function name.
pub fn function_name(func: &Function) -> String {
    func.name
        .0
        .last()
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}

/// True if `expr` itself is a subquery node.
pub fn is_subquery(expr: &Expr) -> bool {
    match expr {
        Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. } => true,
        Expr::Function(func) => matches!(func.args, FunctionArguments::Subquery(_)),
        _ => false,
    }
}

/// True if a subquery appears anywhere inside `expr`.
pub fn has_subquery(expr: &Expr) -> bool {
    visit_expressions(expr, |node| {
        if is_subquery(node) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}
