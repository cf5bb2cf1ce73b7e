//! SQL dialect selection and a recursion-limited parser wrapper.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::error::{PlanError, PlanResult};

/// SQL dialects accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Mysql,
    Postgres,
    Generic,
}

impl SqlDialect {
    pub fn all() -> &'static [SqlDialect] {
        &[SqlDialect::Mysql, SqlDialect::Postgres, SqlDialect::Generic]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Mysql => "mysql",
            SqlDialect::Postgres => "postgres",
            SqlDialect::Generic => "generic",
        }
    }

    /// Parse dialect from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<SqlDialect, String> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(SqlDialect::Mysql),
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            "generic" => Ok(SqlDialect::Generic),
            _ => Err(format!(
                "Unsupported dialect: {}. Supported dialects: {}",
                s,
                SqlDialect::all()
                    .iter()
                    .map(|d| d.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Mysql => Box::new(MySqlDialect {}),
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::Generic => Box::new(GenericDialect {}),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parser wrapper with a bounded recursion depth.
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
    recursion_limit: usize,
}

impl SqlParser {
    pub fn new(dialect: SqlDialect, recursion_limit: usize) -> Self {
        Self {
            dialect: dialect.dialect(),
            recursion_limit,
        }
    }

    pub fn parse(&self, sql: &str) -> PlanResult<Vec<Statement>> {
        Parser::new(self.dialect.as_ref())
            .with_recursion_limit(self.recursion_limit)
            .try_with_sql(sql)
            .and_then(|mut parser| parser.parse_statements())
            .map_err(|e| PlanError::ParseError {
                message: e.to_string(),
            })
    }

    /// Parse exactly one statement.
    pub fn parse_statement(&self, sql: &str) -> PlanResult<Statement> {
        let mut statements = self.parse(sql)?;

        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(PlanError::ParseError {
                message: "No statements found".to_string(),
            }),
            n => Err(PlanError::ParseError {
                message: format!("Expected a single statement, found {n}"),
            }),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new(SqlDialect::default(), 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_str() {
        assert_eq!(SqlDialect::from_str("MySQL").unwrap(), SqlDialect::Mysql);
        assert_eq!(SqlDialect::from_str("postgresql").unwrap(), SqlDialect::Postgres);
        let err = SqlDialect::from_str("oracle").unwrap_err();
        assert!(err.contains("mysql, postgres, generic"), "error was: {err}");
    }

    #[test]
    fn parse_single_statement() {
        let parser = SqlParser::default();
        let stmt = parser.parse_statement("SELECT a FROM t WHERE id = 1").unwrap();
        assert_eq!(stmt.to_string(), "SELECT a FROM t WHERE id = 1");

        let err = parser.parse_statement("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("found 2"));

        assert!(matches!(
            parser.parse_statement("SELEC nothing"),
            Err(PlanError::ParseError { .. })
        ));
    }

    #[test]
    fn recursion_limit_guards_deep_nesting() {
        let parser = SqlParser::new(SqlDialect::Mysql, 8);
        let depth = 40;
        let sql = format!(
            "SELECT a FROM t WHERE {}id = 1{}",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        assert!(matches!(
            parser.parse_statement(&sql),
            Err(PlanError::ParseError { .. })
        ));

        let shallow = SqlParser::new(SqlDialect::Mysql, 64);
        assert!(shallow.parse_statement("SELECT a FROM t WHERE ((id = 1))").is_ok());
    }
}
