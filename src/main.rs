use clap::Parser;
use std::io::{self, Read};
use std::path::PathBuf;

use shardplan::logging::init_logging;
use shardplan::{HashRouter, Planner, RoutePlan, ShardConfig, SqlDialect, SqlParser};

#[derive(Parser)]
#[command(name = "shardplan")]
#[command(about = "Plan shard routing for a SQL statement")]
#[command(version)]
struct Cli {
    /// Shard map JSON file (defaults to the SHARDPLAN_CONFIG environment variable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database that unqualified table names belong to
    #[arg(short, long)]
    database: String,

    /// SQL dialect (mysql, postgres, generic); overrides the shard map
    #[arg(long)]
    dialect: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long)]
    quiet: bool,

    /// Statement to plan; read from stdin when omitted
    sql: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(plan) => match serde_json::to_string_pretty(&plan) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<RoutePlan, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => ShardConfig::from_file(path)?,
        None => ShardConfig::from_env()?,
    };

    let dialect = match &cli.dialect {
        Some(name) => SqlDialect::from_str(name)?,
        None => config.planner.dialect,
    };
    let parser = SqlParser::new(dialect, config.planner.recursion_limit);

    let sql = match &cli.sql {
        Some(sql) => sql.clone(),
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    if sql.trim().is_empty() {
        return Err("no SQL statement given".into());
    }

    let router = HashRouter::new(&config);
    let plan = Planner::new(&router).plan_sql(&parser, &cli.database, &sql)?;
    Ok(plan)
}
