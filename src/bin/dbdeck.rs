//! dbdeck: database admin from the terminal
//!
//! # Usage
//!
//! ```bash
//! # Run a SQL script
//! dbdeck --database-url mysql://root@localhost/shop run schema.sql
//!
//! # Browse a table
//! dbdeck --profile prod select orders --where "status=open" --order created --desc --limit 20
//!
//! # Show the SQL a select would run, without connecting
//! dbdeck --database-url postgres://localhost/shop sql orders --search 42
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dbdeck::config::Config;
use dbdeck::prelude::*;
use dbdeck::query::build_select;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbdeck")]
#[command(version)]
#[command(about = "One admin surface over seven databases", long_about = None)]
#[command(after_help = "EXAMPLES:
    dbdeck --database-url sqlite://app.db tables
    dbdeck --profile dev describe users
    dbdeck --database-url mysql://root@localhost/shop run --stop-on-error dump.sql")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true, env = "DBDECK_DATABASE_URL")]
    database_url: Option<String>,

    /// Named connection from the config file; wins over the URL
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Config file (defaults to <config dir>/dbdeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Args)]
struct QueryArgs {
    table: String,

    /// Columns to show (default: all)
    #[arg(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Condition like `age>=18`, `name~an%` (LIKE) or `id=7`
    #[arg(short = 'w', long = "where")]
    conditions: Vec<String>,

    /// Term searched in any column that can hold it
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long)]
    order: Option<String>,

    #[arg(long, requires = "order")]
    desc: bool,

    #[arg(short, long, default_value_t = 50)]
    limit: u64,

    /// Zero-based page
    #[arg(short, long, default_value_t = 0)]
    page: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL script statement by statement
    Run {
        file: PathBuf,
        /// Halt at the first failing statement
        #[arg(long)]
        stop_on_error: bool,
        /// Per-statement timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Rows shown per result set
        #[arg(long)]
        row_cap: Option<usize>,
    },
    /// List tables and views
    Tables,
    /// Show columns, indexes, foreign keys and triggers of a table
    Describe { table: String },
    /// Browse rows of a table
    Select(QueryArgs),
    /// Print the SELECT the select command would run
    Sql(QueryArgs),
    /// List databases
    Databases,
    /// Show the execution plan of a query
    Explain { query: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DBDECK_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path).with_context(|| format!("reading {}", path.display()))?,
        None => Config::load()?,
    };
    Ok(config)
}

fn connect_options(cli: &Cli, config: &Config) -> anyhow::Result<ConnectOptions> {
    if let Some(name) = &cli.profile {
        return Ok(config.profile(name)?);
    }
    match &cli.database_url {
        Some(url) => Ok(ConnectOptions::from_url(url)?),
        None => bail!("No database. Use --database-url, --profile or set DBDECK_DATABASE_URL"),
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let options = connect_options(cli, &config)?;

    if let Commands::Sql(args) = &cli.command {
        let codec = Codec::new(options.backend);
        let built = build_select(&codec, &[], &select_query(args)?)?;
        println!("{}", built.sql.white());
        if built.skip > 0 {
            println!("{} {}", "Skipped on the client:".dimmed(), built.skip.to_string().cyan());
        }
        return Ok(());
    }

    let mut session = Session::connect(&options)?;
    let result = dispatch(cli, &config, &mut session);
    if let Err(err) = session.close() {
        tracing::debug!(error = %err, "close");
    }
    result
}

fn dispatch(cli: &Cli, config: &Config, session: &mut Session) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run {
            file,
            stop_on_error,
            timeout,
            row_cap,
        } => {
            let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let mut options = config.script.to_options();
            options.stop_on_error |= *stop_on_error;
            if let Some(secs) = timeout {
                options.timeout = Some(Duration::from_secs(*secs));
            }
            if let Some(cap) = row_cap {
                options.row_cap = *cap;
            }
            let mut printer = ScriptPrinter { format: cli.format };
            let report = session.run_script(&text, &options, &mut printer)?;
            println!();
            let summary = format!(
                "{} statement(s), {} failed in {:.2?}",
                report.statements, report.failed, report.elapsed
            );
            if report.is_success() {
                println!("{} {}", "✓".green(), summary);
            } else {
                println!("{} {}", "✗".red(), summary);
                bail!("{} statement(s) failed", report.failed);
            }
        }
        Commands::Tables => {
            let tables = session.list_tables();
            if tables.is_empty() {
                println!("{}", "(no tables)".dimmed());
            }
            for table in tables {
                let kind = if table.kind.is_view() { "view" } else { "table" };
                let rows = table.rows.map(|n| format!("~{} rows", n)).unwrap_or_default();
                println!("{:40} {:6} {}", table.name.white().bold(), kind.dimmed(), rows.cyan());
            }
        }
        Commands::Describe { table } => describe(session, table),
        Commands::Select(args) => {
            let mut cursor = session.select(&select_query(args)?)?;
            print_rows(cursor.as_mut(), cli.format)?;
        }
        Commands::Sql(_) => {}
        Commands::Databases => {
            for name in session.databases() {
                let marker = if session.current_database() == Some(name.as_str()) { "*" } else { " " };
                println!("{} {}", marker.green(), name.white());
            }
        }
        Commands::Explain { query } => {
            let rows = session.explain(query)?;
            print_row_list(&rows, cli.format);
        }
    }
    Ok(())
}

/// `col<op>value` from the command line.
fn parse_condition(text: &str) -> anyhow::Result<Predicate> {
    const OPERATORS: &[(&str, Operator)] = &[
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("!=", Operator::Ne),
        ("~", Operator::Like),
        ("=", Operator::Eq),
        ("<", Operator::Lt),
        (">", Operator::Gt),
    ];
    for (symbol, op) in OPERATORS {
        if let Some((column, value)) = text.split_once(symbol) {
            let column = column.trim();
            if column.is_empty() {
                break;
            }
            return Ok(Predicate::new(column, *op, value.trim()));
        }
    }
    bail!("Cannot read condition '{}'; expected something like id=7", text)
}

fn select_query(args: &QueryArgs) -> anyhow::Result<SelectQuery> {
    let mut query = SelectQuery::new(&args.table)
        .columns(args.columns.iter().map(String::as_str))
        .limit(args.limit)
        .page(args.page);
    for condition in &args.conditions {
        query = query.filter(parse_condition(condition)?);
    }
    if let Some(term) = &args.search {
        query = query.filter(Predicate::any(Operator::LikeContains, term));
    }
    if let Some(column) = &args.order {
        query = query.order_by(column, args.desc);
    }
    Ok(query)
}

fn describe(session: &mut Session, table: &str) {
    let columns = session.columns(table);
    if columns.is_empty() {
        println!("{} {}", "No such table:".yellow(), table);
        return;
    }
    println!("{}", table.cyan().bold());
    for column in &columns {
        let mut flags = Vec::new();
        if column.primary {
            flags.push("PK".to_string());
        }
        if column.auto_increment {
            flags.push("auto".to_string());
        }
        if !column.nullable {
            flags.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            flags.push(format!("DEFAULT {}", default));
        }
        println!(
            "  {:30} {:24} {}",
            column.name.white(),
            column.raw_type.yellow(),
            flags.join(" ").dimmed()
        );
    }

    let indexes = session.indexes(table);
    if !indexes.is_empty() {
        println!("{}", "Indexes".green().bold());
        for index in indexes {
            println!("  {:10} {} ({})", index.kind.to_string().cyan(), index.name, index.column_names().join(", "));
        }
    }

    let keys = session.foreign_keys(table);
    if !keys.is_empty() {
        println!("{}", "Foreign keys".green().bold());
        for key in keys {
            println!(
                "  {} ({}) → {}({}) ON DELETE {} ON UPDATE {}",
                key.name,
                key.source.join(", "),
                key.target_table.white(),
                key.target.join(", "),
                key.on_delete,
                key.on_update
            );
        }
    }

    let triggers = session.triggers(table);
    if !triggers.is_empty() {
        println!("{}", "Triggers".green().bold());
        for trigger in triggers {
            println!("  {} {:?} {:?}", trigger.name, trigger.timing, trigger.events);
        }
    }
}

struct ScriptPrinter {
    format: OutputFormat,
}

impl ScriptObserver for ScriptPrinter {
    fn on_statement(&mut self, index: usize, sql: &str) {
        println!("{} {}", format!("[{}]", index + 1).dimmed(), sql.white());
    }

    fn on_result(&mut self, _index: usize, outcome: StatementOutcome<'_>, elapsed: Duration) {
        match outcome {
            StatementOutcome::Affected(n) => {
                println!("{} {} row(s) affected ({:.2?})", "✓".green(), n, elapsed);
            }
            StatementOutcome::Rows(cursor) => {
                if let Err(e) = print_rows(cursor, self.format) {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
            }
        }
    }

    fn on_error(&mut self, _index: usize, error: &Error) {
        eprintln!("{} {}", "✗".red().bold(), error.to_string().red());
    }
}

fn print_rows(cursor: &mut dyn ResultCursor, format: OutputFormat) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.fetch_assoc()? {
        rows.push(row);
    }
    if rows.is_empty() {
        let names = cursor.column_names()?;
        if !names.is_empty() {
            println!("{}", names.join(" │ ").white().bold());
        }
    }
    print_row_list(&rows, format);
    Ok(())
}

fn print_row_list(rows: &[Row], format: OutputFormat) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            let objects: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(name, value)| (name.to_string(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>()
                        .into()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns = rows[0].names();
            let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
            for row in rows {
                for (i, value) in row.values().iter().enumerate() {
                    if let Some(w) = widths.get_mut(i) {
                        *w = (*w).max(value.to_string().chars().count());
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in rows {
                let cells: Vec<String> = row
                    .values()
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| {
                        let text = format!("{:width$}", v.to_string(), width = *w);
                        if v.is_null() { text.dimmed().to_string() } else { text }
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
}
