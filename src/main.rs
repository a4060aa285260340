use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use uniquery::adapter::{ConnectionDescriptor, SqlCredentials};
use uniquery::ast::{sparql, sql, Query, SqlDialect};
use uniquery::config::GatewayConfig;
use uniquery::service::QueryService;

/// A datastore-agnostic query gateway
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Use a saved connection from the config file
    #[arg(long, global = true)]
    connection: Option<String>,

    /// Backend type (postgresql, mysql, sparql, null)
    #[arg(long = "type", global = true)]
    backend_type: Option<String>,

    /// Backend host, host:port, or endpoint URL
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a query file to dialect text without executing it
    Compile {
        #[arg(long, value_enum, default_value_t = DialectArg::Postgresql)]
        dialect: DialectArg,
        query: PathBuf,
    },
    /// Execute a query file against the selected connection
    Execute { query: PathBuf },
    /// List databases
    Databases,
    /// List tables in a database
    Tables { database: String },
    /// List field names in a table
    Fields { database: String, table: String },
    /// List canonical field types in a table
    FieldTypes { database: String, table: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Mysql,
    Postgresql,
    Sparql,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = GatewayConfig::load()?;

    if let Command::Compile { dialect, query } = &cli.command {
        let query = load_query(query)?;
        let text = match dialect {
            DialectArg::Mysql => sql::compile(&query, SqlDialect::Mysql),
            DialectArg::Postgresql => sql::compile(&query, SqlDialect::Postgresql),
            DialectArg::Sparql => Some(sparql::compile(&query)),
        };
        match text {
            Some(text) => println!("{}", text),
            None => anyhow::bail!("query could not be compiled for this dialect"),
        }
        return Ok(());
    }

    let (descriptor, credentials) = resolve_connection(&cli, &config)?;
    let service = QueryService::with_default_backends(credentials)?
        .query_timeout(Duration::from_secs(config.query_timeout_secs));

    match cli.command {
        Command::Compile { .. } => unreachable!("handled above"),
        Command::Execute { query } => {
            let query = load_query(&query)?;
            let result = service.execute(&descriptor, &query).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Databases => {
            for database in service.list_databases(&descriptor).await? {
                println!("{}", database);
            }
        }
        Command::Tables { database } => {
            for table in service.list_tables(&descriptor, &database).await? {
                println!("{}", table);
            }
        }
        Command::Fields { database, table } => {
            for field in service.list_fields(&descriptor, &database, &table).await? {
                println!("{}", field);
            }
        }
        Command::FieldTypes { database, table } => {
            for pair in service
                .list_field_types(&descriptor, &database, &table)
                .await?
            {
                println!("{}: {}", pair.field, pair.field_type);
            }
        }
    }

    Ok(())
}

fn load_query(path: &Path) -> Result<Query> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read query file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse query file {}", path.display()))
}

fn resolve_connection(
    cli: &Cli,
    config: &GatewayConfig,
) -> Result<(ConnectionDescriptor, SqlCredentials)> {
    if let Some(name) = &cli.connection {
        let settings = config
            .find_connection(name)
            .with_context(|| format!("no saved connection named {:?}", name))?;
        let mut credentials = settings.credentials();
        if credentials.password.is_empty() {
            if let Ok(password) = std::env::var("UNIQUERY_PASSWORD") {
                credentials.password = password;
            }
        }
        return Ok((settings.descriptor(), credentials));
    }

    let backend_type = cli
        .backend_type
        .clone()
        .context("--type is required unless --connection names a saved connection")?;
    let host = cli
        .host
        .clone()
        .context("--host is required unless --connection names a saved connection")?;
    let credentials = SqlCredentials {
        username: std::env::var("UNIQUERY_USERNAME").unwrap_or_default(),
        password: std::env::var("UNIQUERY_PASSWORD").unwrap_or_default(),
    };
    Ok((ConnectionDescriptor::new(backend_type, host), credentials))
}
