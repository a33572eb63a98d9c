//! testbench - query test bench records from the command line.

use anyhow::{Context, Result};
use testbench_db::cli::{parse_params, Cli, Command, OutputFormat};
use testbench_db::config::{ClientOptions, Config, ConnectionConfig};
use testbench_db::db;
use testbench_db::error::TestbenchError;
use testbench_db::logging;
use testbench_db::query::{QueryExecutor, Record, Table};
use testbench_db::records::RecordAssembler;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<TestbenchError>() {
            Some(inner) => error!("{}: {:#}", inner.category(), e),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    // Precedence: CLI > environment > config file
    config.apply_env_overrides();
    config.database.merge(&cli.connection_overrides());
    cli.apply_client_overrides(&mut config.client);

    let connection = config.database;
    let options = config.client;
    if connection.dsn.is_none() {
        return Err(TestbenchError::config(
            "No database configured. Pass --dsn, set TESTBENCH_DSN, or add [database] dsn to the config file",
        )
        .into());
    }

    match cli.command {
        Command::Query {
            sql,
            params,
            format,
        } => run_query(&connection, &options, &sql, &params, format).await,
        Command::Instance { id } => {
            let record = RecordAssembler::new(connection, options)
                .test_instance_record(id)
                .await
                .with_context(|| format!("Failed to assemble test instance {id}"))?;
            print_json(&record)
        }
        Command::Trial { id, trial } => {
            let records = RecordAssembler::new(connection, options)
                .data_for_trial(id, trial)
                .await
                .with_context(|| format!("Failed to read trial {trial} of test instance {id}"))?;
            print_json(&records)
        }
        Command::Devices { format } => {
            let table = RecordAssembler::new(connection, options)
                .device_instances()
                .await
                .context("Failed to list device instances")?;
            print_table(table, format)
        }
    }
}

async fn run_query(
    connection: &ConnectionConfig,
    options: &ClientOptions,
    sql: &str,
    raw_params: &[String],
    format: OutputFormat,
) -> Result<()> {
    info!("Connecting to {}", connection.display_string());
    let session = db::connect(connection, options).await?;

    let params = parse_params(raw_params);
    let outcome = QueryExecutor::new(session.as_ref(), options)
        .execute(sql, &params)
        .await;

    if let Err(e) = session.close().await {
        warn!("Closing session failed: {e}");
    }

    let outcome = outcome.context("Statement failed")?;
    print_table(outcome.into_table(), format)
}

fn print_table(table: Table, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{table}");
            Ok(())
        }
        OutputFormat::Json => {
            let records: Vec<Record> = table.to_records();
            print_json(&records)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}
