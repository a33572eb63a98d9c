//! Command-line argument parsing for the `testbench` binary.

use crate::config::{ClientOptions, Config, ConnectionConfig};
use crate::db::Value;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON array of records.
    #[default]
    Json,
    /// Aligned text table.
    Table,
}

/// Query test bench records.
#[derive(Parser, Debug)]
#[command(name = "testbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Data source name (e.g., postgres://host:5432/bench or sqlite://bench.db)
    #[arg(long, value_name = "DSN", global = true)]
    pub dsn: Option<String>,

    /// Database user
    #[arg(short = 'U', long, value_name = "USER", global = true)]
    pub user: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Leave writes uncommitted instead of committing after each one
    #[arg(long, global = true)]
    pub no_autocommit: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one SQL statement
    Query {
        /// Statement text; use $1, $2, ... for parameters
        sql: String,

        /// Positional parameter value (repeatable)
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Print the merged record of a test instance
    Instance {
        /// Test instance identifier
        id: i64,
    },

    /// Print the data of one trial of a test instance
    Trial {
        /// Test instance identifier
        id: i64,

        /// Trial number
        trial: i64,
    },

    /// List device instances
    Devices {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Connection settings given on the command line only.
    pub fn connection_overrides(&self) -> ConnectionConfig {
        ConnectionConfig {
            dsn: self.dsn.clone(),
            user: self.user.clone(),
            password: None, // Passwords come from the environment or config file
        }
    }

    /// Applies command-line flags on top of the resolved client options.
    pub fn apply_client_overrides(&self, options: &mut ClientOptions) {
        if self.no_autocommit {
            options.autocommit_after_write = false;
        }
    }
}

/// Parses `--param` values into bound parameter values.
pub fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|s| Value::parse_literal(s)).collect()
}
