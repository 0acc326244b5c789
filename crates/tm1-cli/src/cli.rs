//! Argument parsing and command execution for the `tm1` binary.

use std::{
    env,
    error::Error,
    ffi::OsString,
    fs::File,
    io::{BufReader, Write},
    path::PathBuf,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use serde_json::to_writer_pretty;
use tm1_cells::prelude::*;
use tm1_core::constants::DEFAULT_PRECISION;
use tm1_rest::{ConnectionConfig, HttpTransport};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{read_cells, CellRecord};

const DEFAULT_LOG_FILTER: &str = "warn,tm1_cli=info,tm1_cells=info";

/// Query and write TM1 cube cells from the command line
#[derive(Parser, Debug)]
#[command(name = "tm1", version)]
pub struct Cli {
    /// Connection settings as JSON (or env TM1_CONFIG); TM1_* variables otherwise
    #[arg(long, env = "TM1_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of `tm1`.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute MDX and print the cells as JSON records or CSV
    Mdx {
        /// MDX query
        mdx: String,
        /// Print CSV instead of JSON records
        #[arg(long)]
        csv: bool,
        /// Read from this sandbox
        #[arg(long)]
        sandbox: Option<String>,
        /// Leave out zero and empty cells
        #[arg(long)]
        skip_zeros: bool,
    },
    /// Print the number of cells an MDX query returns
    Count {
        /// MDX query
        mdx: String,
        /// Read from this sandbox
        #[arg(long)]
        sandbox: Option<String>,
    },
    /// Write a JSON cell file through parallel unbound processes
    Write {
        /// Target cube
        #[arg(long)]
        cube: String,
        /// Array of {"coordinates": [...], "value": ...}
        #[arg(long)]
        file: PathBuf,
        /// Cells per chunk
        #[arg(long, default_value_t = 10_000)]
        slice_size: usize,
        /// Chunks written concurrently
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Decimal places written for numeric values
        #[arg(long, default_value_t = DEFAULT_PRECISION)]
        precision: usize,
        /// Add to the stored values instead of replacing them
        #[arg(long)]
        increment: bool,
        /// Write into this sandbox
        #[arg(long)]
        sandbox: Option<String>,
    },
}

/// Runs `command` against `cells`, printing the result to `out`.
pub fn execute<W: Write>(
    command: Command,
    cells: &CellService,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Mdx {
            mdx,
            csv,
            sandbox,
            skip_zeros,
        } => {
            let query = CellsetQuery::new()
                .skip_zeros(skip_zeros)
                .sandbox(sandbox.as_deref());
            let source = CellsetSource::Mdx(&mdx);
            if csv {
                let text = cells.execute_csv(source, &query, &CsvOptions::default())?;
                out.write_all(text.as_bytes())?;
            } else {
                let records: Vec<CellRecord> = cells
                    .execute_value_map(source, &query, false)?
                    .into_iter()
                    .map(|(coordinates, value)| CellRecord { coordinates, value })
                    .collect();
                to_writer_pretty(&mut *out, &records)?;
                writeln!(out)?;
            }
        }
        Command::Count { mdx, sandbox } => {
            let count = cells.execute_cellcount(CellsetSource::Mdx(&mdx), sandbox.as_deref())?;
            writeln!(out, "{count}")?;
        }
        Command::Write {
            cube,
            file,
            slice_size,
            workers,
            precision,
            increment,
            sandbox,
        } => {
            let values = read_cells(BufReader::new(File::open(&file)?))?;
            let count = values.len();
            let options = WriteOptions {
                increment,
                precision,
                sandbox,
                ..WriteOptions::default()
            };
            cells.write_async(&cube, values, slice_size, workers, &options)?;
            info!(cube, cells = count, "cell file written");
            writeln!(out, "wrote {count} cells to {cube}")?;
        }
    }
    Ok(())
}

fn init_logging() {
    // a second initialization (tests, embedding) keeps the first subscriber
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Execute the command-line interface with a custom argv iterator.
pub fn run_with_args<I, T>(args: I) -> Result<(), Box<dyn Error>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging();

    let config = match &cli.config {
        Some(path) => ConnectionConfig::from_json_file(path)?,
        None => ConnectionConfig::from_env()?,
    };
    info!(address = %config.address, port = config.port, "connecting");
    let transport = Arc::new(HttpTransport::connect(&config)?);
    let cells = CellService::new(transport);

    let stdout = std::io::stdout();
    execute(cli.command, &cells, &mut stdout.lock())
}

/// Runs the interface against the process arguments.
pub fn cli() -> Result<(), Box<dyn Error>> {
    run_with_args(env::args_os())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn parses_write_defaults() {
        let args = ["tm1", "write", "--cube", "Sales", "--file", "cells.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, None);
        assert_eq!(
            cli.command,
            Command::Write {
                cube: "Sales".into(),
                file: "cells.json".into(),
                slice_size: 10_000,
                workers: 4,
                precision: DEFAULT_PRECISION,
                increment: false,
                sandbox: None,
            }
        );
    }

    #[test]
    fn config_is_global() {
        let args = ["tm1", "count", "SELECT FROM [c]", "--config", "tm1.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("tm1.json")));
        assert!(matches!(cli.command, Command::Count { sandbox: None, .. }));
    }

    #[test]
    fn precision_help_speaks_of_decimals() {
        let command = Cli::command();
        let write = command.find_subcommand("write").unwrap();
        let precision = write
            .get_arguments()
            .find(|arg| arg.get_id() == "precision")
            .unwrap();
        let help = precision.get_help().map(ToString::to_string);
        assert_eq!(
            help.as_deref(),
            Some("Decimal places written for numeric values")
        );
    }

    #[test]
    fn write_requires_a_cube() {
        assert!(Cli::try_parse_from(["tm1", "write", "--file", "cells.json"]).is_err());
    }
}
