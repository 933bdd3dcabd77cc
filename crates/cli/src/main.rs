mod commands;

use crate::commands::check_config::handle_check_config;
use crate::commands::ddl::{handle_ddl, DdlArgs};
use crate::commands::diff::{handle_diff, DiffArgs};
use crate::commands::simulate::{handle_simulate, SimulateArgs};
use clap::{Parser, Subcommand};
use common::error::{source_chain, WorkerError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "engine-worker")]
pub struct Cli {
    #[arg(
        long = "config-path",
        short = 'c',
        help = "path to engine-config.yml or its directory",
        global = true
    )]
    pub config_path: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Print the change set between two database designs
    Diff(DiffArgs),
    /// Print the DDL script for a list of models
    Ddl(DdlArgs),
    /// Run a job against in-memory stores and dry-run SQL adapters
    Simulate(SimulateArgs),
    /// Validate the engine configuration
    CheckConfig,
}

fn run_cmd(func: Result<(), WorkerError>) {
    if let Err(e) = func {
        eprintln!("Error: {}", e);
        let chain = source_chain(&e);
        if !chain.is_empty() {
            eprintln!("{chain}");
        }
        std::process::exit(1);
    }
}

fn main() {
    logging::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Cmd::Diff(args) => run_cmd(handle_diff(&args)),
        Cmd::Ddl(args) => run_cmd(handle_ddl(&args)),
        Cmd::Simulate(args) => run_cmd(handle_simulate(&args, cli.config_path)),
        Cmd::CheckConfig => run_cmd(handle_check_config(cli.config_path)),
    }
}
