mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("🚀 fepflow CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    let command_result = dispatch(cli.command);

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    command_result
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Setup(args) => {
            info!("Dispatching to 'setup' command.");
            commands::setup::run(args)
        }
        Commands::Map(args) => {
            info!("Dispatching to 'map' command.");
            commands::prepare::map(args)
        }
        Commands::Hybrid(args) => {
            info!("Dispatching to 'hybrid' command.");
            commands::prepare::hybrid(args)
        }
        Commands::Assemble(args) => {
            info!("Dispatching to 'assemble' command.");
            commands::prepare::assemble_branches(args)
        }
        Commands::Solvate(args) => {
            info!("Dispatching to 'solvate' command.");
            commands::prepare::solvate(args)
        }
        Commands::Prepare(args) => {
            info!("Dispatching to 'prepare' command.");
            commands::simulate::prepare(args)
        }
        Commands::Run(args) => {
            info!("Dispatching to 'run' command.");
            commands::simulate::run(args)
        }
        Commands::Transitions(args) => {
            info!("Dispatching to 'transitions' command.");
            commands::simulate::prepare_transitions(args)
        }
        Commands::Jobs(args) => {
            info!("Dispatching to 'jobs' command.");
            commands::simulate::write_jobs(args)
        }
        Commands::Analyse(args) => {
            info!("Dispatching to 'analyse' command.");
            commands::analyse::analyse(args)
        }
        Commands::Summary(args) => {
            info!("Dispatching to 'summary' command.");
            commands::analyse::summary(args)
        }
        Commands::Cyclize(args) => {
            info!("Dispatching to 'cyclize' command.");
            commands::cyclize::run(args)
        }
        Commands::Traj(args) => {
            info!("Dispatching to 'traj' command.");
            commands::traj::run(args)
        }
    }
}
