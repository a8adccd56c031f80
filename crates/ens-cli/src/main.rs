use clap::Parser;
use ens_cli::cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

use crate::commands::{attribute, config, curves, detect, estimate, hierarchy, overlaps};

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Attribute(args) => attribute::handle(args),
        Commands::Detect(args) => detect::handle(args),
        Commands::Curves(args) => curves::handle(args),
        Commands::Estimate(args) => estimate::handle(args),
        Commands::Overlaps { incidents, json } => overlaps::handle(incidents, *json),
        Commands::Hierarchy { assets, json } => hierarchy::handle(assets, *json),
        Commands::Config { command } => config::handle(command),
    };

    if let Err(err) = result {
        error!("{err:?}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
