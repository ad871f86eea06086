use clap::Parser;

use fsevents_bridge::cli::commands::{config, watch};
use fsevents_bridge::cli::{Cli, Commands};
use fsevents_bridge::{Settings, logging};

fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("Using default configuration.");
            Settings::default()
        }
    };
    if cli.verbose {
        settings.logging.default = "debug".to_string();
    }

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Watch(args) => {
            if let Err(e) = watch::run_watch(args, &settings) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Config { paths } => config::run_config(&settings, paths),
    }
}
