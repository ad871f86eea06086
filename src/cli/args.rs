//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Filesystem event streams on a run loop
#[derive(Parser, Debug)]
#[command(
    name = "fsevents-bridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch paths and print batched filesystem events",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch paths and print each delivered batch
    #[command(
        about = "Run a loop on this thread and print event batches",
        after_help = "Examples:\n  fsevents-bridge watch src\n  fsevents-bridge watch --file-events --json src docs\n  fsevents-bridge watch --max-batches 1 ."
    )]
    Watch(WatchArgs),

    /// Show effective configuration
    #[command(about = "Display active settings as TOML")]
    Config {
        /// Also print where the user and project settings files are looked up
        #[arg(long)]
        paths: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Paths to watch (recursively)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Coalescing window in milliseconds (overrides config)
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Report individual files instead of their directories
    #[arg(long)]
    pub file_events: bool,

    /// Report changes to the watched roots themselves
    #[arg(long)]
    pub watch_root: bool,

    /// Print one JSON object per batch
    #[arg(long)]
    pub json: bool,

    /// Stop after this many batches
    #[arg(long)]
    pub max_batches: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from([
            "fsevents-bridge",
            "watch",
            "--latency-ms",
            "50",
            "--json",
            "--max-batches",
            "3",
            "src",
            "docs",
        ])
        .unwrap();

        let Commands::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.paths, [PathBuf::from("src"), PathBuf::from("docs")]);
        assert_eq!(args.latency_ms, Some(50));
        assert!(args.json);
        assert_eq!(args.max_batches, Some(3));
    }

    #[test]
    fn test_watch_requires_paths() {
        assert!(Cli::try_parse_from(["fsevents-bridge", "watch"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["fsevents-bridge", "config", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Config { paths: false }));
    }
}
