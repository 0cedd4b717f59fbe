//! callerinfo CLI
//!
//! Rewrites compiled classes so every SLF4J log statement carries its caller
//! location in the MDC.

mod commands;
mod logging;

use clap::{ArgAction, Parser, Subcommand};
use commands::ConfigArgs;

#[derive(Parser)]
#[command(name = "callerinfo")]
#[command(about = "Inject caller information into SLF4J log statements of compiled classes", long_about = None)]
#[command(version)]
struct Cli {
    /// More output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite all selected classes in the target directory
    Inject {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        #[command(flatten)]
        args: ConfigArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Inject { args } => commands::inject::execute(&args),
        Commands::ShowConfig { args } => commands::show_config::execute(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inject() {
        let cli = Cli::try_parse_from([
            "callerinfo",
            "-vv",
            "inject",
            "--target",
            "build/classes",
            "--level",
            "info",
            "--level",
            "WARN",
            "--no-remove",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Inject { args } => {
                assert_eq!(args.levels.len(), 2);
                assert!(args.no_remove);
            }
            Commands::ShowConfig { .. } => panic!("expected inject"),
        }
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        assert!(Cli::try_parse_from(["callerinfo", "inject", "--level", "fatal"]).is_err());
    }
}
