//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mirror package-ecosystem artifacts and their dependencies.
///
/// Stockpile walks the dependency graph of every seed listed for a channel,
/// records what it finds, and downloads the selected versions into a mirror
/// directory plus a per-run delta directory.
#[derive(Parser, Debug)]
#[command(name = "stockpile")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the JSON configuration file
    #[arg(short = 'c', long, default_value = "config.json", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover and download every configured channel
    Run {
        /// Skip delta copies for this run
        #[arg(long)]
        staging: bool,

        /// Only run the given channel (repeatable)
        #[arg(long = "channel", value_name = "ID")]
        channels: Vec<String>,
    },

    /// Permanently exclude one version from downloads
    Blacklist {
        /// Channel id
        #[arg(long)]
        channel: String,

        /// Artifact name
        #[arg(long)]
        artifact: String,

        /// Version string
        #[arg(long)]
        version: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults() {
        let args = Args::try_parse_from(["stockpile", "run"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.config, PathBuf::from("config.json"));
        match args.command {
            Command::Run { staging, channels } => {
                assert!(!staging);
                assert!(channels.is_empty());
            }
            Command::Blacklist { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["stockpile", "-vv", "run"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["stockpile", "run", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_run_selects_channels_and_staging() {
        let args = Args::try_parse_from([
            "stockpile",
            "--config",
            "/etc/stockpile.json",
            "run",
            "--staging",
            "--channel",
            "npm",
            "--channel",
            "npm-internal",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/stockpile.json"));
        match args.command {
            Command::Run { staging, channels } => {
                assert!(staging);
                assert_eq!(channels, vec!["npm", "npm-internal"]);
            }
            Command::Blacklist { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_blacklist_requires_all_fields() {
        let args = Args::try_parse_from([
            "stockpile",
            "blacklist",
            "--channel",
            "npm",
            "--artifact",
            "left-pad",
            "--version",
            "1.0.0",
        ])
        .unwrap();
        match args.command {
            Command::Blacklist {
                channel,
                artifact,
                version,
            } => {
                assert_eq!(channel, "npm");
                assert_eq!(artifact, "left-pad");
                assert_eq!(version, "1.0.0");
            }
            Command::Run { .. } => panic!("expected blacklist"),
        }

        let err = Args::try_parse_from(["stockpile", "blacklist", "--channel", "npm"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_subcommand_is_required() {
        let err = Args::try_parse_from(["stockpile"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["stockpile", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
