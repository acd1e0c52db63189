//! Command-line interface for riderecorder.
//!
//! This module provides the CLI structure used by the `riderec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExportCommand, OutputFormat, RecordKindArg, RecoverCommand, SessionsCommand,
    ShowCommand, StatusCommand,
};

/// riderec - Record your rides, headless
///
/// A recorder for GPS position and ambient environment data during a
/// bicycle ride, controlled with a joystick and an LED matrix, plus
/// commands to inspect and export the recorded sessions.
#[derive(Debug, Parser)]
#[command(name = "riderec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the recorder until the process is terminated
    Record,

    /// List recorded sessions
    Sessions(SessionsCommand),

    /// Show the records of one session
    Show(ShowCommand),

    /// Export a sealed session as GPX
    Export(ExportCommand),

    /// Seal sessions left open by an unclean shutdown
    Recover(RecoverCommand),

    /// Show storage status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "riderec");
    }

    #[test]
    fn test_cli_verify() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_quiet() {
        let cli = Cli {
            config: None,
            verbose: 0,
            quiet: true,
            command: Command::Record,
        };
        assert_eq!(cli.verbosity(), crate::logging::Verbosity::Quiet);
    }

    #[test]
    fn test_verbosity_levels() {
        for (verbose, expected) in [
            (0, crate::logging::Verbosity::Normal),
            (1, crate::logging::Verbosity::Verbose),
            (2, crate::logging::Verbosity::Trace),
            (5, crate::logging::Verbosity::Trace),
        ] {
            let cli = Cli {
                config: None,
                verbose,
                quiet: false,
                command: Command::Record,
            };
            assert_eq!(cli.verbosity(), expected);
        }
    }

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from(["riderec", "record"]).unwrap();
        assert!(matches!(cli.command, Command::Record));
    }

    #[test]
    fn test_parse_sessions_json() {
        let cli = Cli::try_parse_from(["riderec", "sessions", "--json"]).unwrap();
        match cli.command {
            Command::Sessions(cmd) => assert!(cmd.json),
            other => panic!("expected sessions, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_show_with_filters() {
        let cli = Cli::try_parse_from([
            "riderec",
            "show",
            "20240601-073000",
            "--kind",
            "waypoint",
            "--limit",
            "5",
        ])
        .unwrap();
        match cli.command {
            Command::Show(cmd) => {
                assert_eq!(cmd.session, "20240601-073000");
                assert_eq!(cmd.kind, Some(RecordKindArg::Waypoint));
                assert_eq!(cmd.limit, Some(5));
            }
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_export_with_output() {
        let cli =
            Cli::try_parse_from(["riderec", "export", "20240601-073000", "-o", "ride.gpx"])
                .unwrap();
        match cli.command {
            Command::Export(cmd) => {
                assert_eq!(cmd.session, "20240601-073000");
                assert_eq!(cmd.output, Some(PathBuf::from("ride.gpx")));
            }
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_with_config() {
        let cli =
            Cli::try_parse_from(["riderec", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["riderec", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: None })
        ));
    }
}
