//! Command-line interface for musterpoint.
//!
//! This module provides the CLI structure for the `muster` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ActivateCommand, AnnounceCommand, ConfigCommand, DeactivateCommand, MissingCommand,
    OutputFormat, PeopleCommand, RosterCommand, SafeCommand, SessionTypeArg, StatusArg,
    StatusCommand,
};

/// muster - Emergency roll call for your site
///
/// Activate a muster, confirm people safe at their muster points, chase the
/// missing and close the session once everyone is accounted for.
#[derive(Debug, Parser)]
#[command(name = "muster")]
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
    /// Start a muster session
    Activate(ActivateCommand),

    /// End the active session
    Deactivate(DeactivateCommand),

    /// Call off the active session
    Cancel,

    /// Confirm a person safe at a zone's muster point
    Safe(SafeCommand),

    /// Report a person missing
    Missing(MissingCommand),

    /// Show the current session and headcount
    Status(StatusCommand),

    /// Show per-zone headcounts
    Zones(StatusCommand),

    /// List people on the roster
    People(PeopleCommand),

    /// Manage the roster
    #[command(subcommand)]
    Roster(RosterCommand),

    /// Show past sessions
    History(StatusCommand),

    /// Send a message to people on the roster
    Announce(AnnounceCommand),

    /// Follow the active session until it ends
    Watch,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "muster");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;

        assert_eq!(parse(&["muster", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["muster", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["muster", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["muster", "-vv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_activate_defaults_to_drill() {
        let cli = parse(&["muster", "activate"]);
        match cli.command {
            Command::Activate(cmd) => {
                assert_eq!(cmd.kind, SessionTypeArg::Drill);
                assert_eq!(cmd.by, "operator");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_activate_actual() {
        let cli = parse(&["muster", "activate", "actual", "--by", "Site Warden"]);
        match cli.command {
            Command::Activate(cmd) => {
                assert_eq!(cmd.kind, SessionTypeArg::Actual);
                assert_eq!(cmd.by, "Site Warden");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_safe() {
        let cli = parse(&["muster", "safe", "v-102", "production"]);
        match cli.command {
            Command::Safe(cmd) => {
                assert_eq!(cmd.person, "v-102");
                assert_eq!(cmd.zone, "production");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_safe_requires_zone() {
        assert!(Cli::try_parse_from(["muster", "safe", "v-102"]).is_err());
    }

    #[test]
    fn test_parse_deactivate_yes() {
        let cli = parse(&["muster", "deactivate", "--yes"]);
        assert!(matches!(cli.command, Command::Deactivate(DeactivateCommand { yes: true })));
    }

    #[test]
    fn test_parse_people_filters() {
        let cli = parse(&[
            "muster", "people", "--zone", "yard", "--status", "missing", "-f", "json",
        ]);
        match cli.command {
            Command::People(cmd) => {
                assert_eq!(cmd.zone.as_deref(), Some("yard"));
                assert_eq!(cmd.status, Some(StatusArg::Missing));
                assert_eq!(cmd.format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_roster_import() {
        let cli = parse(&["muster", "roster", "import", "--visitors", "visitors.json"]);
        match cli.command {
            Command::Roster(RosterCommand::Import { visitors, staff }) => {
                assert_eq!(visitors, Some(PathBuf::from("visitors.json")));
                assert!(staff.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_announce_unaccounted() {
        let cli = parse(&["muster", "announce", "Report in", "--unaccounted"]);
        match cli.command {
            Command::Announce(cmd) => {
                assert_eq!(cmd.message, "Report in");
                assert!(cmd.unaccounted);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["muster", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
