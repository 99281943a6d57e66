//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::person::SafetyStatus;
use crate::session::SessionType;

/// Activate command arguments.
#[derive(Debug, Args)]
pub struct ActivateCommand {
    /// Kind of muster
    #[arg(value_enum, default_value = "drill")]
    pub kind: SessionTypeArg,

    /// Who is activating the muster
    #[arg(short, long, default_value = "operator")]
    pub by: String,
}

/// Deactivate command arguments.
#[derive(Debug, Args)]
pub struct DeactivateCommand {
    /// Skip the confirmation prompt when people are still missing
    #[arg(short, long)]
    pub yes: bool,
}

/// Mark-safe command arguments.
#[derive(Debug, Args)]
pub struct SafeCommand {
    /// Person id
    pub person: String,

    /// Zone whose muster point the person reached
    pub zone: String,
}

/// Mark-missing command arguments.
#[derive(Debug, Args)]
pub struct MissingCommand {
    /// Person id
    pub person: String,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// People listing arguments.
#[derive(Debug, Args)]
pub struct PeopleCommand {
    /// Only people last seen in this zone
    #[arg(short, long)]
    pub zone: Option<String>,

    /// Only people with this status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,

    /// Search name, company or badge number
    #[arg(long)]
    pub search: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Roster management commands.
#[derive(Debug, Subcommand)]
pub enum RosterCommand {
    /// Replace the roster from JSON exports of the visitor log and staff directory
    Import {
        /// JSON array of visitor records
        #[arg(long, value_name = "FILE")]
        visitors: Option<PathBuf>,

        /// JSON array of staff records
        #[arg(long, value_name = "FILE")]
        staff: Option<PathBuf>,
    },
}

/// Announcement arguments.
#[derive(Debug, Args)]
pub struct AnnounceCommand {
    /// Message to send
    pub message: String,

    /// Only send to people not yet confirmed safe
    #[arg(short, long)]
    pub unaccounted: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Session type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionTypeArg {
    /// Practice muster with a countdown
    Drill,
    /// Real emergency
    Actual,
}

impl From<SessionTypeArg> for SessionType {
    fn from(arg: SessionTypeArg) -> Self {
        match arg {
            SessionTypeArg::Drill => Self::Drill,
            SessionTypeArg::Actual => Self::Actual,
        }
    }
}

/// Safety status argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Confirmed safe
    Safe,
    /// Reported missing
    Missing,
    /// Not yet accounted for
    Unknown,
}

impl From<StatusArg> for SafetyStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Safe => Self::Safe,
            StatusArg::Missing => Self::Missing,
            StatusArg::Unknown => Self::Unknown,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_type_arg_conversion() {
        assert_eq!(SessionType::from(SessionTypeArg::Drill), SessionType::Drill);
        assert_eq!(SessionType::from(SessionTypeArg::Actual), SessionType::Actual);
    }

    #[test]
    fn test_status_arg_conversion() {
        assert_eq!(SafetyStatus::from(StatusArg::Safe), SafetyStatus::Safe);
        assert_eq!(SafetyStatus::from(StatusArg::Missing), SafetyStatus::Missing);
        assert_eq!(SafetyStatus::from(StatusArg::Unknown), SafetyStatus::Unknown);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_people_command_debug() {
        let cmd = PeopleCommand {
            zone: Some("yard".to_string()),
            status: Some(StatusArg::Missing),
            search: None,
            format: OutputFormat::Json,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("yard"));
        assert!(debug_str.contains("Missing"));
    }
}
