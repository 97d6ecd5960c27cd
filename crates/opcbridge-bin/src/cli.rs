// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Acquire values and print them as JSON lines (default)
//! - `browse`: Connect once and list the acquisition targets
//! - `validate`: Validate the configuration file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// opcbridge - OPC UA data acquisition
///
/// Connects to an OPC UA server, discovers variables under the configured
/// seed nodes and prints their values as JSON lines.
#[derive(Parser, Debug)]
#[command(
    name = "opcbridge",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "OPC UA data acquisition connector",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "opcbridge.yaml",
        env = "OPCBRIDGE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "OPCBRIDGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "OPCBRIDGE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Acquire values until interrupted
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// List the acquisition targets and server information
    Browse(BrowseArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without connecting.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Use the built-in simulated server instead of the configured endpoint
    #[arg(long, env = "OPCBRIDGE_SIMULATE")]
    pub simulate: bool,

    /// Stop after this many batches
    #[arg(short = 'n', long)]
    pub max_batches: Option<u64>,

    /// Override the read deadline (e.g. "500ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub read_timeout: Option<std::time::Duration>,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Default, Clone)]
pub struct BrowseArgs {
    /// Use the built-in simulated server instead of the configured endpoint
    #[arg(long, env = "OPCBRIDGE_SIMULATE")]
    pub simulate: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["opcbridge"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "opcbridge",
            "run",
            "--simulate",
            "-n",
            "5",
            "--read-timeout",
            "500ms",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.simulate);
        assert_eq!(args.max_batches, Some(5));
        assert_eq!(args.read_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_browse_command() {
        let cli = Cli::parse_from(["opcbridge", "browse", "-f", "json"]);
        let Some(Commands::Browse(args)) = cli.command else {
            panic!("Expected Browse command");
        };
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["opcbridge", "validate", "--show-config"]);
        let Some(Commands::Validate(args)) = cli.command else {
            panic!("Expected Validate command");
        };
        assert!(args.show_config);
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["opcbridge", "-c", "/etc/opcbridge/plant.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/opcbridge/plant.toml"));
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::parse_from(["opcbridge", "-l", "debug", "--log-format", "json"]);
        assert_eq!(cli.effective_log_level(), "debug");
        assert_eq!(cli.log_format, LogFormat::Json);

        assert_eq!(Cli::parse_from(["opcbridge", "-q"]).effective_log_level(), "warn");
        assert_eq!(Cli::parse_from(["opcbridge", "-v"]).effective_log_level(), "debug");
    }
}
