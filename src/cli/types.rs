//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "modforge")]
#[command(about = "ModForge - continuous build orchestrator for generated mods", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run continuous builds for one or more projects until Ctrl-C
    Run(RunArgs),

    /// Project management commands
    #[command(subcommand)]
    Project(ProjectCommands),

    /// List builds of a project
    Builds {
        /// Project ID
        project: i64,

        /// Show only the most recent N builds
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List stored generation and fix patterns
    Patterns {
        /// Filter by kind (generation, fix)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Project IDs to build
    #[arg(short, long = "project", required = true, num_args = 1..)]
    pub projects: Vec<i64>,

    /// Interval between build cycles, overriding the configured default
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Do not start the stalled-project watchdog
    #[arg(long)]
    pub no_watchdog: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register a new project
    Add {
        /// Project name
        name: String,

        /// Description the sources are generated from
        #[arg(short, long)]
        description: String,

        /// Mod loader (forge, fabric, quilt, architectury)
        #[arg(short, long, default_value = "forge")]
        loader: String,

        /// Target Minecraft version
        #[arg(short = 'V', long, default_value = "1.20.1")]
        minecraft_version: String,

        /// Auto-fix level (off, balanced, aggressive)
        #[arg(short, long, default_value = "balanced")]
        auto_fix: String,
    },

    /// List registered projects
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["modforge", "run", "-p", "1", "2", "--interval-ms", "5000"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.projects, vec![1, 2]);
                assert_eq!(args.interval_ms, Some(5000));
                assert!(!args.no_watchdog);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_builds_with_json() {
        let cli = Cli::parse_from(["modforge", "builds", "3", "--limit", "5", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Builds { project: 3, limit: 5 }));
    }
}
