use crate::commands::Command;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagpub_release::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "tagpub")]
#[command(about = "Publish tagged releases to a package registry with trusted publishing")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "info",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    #[arg(long, global = true, help = "Output logs and results in JSON format")]
    pub json: bool,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "TAGPUB_CONFIG",
        help = "Path to the release configuration",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run the release pipeline for a pushed ref")]
    Run {
        #[arg(
            long = "ref",
            help = "Fully-qualified ref (e.g. refs/tags/v1.2.3); defaults to the GitHub Actions ref"
        )]
        reference: Option<String>,
        #[arg(
            long,
            env = "GITHUB_REPOSITORY",
            help = "Repository asserted in identity claims (owner/name)"
        )]
        repository: Option<String>,
        #[arg(
            long,
            env = "TAGPUB_ENVIRONMENT",
            help = "Override the environment the run is bound to"
        )]
        environment: Option<String>,
        #[arg(long, help = "Build but do not request a credential or publish")]
        dry_run: bool,
    },
    #[command(about = "Check whether a ref would start a release")]
    CheckTrigger {
        #[arg(long = "ref", help = "Fully-qualified ref (e.g. refs/tags/v1.2.3)")]
        reference: String,
    },
    #[command(about = "Print the resolved permission scope of an environment")]
    Scope {
        #[arg(help = "Environment name; defaults to the configured environment")]
        environment: Option<String>,
    },
    #[command(about = "Show version information")]
    Version,
}

impl Cli {
    /// Converts parsed arguments into the internal command.
    pub fn into_command(self) -> Command {
        let config = self.config;
        let json = self.json;
        match self.command {
            Commands::Run {
                reference,
                repository,
                environment,
                dry_run,
            } => Command::Run {
                config,
                reference,
                repository,
                environment,
                dry_run,
                json,
            },
            Commands::CheckTrigger { reference } => Command::CheckTrigger {
                config,
                reference,
                json,
            },
            Commands::Scope { environment } => Command::Scope {
                config,
                environment,
            },
            Commands::Version => Command::Version,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
