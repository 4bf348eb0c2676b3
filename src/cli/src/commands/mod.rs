//! CLI command definitions and dispatch.

mod bake;
mod filter;
mod platforms;
mod version;

use clap::{Parser, Subcommand};
use ocibake_core::{BakeConfig, LogLevel};

/// ocibake: reproducible OCI images from variant graphs.
#[derive(Parser)]
#[command(name = "ocibake", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build the images of a plan and write them to an output directory
    Bake(bake::BakeArgs),
    /// Show the platforms each image of a plan can be built for
    Platforms(platforms::PlatformsArgs),
    /// Normalize an OR of platform filters
    Filter(filter::FilterArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Default log filter for `cli`, from its configuration file if it has one.
///
/// An unreadable file falls back to `warn`; the command reports the error.
pub fn log_filter(cli: &Cli) -> String {
    let level = match &cli.command {
        Command::Bake(args) => args.config.as_deref().and_then(|path| BakeConfig::from_file(path).ok()),
        _ => None,
    }
    .map(|config| config.log_level)
    .unwrap_or(LogLevel::Warn);
    level.as_str().to_string()
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Bake(args) => bake::execute(args).await,
        Command::Platforms(args) => platforms::execute(args).await,
        Command::Filter(args) => filter::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_bake_command() {
        let cli = Cli::try_parse_from([
            "ocibake",
            "bake",
            "plan.json",
            "-o",
            "out",
            "--format",
            "registry",
            "--platform",
            "linux,amd64 | linux,arm64",
        ])
        .unwrap();
        match cli.command {
            Command::Bake(args) => {
                assert_eq!(args.plan.to_str(), Some("plan.json"));
                assert_eq!(args.output.to_str(), Some("out"));
                assert_eq!(args.format.as_deref(), Some("registry"));
                assert_eq!(args.platform.as_deref(), Some("linux,amd64 | linux,arm64"));
                assert!(!args.docker_manifest);
            }
            _ => panic!("expected bake"),
        }
    }

    #[test]
    fn test_bake_requires_output() {
        assert!(Cli::try_parse_from(["ocibake", "bake", "plan.json"]).is_err());
    }

    #[test]
    fn test_filter_requires_argument() {
        assert!(Cli::try_parse_from(["ocibake", "filter"]).is_err());
    }

    #[test]
    fn test_log_filter_default() {
        let cli = Cli::try_parse_from(["ocibake", "filter", "@linux"]).unwrap();
        assert_eq!(log_filter(&cli), "warn");
    }

    #[test]
    fn test_log_filter_from_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ocibake.yaml");
        std::fs::write(&path, "log_level: debug\n").unwrap();
        let cli = Cli::try_parse_from([
            "ocibake",
            "bake",
            "plan.json",
            "-o",
            "out",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(log_filter(&cli), "debug");
    }
}
