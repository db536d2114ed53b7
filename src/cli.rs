use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sensuform")]
#[command(version)]
#[command(about = "Declarative Sensu Go configuration through sensuctl", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: config.toml or config.json in the config dir)
    #[arg(short, long, global = true, env = "SENSUFORM_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make Sensu match the configuration
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff(TargetArgs),

    /// Show discovered objects and whether they are declared
    Status(TargetArgs),

    /// Check the configuration without calling sensuctl
    Validate,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Limit to a kind or kind.name (e.g. handler, handler.slack, license)
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to a kind or kind.name (e.g. handler, handler.slack, license)
    pub target: Option<String>,

    /// Show what would be done without calling create or delete
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
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
    fn test_parse_apply() {
        let cli = Cli::parse_from(["sensuform", "-vv", "apply", "handler.slack", "--dry-run", "-y"]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("handler.slack"));
        assert!(args.dry_run);
        assert!(args.yes);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["sensuform", "diff", "--config", "/etc/sensuform.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sensuform.toml")));
        assert!(matches!(cli.command, Command::Diff(TargetArgs { target: None })));
    }
}
