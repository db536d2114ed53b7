mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global flags shared by every command
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

/// `-q` wins over any number of `-v`
fn log_level(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Error;
    }
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose, cli.quiet))
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };

    match cli.command {
        Command::Apply(args) => commands::declarative::apply(
            &ctx,
            args.target.as_deref(),
            args.dry_run,
            args.yes,
        ),
        Command::Diff(args) => commands::declarative::diff(&ctx, args.target.as_deref()),
        Command::Status(args) => commands::declarative::status(&ctx, args.target.as_deref()),
        Command::Validate => commands::declarative::validate(&ctx),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "sensuform", &mut io::stdout());
            Ok(())
        }
    }
}
