mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod prompt;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: config::Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let verbose = cli.verbose;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::fatal(&e, verbose > 0);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "stackshift", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: config::Config::load()?,
    };
    log::debug!("verbosity {}", ctx.verbose);

    match &cli.command {
        Command::MigrateToObjectStore(args) => commands::migrate::to_object_store(&ctx, args),
        Command::MigrateToHosted(args) => commands::migrate::to_hosted(&ctx, args),
        Command::Init(args) => commands::init::run(&ctx, args),
        Command::LoginObjectStore(args) => commands::login::run(&ctx, args),
        Command::Completions { .. } => Ok(()),
    }
}
