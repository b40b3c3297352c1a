//! Sheet mapper CLI.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use sheetmap_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use sheetmap_cli::commands::{run_confirm, run_history, run_map};
use sheetmap_cli::logging::{LogConfig, LogFormat, init_logging};
use sheetmap_cli::summary::{print_confirm_summary, print_history, print_map_summary};
use tracing::level_filters::LevelFilter;

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let outcome = match &cli.command {
        Command::Map(args) => run_map(args).map(|outcome| {
            print_map_summary(&outcome);
            if outcome.result.warnings.is_empty() { 0 } else { 2 }
        }),
        Command::Confirm(args) => run_confirm(args).map(|outcome| {
            print_confirm_summary(&outcome);
            0
        }),
        Command::History(args) => run_history(args).map(|records| {
            print_history(&records);
            0
        }),
    };
    let exit_code = outcome.unwrap_or_else(|error| {
        eprintln!("error: {error:#}");
        1
    });
    std::process::exit(exit_code);
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
