//! CLI argument definitions for the sheet mapper.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use sheetmap_map::EngineConfig;
use sheetmap_model::ConfidenceTier;

#[derive(Parser)]
#[command(
    name = "sheetmap",
    version,
    about = "Identify the data sheet in a workbook and map its columns to a target table",
    long_about = "Identify the data sheet in a workbook and map its columns to a target table.\n\n\
                  Remembered mappings are reused first; an OpenAI-compatible model resolves\n\
                  the rest unless --offline is given. Confirmed results feed the history."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Select a sheet and propose column mappings.
    Map(MapArgs),

    /// Record the resolved mappings of a reviewed result in history.
    Confirm(ConfirmArgs),

    /// List remembered mappings.
    History(HistoryArgs),
}

#[derive(Parser)]
pub struct MapArgs {
    /// Workbook JSON: sheets with headers, sample values and row counts.
    #[arg(long = "workbook", value_name = "PATH")]
    pub workbook: PathBuf,

    /// Target schema JSON (default: the built-in accounts table).
    #[arg(long = "schema", value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// History file (default: in-memory, nothing remembered).
    #[arg(long = "history", value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Engine configuration JSON. Overrides --profile.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Built-in configuration preset.
    #[arg(long = "profile", value_enum, default_value = "default")]
    pub profile: ProfileArg,

    /// Map this sheet instead of selecting one.
    #[arg(long = "sheet", value_name = "NAME")]
    pub sheet: Option<String>,

    /// Never call the language model.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Write the mapping result JSON here for review and `confirm`.
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ConfirmArgs {
    /// Mapping result JSON written by `map --output`.
    #[arg(long = "result", value_name = "PATH")]
    pub result: PathBuf,

    /// History file to update (created if missing).
    #[arg(long = "history", value_name = "PATH")]
    pub history: PathBuf,

    /// Engine configuration JSON (for normalization settings).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only record mappings at or above this tier.
    #[arg(long = "min-tier", value_enum)]
    pub min_tier: Option<TierArg>,

    /// Target schema JSON, used with --min-tier (default: the built-in accounts table).
    #[arg(long = "schema", value_name = "PATH")]
    pub schema: Option<PathBuf>,
}

#[derive(Parser)]
pub struct HistoryArgs {
    /// History file to read.
    #[arg(long = "history", value_name = "PATH")]
    pub history: PathBuf,

    /// Only show records for this target table.
    #[arg(long = "table", value_name = "TABLE")]
    pub table: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Default,
    Strict,
    Relaxed,
}

impl ProfileArg {
    pub fn engine_config(self) -> EngineConfig {
        match self {
            Self::Default => EngineConfig::default(),
            Self::Strict => EngineConfig::strict(),
            Self::Relaxed => EngineConfig::relaxed(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    High,
    Medium,
    Low,
}

impl From<TierArg> for ConfidenceTier {
    fn from(value: TierArg) -> Self {
        match value {
            TierArg::High => Self::High,
            TierArg::Medium => Self::Medium,
            TierArg::Low => Self::Low,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
