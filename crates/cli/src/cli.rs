//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::MatcherPreset;
use std::path::PathBuf;

/// Sync Sim - drive simulated depth-camera streams through the frame synchronizer
#[derive(Parser, Debug)]
#[command(
    name = "sync-sim",
    author,
    version,
    about = "Multi-stream frame synchronizer simulator",
    long_about = "Replays a simulated capture session through the frame synchronizer.\n\n\
                  Every configured stream is produced by a mock source, matched by the \n\
                  device presets and reported as composite / unmatched frame statistics."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SYNC_SIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SYNC_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate a session through the synchronizer
    Run(RunArgs),

    /// Validate a session file without running
    Validate(ValidateArgs),

    /// Display session information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to session file (TOML or JSON)
    #[arg(short, long, default_value = "session.toml", env = "SYNC_SIM_CONFIG")]
    pub config: PathBuf,

    /// How frames are produced
    #[arg(long, value_enum, default_value = "replay", env = "SYNC_SIM_MODE")]
    pub mode: SourceMode,

    /// Playback speed of threaded sources (0 = as fast as possible)
    #[arg(long, default_value = "1.0", env = "SYNC_SIM_SPEED")]
    pub speed: f64,

    /// Override the preset from the session file
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,

    /// Override the staleness budget (ms)
    #[arg(long)]
    pub staleness_ms: Option<f64>,

    /// Print the first N delivered frames
    #[arg(long, default_value = "0")]
    pub show_frames: usize,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "SYNC_SIM_TIMEOUT")]
    pub timeout: u64,

    /// Load and validate the session, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SYNC_SIM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to session file to validate
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to session file
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every stream
    #[arg(long)]
    pub streams: bool,

    /// Show the matcher sub-tree built for each device
    #[arg(long)]
    pub topology: bool,
}

/// Frame production mode
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceMode {
    /// All streams merged in timestamp order on one thread (deterministic)
    #[default]
    Replay,
    /// One producer thread per stream
    Threads,
}

/// Matcher preset
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PresetArg {
    Default,
    Di,
    DiC,
    Dlr,
    DlrC,
    Dic,
    DicC,
}

impl From<PresetArg> for MatcherPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Default => Self::Default,
            PresetArg::Di => Self::Di,
            PresetArg::DiC => Self::DiC,
            PresetArg::Dlr => Self::Dlr,
            PresetArg::DlrC => Self::DlrC,
            PresetArg::Dic => Self::Dic,
            PresetArg::DicC => Self::DicC,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "sync-sim",
            "-v",
            "run",
            "--config",
            "demo.toml",
            "--mode",
            "threads",
            "--preset",
            "di-c",
            "--speed",
            "4",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("demo.toml"));
        assert_eq!(args.mode, SourceMode::Threads);
        assert_eq!(MatcherPreset::from(args.preset.unwrap()), MatcherPreset::DiC);
        assert_eq!(args.speed, 4.0);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["sync-sim", "validate"]);
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.config, PathBuf::from("session.toml"));
        assert!(!args.json);
    }
}
