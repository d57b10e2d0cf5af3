//! gpspod - command-line client for the Suunto GPS Track Pod.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod gpx;
mod source;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gpspod")]
#[command(about = "Interact with the Suunto GPS Track Pod")]
#[command(version)]
#[command(after_help = "If opening the device fails right after plugging it \
in, wait a moment and try again; the device is slow to enumerate.")]
struct Cli {
    /// Record all USB traffic to a log file for offline replay
    /// (--record=PATH for an explicit path)
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1,
          require_equals = true, default_missing_value = "")]
    record: Option<String>,

    /// Replay a recorded session instead of talking to hardware
    #[arg(long, global = true, value_name = "PATH")]
    playback: Option<PathBuf>,

    /// Use a memory-region dump file instead of a device
    #[arg(long, global = true, value_name = "PATH")]
    fs: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Milliseconds per transport read
    #[arg(long, global = true, env = "GPSPOD_READ_TIMEOUT", default_value_t = 1000)]
    read_timeout: u64,

    /// Reply size in bytes above which to pause after a read
    #[arg(long, global = true, env = "GPSPOD_READ_SLEEP_MINSIZE")]
    read_sleep_minsize: Option<usize>,

    /// Milliseconds to pause after a large read
    #[arg(long, global = true, env = "GPSPOD_READ_SLEEP_DURATION", default_value_t = 100)]
    read_sleep_duration: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print device model, serial and versions
    Device,

    /// Print battery charge
    Status,

    /// Show or change device settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// List recorded tracks
    Tracks,

    /// Download one track and write it as GPX
    Retrieve {
        /// Track index as shown by `tracks`
        index: usize,

        /// Output path (default: track_<start time>.gpx)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Do not start a new segment at each lap
        #[arg(long)]
        no_lap_splits_segment: bool,

        /// Do not add a waypoint for each lap
        #[arg(long)]
        no_lap_adds_wpt: bool,

        /// Write lap events only, no track points
        #[arg(long)]
        no_write_points: bool,
    },

    /// Dump the entire memory region to a file
    Dump {
        /// Output path
        path: PathBuf,
    },

    /// List the device's directory entries
    Files,

    /// Set the device wall clock
    Settime {
        /// Time to set, ISO-8601 (default: now)
        #[arg(long, value_name = "TIMESTAMP")]
        iso: Option<String>,
    },

    /// Protocol development tools
    #[command(subcommand)]
    Debug(DebugCommands),
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Hex-dump the settings blob
    Get,
    /// Write bytes into the settings blob
    Set {
        /// Byte offset within the blob
        #[arg(long)]
        offset: u32,
        /// Bytes to write, as hex digits
        #[arg(long, value_name = "BYTES")]
        hex: String,
    },
}

#[derive(Subcommand)]
enum DebugCommands {
    /// Pretty-print the messages of a recording or a Wireshark PDML export
    View {
        /// Recording log (.log) or PDML (.xml/.pdml), optionally gzipped
        file: PathBuf,
    },
    /// Print the device's internal event log
    Internallog,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Errors exit 1; --help and --version are not errors.
            std::process::exit(i32::from(err.use_stderr()));
        }
    };

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gpspod={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&cli) {
        error::report(&err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Device => commands::device::info(cli),
        Commands::Status => commands::device::status(cli),
        Commands::Settings(SettingsCommands::Get) => commands::settings::get(cli),
        Commands::Settings(SettingsCommands::Set { offset, hex }) => {
            commands::settings::set(cli, *offset, hex)
        }
        Commands::Tracks => commands::tracks::list(cli),
        Commands::Retrieve {
            index,
            output,
            no_lap_splits_segment,
            no_lap_adds_wpt,
            no_write_points,
        } => commands::tracks::retrieve(
            cli,
            *index,
            output.as_deref(),
            &gpx::GpxOptions {
                lap_splits_segment: !no_lap_splits_segment,
                lap_adds_waypoint: !no_lap_adds_wpt,
                write_points: !no_write_points,
            },
        ),
        Commands::Dump { path } => commands::dump::run(cli, path),
        Commands::Files => commands::device::files(cli),
        Commands::Settime { iso } => commands::device::settime(cli, iso.as_deref()),
        Commands::Debug(DebugCommands::View { file }) => commands::debug::view(file),
        Commands::Debug(DebugCommands::Internallog) => commands::debug::internallog(cli),
    }
}
