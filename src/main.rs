use std::io;
use std::path::PathBuf;
use clap::{ArgAction, Parser, ValueHint};
use tracing_subscriber::EnvFilter;

mod lap_merger;
mod local_time;
mod report_config;
mod split_report;
mod split_segmenter;
mod tcx_model;
mod tcx_parser;

use report_config::{ReportConfig, DEFAULT_SPACINGS_M, MARATHON_DISTANCE_M};
use split_report::ReportError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-distance split report for Training Center (TCX) activities", long_about = None)]
struct Cli {
    /// TCX activity file
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// True course distance in meters used to correct GPS drift
    #[arg(long, default_value_t = MARATHON_DISTANCE_M)]
    reference_distance: f64,

    /// Marker spacings in meters, one report per spacing
    #[arg(long = "spacing", value_delimiter = ',')]
    spacings: Vec<f64>,

    /// Index of the activity in the file
    #[arg(long, default_value_t = 0)]
    activity: usize,

    /// Report on the first lap only instead of merging all laps
    #[arg(long, action = ArgAction::SetTrue)]
    no_merge: bool,

    /// Keep the merged-away laps in the activity
    #[arg(long, action = ArgAction::SetTrue)]
    keep_laps: bool,

    /// Restore raw distances before each spacing
    #[arg(long, action = ArgAction::SetTrue)]
    independent_runs: bool,

    /// Print the parsed activity tree before the reports
    #[arg(long, action = ArgAction::SetTrue)]
    dump: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl From<Cli> for ReportConfig {
    fn from(cli: Cli) -> Self {
        let spacings_m = if cli.spacings.is_empty() {
            DEFAULT_SPACINGS_M.to_vec()
        } else {
            cli.spacings
        };

        ReportConfig {
            input: cli.input,
            reference_distance_m: cli.reference_distance,
            spacings_m,
            activity_index: cli.activity,
            merge_laps: !cli.no_merge,
            delete_merged_laps: !cli.keep_laps,
            independent_runs: cli.independent_runs,
            dump_database: cli.dump,
        }
    }
}

fn main() -> Result<(), ReportError> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = ReportConfig::from(cli);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    split_report::run(&config, &mut out)
}
