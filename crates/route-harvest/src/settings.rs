use clap::{Parser, ValueEnum};
use route_harvest_lib::{Config, Executor, FailurePolicy, ParseOptions, Source};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Route files harvested when none are given on the command line
pub const DEFAULT_ROUTES: [&str; 4] = ["route-1.kml", "route-2.kml", "route-4.kml", "route-5.kml"];

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorArg {
    /// Async tasks on the tokio runtime
    Tokio,
    /// Threads from the rayon pool
    ThreadPool,
}

impl From<ExecutorArg> for Executor {
    fn from(arg: ExecutorArg) -> Self {
        match arg {
            ExecutorArg::Tokio => Executor::Tokio,
            ExecutorArg::ThreadPool => Executor::ThreadPool,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Route Harvest - Extract the coordinates of a set of KML route files concurrently
pub struct Settings {
    /// KML files to harvest (default: the standard route set inside --routes-dir)
    #[clap(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Directory holding the standard route set
    #[clap(long, value_name = "DIR", default_value = "files")]
    pub routes_dir: PathBuf,

    /// Capacity of the channel between workers and aggregator (1 = tightest backpressure)
    #[clap(long, default_value = "1")]
    pub channel_capacity: NonZeroUsize,

    /// Abort the remaining workers as soon as one fails
    #[clap(long)]
    pub fail_fast: bool,

    /// How the per-file workers are run
    #[clap(long, value_enum, default_value_t = ExecutorArg::Tokio)]
    pub executor: ExecutorArg,

    /// Reject latitudes outside [-90, 90] and longitudes outside [-180, 180]
    #[clap(long)]
    pub strict: bool,

    /// Accept tabs and newlines between path coordinates
    #[clap(long)]
    pub any_whitespace: bool,

    /// Do not print a line per coordinate
    #[clap(short, long)]
    pub quiet: bool,

    /// Print the final summary as JSON
    #[clap(long)]
    pub json: bool,
}

impl Settings {
    /// Parse from the process arguments, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Sources to harvest, in the order given
    pub fn sources(&self) -> Vec<Source> {
        if self.files.is_empty() {
            DEFAULT_ROUTES
                .iter()
                .map(|name| Source::file(self.routes_dir.join(name)))
                .collect()
        } else {
            self.files.iter().map(Source::file).collect()
        }
    }

    pub fn config(&self) -> Config {
        Config {
            channel_capacity: self.channel_capacity,
            failure_policy: if self.fail_fast {
                FailurePolicy::CancelRemaining
            } else {
                FailurePolicy::CollectFirst
            },
            executor: self.executor.into(),
            parse: ParseOptions {
                strict_ranges: self.strict,
                split_any_whitespace: self.any_whitespace,
            },
        }
    }
}
