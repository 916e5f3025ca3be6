mod app;
mod devices;
mod sink;

pub use app::App;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Record one run of a task against a simulated EEG amplifier.
#[derive(Parser, Debug)]
#[command(name = "bidsrun")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Task description (JSON); defaults to a 60 s rest/task block design
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset root directory
    #[arg(short, long, default_value = "data")]
    pub root: PathBuf,

    #[arg(long, default_value = "01")]
    pub subject: String,

    #[arg(long, default_value = "01")]
    pub session: String,

    /// Sampling frequency of the simulated amplifier (Hz)
    #[arg(long, default_value_t = 256)]
    pub sfreq: u32,

    /// Number of simulated EEG channels
    #[arg(long, default_value_t = 8)]
    pub channels: usize,

    /// Samples delivered per read
    #[arg(long, default_value_t = 32)]
    pub block: usize,

    /// Seed for randomized event widths
    #[arg(long)]
    pub seed: Option<u64>,

    /// Deliver samples at the sampling frequency instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .init();

    let app = App::new(args)?;
    app.run()?;

    Ok(())
}
