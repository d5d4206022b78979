use std::path::PathBuf;

use ardetect::{BatchRunner, RunConfig};
use clap::Parser;
use env_logger::Env;

/// Command line arguments for AR detection
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect and track atmospheric rivers in gridded IVT files"
)]
struct Args {
    /// Input JSON files, one batch each
    #[arg(required_unless_present = "write_default_config")]
    inputs: Vec<PathBuf>,

    /// Run configuration JSON; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for record tables, track tables and label rasters
    #[arg(short, long, default_value = "ar_output")]
    output_dir: PathBuf,

    /// Worker threads (0 lets rayon decide)
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: usize,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        RunConfig::default().save_to_file(path)?;
        log::info!("wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => RunConfig::load_from_file(path)?,
        None => RunConfig::default(),
    };

    let tasks = BatchRunner::tasks(&args.inputs, &args.output_dir);
    let outcomes = BatchRunner::new(&config)
        .with_threads(Some(args.threads))
        .run(tasks)?;

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    if failed.is_empty() {
        return Ok(());
    }
    for outcome in &failed {
        if let Err(e) = &outcome.result {
            eprintln!("{}: {}", outcome.task.input.display(), e);
        }
    }
    Err(format!("{} of {} file(s) failed", failed.len(), outcomes.len()).into())
}
