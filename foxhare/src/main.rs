use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use foxhare::archive::{self, Archive};
use foxhare::config::Param;
use foxhare::observer::{ConsoleObserver, ObserverChain};
use foxhare::sim::Simulation;

#[derive(Parser)]
#[command(about = "spatial predator-prey co-evolution simulation")]
struct Args {
    /// toml parameter file; defaults apply for everything it leaves out
    config: Option<PathBuf>,
    /// override the root seed
    #[arg(long)]
    seed: Option<u64>,
    /// override the output directory
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// override the thread count hint (0 keeps the rayon default)
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut param = match &args.config {
        Some(path) => Param::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Param::default(),
    };
    if let Some(seed) = args.seed {
        param.seed = seed;
    }
    if let Some(outdir) = args.outdir {
        param.outdir = outdir;
    }
    if let Some(threads) = args.threads {
        param.threads = threads;
    }
    param.validate()?;

    if param.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(param.threads)
            .build_global()
            .context("building thread pool")?;
    }

    std::fs::create_dir_all(&param.outdir)
        .with_context(|| format!("creating {}", param.outdir.display()))?;
    // echo the effective parameters next to the results
    let echo = toml::to_string_pretty(&param).context("serializing parameters")?;
    std::fs::write(param.outdir.join("param.toml"), echo)?;
    info!(seed = param.seed, dim = param.landscape.dim, "starting run");

    let mut sim = Simulation::new(param.clone()).context("constructing simulation")?;
    let mut observers = ObserverChain::new();
    observers.push(Box::new(ConsoleObserver::new()));

    let completed = sim.run(&mut observers);
    if !completed {
        warn!("run stopped early by an observer");
    }

    // keep the final policies around for warm starts
    let mut prey_archive = Archive::default();
    prey_archive.push(archive::compress(sim.prey().policy.as_ref()));
    prey_archive.save(&param.outdir.join("prey_policy.bin"))?;
    let mut pred_archive = Archive::default();
    pred_archive.push(archive::compress(sim.pred().policy.as_ref()));
    pred_archive.save(&param.outdir.join("pred_policy.bin"))?;
    info!(outdir = %param.outdir.display(), "archives written");

    Ok(())
}
