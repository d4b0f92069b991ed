use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{debug, info, warn};

use galaxy_sim::{Result, SimConfig, SimError, Simulation, render};

/// Barnes-Hut simulation of a pair of colliding galaxies.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of bodies.
    #[arg(short = 'b', default_value_t = 16384)]
    bodies: usize,

    /// Seed for the initial-condition generator.
    #[arg(short = 's', default_value_t = 213)]
    seed: u64,

    /// Iterations to simulate.
    #[arg(short = 'i', default_value_t = 10)]
    iterations: usize,

    /// Worker thread count.
    #[arg(short = 'p', default_value_t = 8)]
    parallelism: usize,

    /// Sector precision: the grid is 2^N sectors per axis.
    #[arg(short = 'N', default_value_t = 4)]
    sector_precision: u32,

    /// Leaf bucket size.
    #[arg(short = 'l', default_value_t = 32)]
    leaf_size: u32,

    /// Fixed per-sector arena capacity; negative derives it from the
    /// bodies every iteration.
    #[arg(short = 'x', default_value_t = -1, allow_hyphen_values = true)]
    arena_capacity: i64,

    /// Directory to write one SVG frame per iteration into.
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Verbose per-iteration output.
    #[arg(short = 'v', action)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> SimConfig {
        SimConfig {
            num_bodies: self.bodies,
            seed: self.seed,
            iterations: self.iterations,
            parallelism: self.parallelism,
            sector_exp: self.sector_precision,
            leaf_cap: self.leaf_size,
            chunk_cap: (self.arena_capacity >= 0).then_some(self.arena_capacity as usize),
            out_dir: self.output,
            verbose: self.verbose,
            ..SimConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match run(args.into_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: SimConfig) -> Result<()> {
    config.validate()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelism)
        .build_global()
        .map_err(|err| SimError::InvalidConfig(format!("worker pool: {err}")))?;

    if let Some(dir) = &config.out_dir {
        if let Err(err) = std::fs::create_dir_all(dir) {
            warn!("cannot create {}: {err}", dir.display());
        }
    }

    let start = Instant::now();
    let mut sim = Simulation::new(config)?;
    info!(
        "simulating {} bodies on a {}x{} sector grid",
        sim.bodies.len(),
        sim.config.sectors_per_axis(),
        sim.config.sectors_per_axis(),
    );

    for iteration in 0..sim.config.iterations {
        let tick = Instant::now();
        sim.step()?;
        debug!("iteration {iteration} took {:.2?}", tick.elapsed());

        if let Some(dir) = sim.config.out_dir.as_deref() {
            match render::write_frame(dir, iteration, &sim.bodies, &sim.boundary) {
                Ok(path) => debug!("wrote {}", path.display()),
                Err(err) => warn!("frame {iteration} not written: {err}"),
            }
        }
    }
    info!(
        "{} iterations in {:.2?}",
        sim.config.iterations,
        start.elapsed(),
    );
    Ok(())
}
