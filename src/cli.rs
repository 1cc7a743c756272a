use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use specmap_utils::{Stopwatch, logger};
use tracing::{debug, info};

use crate::config::MapConfig;
use crate::runtime::jit::specialization::{
    CodeGenMap, CodeGenProducer, ConstantRoutine, RoutineContext, Selector, call_constant,
};

#[derive(Parser, Debug)]
#[command(name = "specmap", version, about = "Specialized routine cache driver")]
pub struct SpecmapCli {
    #[arg(long, global = true)]
    /// Load map settings from a TOML file instead of the environment.
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Print machine-readable JSON instead of tables.
    json: bool,

    #[arg(short, long, global = true)]
    /// Show debug events from the arena, generators and profilers.
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl SpecmapCli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generates one routine per selector, runs them for a number of frames and reports usage.
    Run {
        #[arg(long, default_value_t = 16)]
        keys: u64,
        #[arg(long, default_value_t = 60)]
        frames: u64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long)]
        /// Publish generated routines to the perf JIT map of this process.
        perf_map: bool,
    },
    /// Prints the effective map configuration.
    Config,
}

pub fn run() -> Result<()> {
    let cli = SpecmapCli::parse();
    if cli.verbose {
        logger::init_logging_at("debug");
    } else {
        logger::init_logging();
    }
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Run {
            keys,
            frames,
            seed,
            perf_map,
        } => {
            let mut config = config;
            config.perf_map |= *perf_map;
            handle_run(&cli, &config, *keys, *frames, *seed)
        }
        Command::Config => handle_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<MapConfig> {
    match path {
        Some(path) => MapConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => MapConfig::from_env().context("invalid SPECMAP_* environment"),
    }
}

fn handle_config(config: &MapConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn handle_run(cli: &SpecmapCli, config: &MapConfig, keys: u64, frames: u64, seed: u64) -> Result<()> {
    let context = RoutineContext { seed };
    let mut map: CodeGenMap<ConstantRoutine> =
        CodeGenProducer::<ConstantRoutine>::from_config("constant", context, config)
            .into_map()
            .with_tick_frequency(config.tick_frequency);

    let selectors: Vec<Selector> = (0..keys).map(selector_for).collect();
    let mut executed = false;

    for frame in 0..frames {
        for (index, selector) in selectors.iter().enumerate() {
            let watch = Stopwatch::start_new();
            let entry = map.lookup_or_create(*selector);
            let expected = ConstantRoutine::expected(&context, selector);

            // SAFETY: the map only hands out ConstantRoutine entry points and
            // keeps their arena alive.
            let value = match unsafe { call_constant(entry) } {
                Some(value) => {
                    executed = true;
                    value
                }
                None => expected,
            };
            let ticks = watch.elapsed_ticks();

            if value != expected {
                bail!("routine for {selector:x} returned {value:#x}, expected {expected:#x}");
            }

            let index = index as u64;
            let total_units = 64 + (index % 8) * 32;
            let actual_units = total_units - value % 16;
            map.record_usage(frame, ticks, actual_units, total_units, 1 + index % 4);
        }
    }

    if !executed {
        debug!("host cannot execute x86-64 routines; usage recorded without running them");
    }

    let producer = map.producer();
    info!(
        routines = producer.generated_count(),
        bytes = producer.total_code_size(),
        "run finished"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&map.report_rows())?);
    } else {
        map.report();
        println!(
            "{} {} routines, {} bytes of code",
            "generated".green().bold(),
            producer.generated_count(),
            producer.total_code_size()
        );
    }

    Ok(())
}

/// Spread run indices over several selector fields so keys look like packed state.
fn selector_for(index: u64) -> Selector {
    Selector::default()
        .with_field(0, 2, index % 4)
        .with_field(2, 3, (index / 4) % 8)
        .with_field(8, 16, index)
        .with_field(48, 1, index % 2)
}
