use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use herdsim::{
    EngineOptions, HerdImmunity, api,
    manager::{Manager, OutputFormat, write_output},
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the herd-immunity threshold for a basic reproduction number.
    Threshold {
        #[arg(long, allow_negative_numbers = true)]
        r0: f64,
    },

    /// Run one outbreak simulation and write its day-indexed series.
    Simulate {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Run independent replicas and write aggregated observables.
    Ensemble {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        replicas: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a request such as `simulate_outbreak?R0=2.5&population_size=1000&ifr=0.01`.
    Query {
        request: String,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    match args.command {
        Command::Threshold { r0 } => {
            let herd = HerdImmunity::new(r0).context("failed to compute threshold")?;
            write_output(&herd, None, OutputFormat::Json)?;
        }
        Command::Simulate {
            config,
            seed,
            output,
            format,
        } => {
            let mgr = Manager::new(config).context("failed to construct mgr")?;
            let result = mgr.run_simulation(seed)?;
            write_output(&result, output.as_deref(), format)?;
        }
        Command::Ensemble {
            config,
            replicas,
            seed,
            output,
        } => {
            let mgr = Manager::new(config).context("failed to construct mgr")?;
            let report = mgr.run_ensemble(replicas, seed)?;
            write_output(&report, output.as_deref(), OutputFormat::Json)?;
        }
        Command::Query { request, seed } => {
            let response = api::dispatch(&request, &EngineOptions::default(), seed);
            write_output(&response.body, None, OutputFormat::Json)?;
            if !response.is_success() {
                bail!("request failed with status {}", response.status);
            }
        }
    }

    Ok(())
}
