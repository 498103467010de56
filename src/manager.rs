use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::OutbreakEngine;
use crate::model::SimulationResult;
use anyhow::{Context, Result};
use rand::{SeedableRng, TryRngCore, rngs::OsRng};
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Encoding of written results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Msgpack,
}

/// Runs the simulations described by a [`Config`].
pub struct Manager {
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let cfg = Config::from_file(config_file).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");
        Ok(Self { cfg })
    }

    pub fn from_config(cfg: Config) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Seed to use: the explicit one, else the configured one, else a fresh OS draw.
    pub fn resolve_seed(&self, seed: Option<u64>) -> Result<u64> {
        if let Some(seed) = seed.or(self.cfg.run.seed) {
            return Ok(seed);
        }
        let seed = OsRng
            .try_next_u64()
            .context("failed to draw a seed from the OS")?;
        log::info!("drew seed {seed} from the OS");
        Ok(seed)
    }

    pub fn run_simulation(&self, seed: Option<u64>) -> Result<SimulationResult> {
        let seed = self.resolve_seed(seed)?;
        let engine = self.engine()?;
        log::info!(
            "running simulation with seed {seed}, transmission probability {:.6}",
            engine.transmission_probability()
        );

        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let result = engine.run(&mut rng).context("failed to run simulation")?;
        Ok(result)
    }

    /// Run independent replicas in parallel and report aggregated observables.
    ///
    /// Replica `i` uses stream `i` of the ChaCha generator seeded with `seed`.
    pub fn run_ensemble(
        &self,
        replicas: Option<usize>,
        seed: Option<u64>,
    ) -> Result<serde_json::Value> {
        let seed = self.resolve_seed(seed)?;
        let replicas = replicas.unwrap_or(self.cfg.run.replicas);
        let engine = self.engine()?;
        log::info!("running {replicas} replicas with seed {seed}");

        let results: Vec<SimulationResult> = (0..replicas)
            .into_par_iter()
            .map(|i_rep| {
                let mut rng = ChaCha12Rng::seed_from_u64(seed);
                rng.set_stream(i_rep as u64);
                engine
                    .run(&mut rng)
                    .with_context(|| format!("failed to run replica {i_rep}"))
            })
            .collect::<Result<_>>()?;

        let mut analyzer = Analyzer::new(&self.cfg.outbreak).context("failed to construct analyzer")?;
        for result in &results {
            analyzer.add_result(result).context("failed to add result")?;
        }

        let mut report = analyzer.report();
        report["seed"] = seed.into();
        Ok(report)
    }

    fn engine(&self) -> Result<OutbreakEngine> {
        OutbreakEngine::new(self.cfg.outbreak.clone(), self.cfg.engine.clone())
            .context("failed to construct engine")
    }
}

/// Write `value` to `file`, or to stdout if no file is given.
pub fn write_output<T: Serialize>(value: &T, file: Option<&Path>, format: OutputFormat) -> Result<()> {
    let writer: Box<dyn Write> = match file {
        Some(file) => {
            let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
            Box::new(file)
        }
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, value).context("failed to serialize output")?;
            writeln!(writer).context("failed to write output")?;
        }
        OutputFormat::Msgpack => {
            rmp_serde::encode::write_named(&mut writer, value)
                .context("failed to serialize output")?;
        }
    }

    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
