use crate::error::{Error, Result};
use crate::model::SimulationResult;
use crate::params::OutbreakParams;
use crate::stats::Accumulator;
use crate::threshold::HerdImmunity;
use serde::{Deserialize, Serialize};

/// Scalar outcomes of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Index of the last recorded day.
    pub duration_days: usize,
    pub peak_infected: f64,
    pub peak_day: usize,
    pub final_deaths: f64,
    pub final_immune: f64,
    /// Fraction of the population ever infected.
    pub attack_rate: f64,
}

impl Summary {
    pub fn new(result: &SimulationResult) -> Result<Self> {
        let last = result
            .last()
            .ok_or_else(|| Error::InvariantViolation("simulation result has no days".into()))?;

        // First day with the highest infected fraction.
        let (peak_day, peak_infected) = result
            .infected
            .iter()
            .fold((0, f64::NEG_INFINITY), |(peak_day, peak), (&day, &val)| {
                if val > peak { (day, val) } else { (peak_day, peak) }
            });

        Ok(Self {
            duration_days: result.n_days() - 1,
            peak_infected,
            peak_day,
            final_deaths: last.deaths,
            final_immune: last.immune,
            attack_rate: last.deaths + last.immune + last.infected,
        })
    }
}

pub trait Obs {
    fn update(&mut self, summary: &Summary);
    fn report(&self) -> serde_json::Value;
}

pub struct Peak {
    height: Accumulator,
    day: Accumulator,
}

impl Peak {
    pub fn new() -> Self {
        Self {
            height: Accumulator::new(),
            day: Accumulator::new(),
        }
    }
}

impl Obs for Peak {
    fn update(&mut self, summary: &Summary) {
        self.height.add(summary.peak_infected);
        self.day.add(summary.peak_day as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "peak_infected": self.height.report(),
            "peak_day": self.day.report(),
        })
    }
}

pub struct FinalSize {
    deaths: Accumulator,
    immune: Accumulator,
    attack_rate: Accumulator,
}

impl FinalSize {
    pub fn new() -> Self {
        Self {
            deaths: Accumulator::new(),
            immune: Accumulator::new(),
            attack_rate: Accumulator::new(),
        }
    }
}

impl Obs for FinalSize {
    fn update(&mut self, summary: &Summary) {
        self.deaths.add(summary.final_deaths);
        self.immune.add(summary.final_immune);
        self.attack_rate.add(summary.attack_rate);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "final_deaths": self.deaths.report(),
            "final_immune": self.immune.report(),
            "attack_rate": self.attack_rate.report(),
        })
    }
}

pub struct Duration {
    days: Accumulator,
}

impl Duration {
    pub fn new() -> Self {
        Self {
            days: Accumulator::new(),
        }
    }
}

impl Obs for Duration {
    fn update(&mut self, summary: &Summary) {
        self.days.add(summary.duration_days as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "duration_days": self.days.report() })
    }
}

/// Share of runs whose attack rate reached the herd-immunity threshold.
pub struct HerdImmunityReached {
    threshold: f64,
    reached: Accumulator,
}

impl HerdImmunityReached {
    pub fn new(herd: &HerdImmunity) -> Self {
        Self {
            threshold: herd.required_fraction(),
            reached: Accumulator::new(),
        }
    }
}

impl Obs for HerdImmunityReached {
    fn update(&mut self, summary: &Summary) {
        self.reached
            .add(if summary.attack_rate >= self.threshold { 1.0 } else { 0.0 });
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "herd_immunity_threshold": self.threshold,
            "herd_immunity_reached": self.reached.report(),
        })
    }
}

/// Aggregates summaries of many runs of the same parameters.
pub struct Analyzer {
    n_runs: usize,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(params: &OutbreakParams) -> Result<Self> {
        let herd = HerdImmunity::new(params.r0)?;
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Peak::new()),
            Box::new(FinalSize::new()),
            Box::new(Duration::new()),
            Box::new(HerdImmunityReached::new(&herd)),
        ];
        Ok(Self {
            n_runs: 0,
            obs_ptr_vec,
        })
    }

    pub fn add_result(&mut self, result: &SimulationResult) -> Result<()> {
        let summary = Summary::new(result)?;
        for obs in &mut self.obs_ptr_vec {
            obs.update(&summary);
        }
        self.n_runs += 1;
        Ok(())
    }

    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    pub fn report(&self) -> serde_json::Value {
        let mut report = serde_json::Map::new();
        report.insert("n_runs".into(), self.n_runs.into());
        for obs in &self.obs_ptr_vec {
            if let serde_json::Value::Object(fields) = obs.report() {
                report.extend(fields);
            }
        }
        serde_json::Value::Object(report)
    }
}
