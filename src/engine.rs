use crate::error::{Error, Result};
use crate::model::{Census, DailySnapshot, HealthState, Individual, SimulationResult};
use crate::network::ContactNetwork;
use crate::params::{EngineOptions, OutbreakParams};
use rand::{prelude::*, seq::index};
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use rayon::prelude::*;

/// Per-contact, per-day transmission probability.
///
/// Chosen so that an infectious individual with `contacts` susceptible contacts
/// infects `r0` of them on average over `illness_length` days.
pub fn transmission_probability(r0: f64, contacts: usize, illness_length: u32) -> f64 {
    if contacts == 0 {
        return 0.0;
    }
    (r0 / (contacts as f64 * illness_length as f64)).clamp(0.0, 1.0)
}

/// Draws shared by every individual on a given day.
struct DayDraws {
    seed: <ChaCha12Rng as SeedableRng>::Seed,
    infection: Bernoulli,
    fatality: Bernoulli,
    illness_length: u32,
}

impl DayDraws {
    /// Random stream of one individual for this day.
    ///
    /// Independent of evaluation order, so serial and parallel passes agree.
    fn rng(&self, id: u32) -> ChaCha12Rng {
        let mut rng = ChaCha12Rng::from_seed(self.seed);
        rng.set_stream(id as u64);
        rng
    }
}

/// What one infectious individual does during one day.
struct Transition {
    id: u32,
    exposed: Vec<u32>,
    /// `Some(deceased)` once the illness resolves.
    outcome: Option<bool>,
}

/// Population arena with double-buffered health states.
///
/// A day's transitions are computed from `current` and written into `next`,
/// then the buffers are swapped.
pub struct Population {
    current: Vec<Individual>,
    next: Vec<Individual>,
    network: ContactNetwork,
    infectious: Vec<u32>,
    census: Census,
}

impl Population {
    /// Create a fully susceptible population on the given contact network.
    pub fn new(network: ContactNetwork) -> Self {
        let n = network.n_individuals();
        Self {
            current: vec![Individual::default(); n],
            next: vec![Individual::default(); n],
            network,
            infectious: Vec::new(),
            census: Census {
                susceptible: n,
                ..Census::default()
            },
        }
    }

    /// Make `n_seeds` distinct, uniformly chosen individuals infectious.
    pub fn seed_infections<R: Rng + ?Sized>(&mut self, n_seeds: usize, rng: &mut R) {
        for id in index::sample(rng, self.len(), n_seeds.min(self.len())) {
            // Already-seeded individuals stay as they are.
            if self.current[id].health_state() != HealthState::Susceptible {
                continue;
            }
            self.current[id].infect();
            self.infectious.push(id as u32);
            self.census.susceptible -= 1;
            self.census.infectious += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn individual(&self, id: usize) -> &Individual {
        &self.current[id]
    }

    pub fn network(&self) -> &ContactNetwork {
        &self.network
    }

    pub fn census(&self) -> Census {
        self.census
    }

    pub fn snapshot(&self) -> DailySnapshot {
        self.census.snapshot(self.len())
    }

    /// Advance one day.
    fn step(&mut self, draws: &DayDraws, parallel: bool) -> Result<()> {
        let current = &self.current;
        let network = &self.network;
        let transitions: Vec<Transition> = if parallel {
            self.infectious
                .par_iter()
                .map(|&id| draw_transition(current, network, draws, id))
                .collect()
        } else {
            self.infectious
                .iter()
                .map(|&id| draw_transition(current, network, draws, id))
                .collect()
        };

        self.next.copy_from_slice(&self.current);
        let mut infectious = Vec::with_capacity(self.infectious.len());

        for transition in &transitions {
            let ind = &mut self.next[transition.id as usize];
            ind.progress();
            match transition.outcome {
                Some(deceased) => {
                    ind.resolve(deceased);
                    self.census.infectious -= 1;
                    if deceased {
                        self.census.deceased += 1;
                    } else {
                        self.census.recovered += 1;
                    }
                }
                None => infectious.push(transition.id),
            }
        }

        for &id in transitions.iter().flat_map(|t| &t.exposed) {
            let ind = &mut self.next[id as usize];
            // Several infectious contacts may reach the same individual.
            if ind.health_state() == HealthState::Susceptible {
                ind.infect();
                self.census.susceptible -= 1;
                self.census.infectious += 1;
                infectious.push(id);
            }
        }

        std::mem::swap(&mut self.current, &mut self.next);
        self.infectious = infectious;

        if self.census.total() != self.len() || self.census.infectious != self.infectious.len() {
            return Err(Error::InvariantViolation(format!(
                "census {:?} does not match population of {} with {} infectious",
                self.census,
                self.len(),
                self.infectious.len()
            )));
        }
        Ok(())
    }

    /// Recount the arena and compare against the running census.
    pub fn verify(&self) -> Result<()> {
        let mut census = Census::default();
        for ind in &self.current {
            match ind.health_state() {
                HealthState::Susceptible => census.susceptible += 1,
                HealthState::Infectious => census.infectious += 1,
                HealthState::Recovered => census.recovered += 1,
                HealthState::Deceased => census.deceased += 1,
            }
        }
        if census != self.census {
            return Err(Error::InvariantViolation(format!(
                "recounted census {census:?} differs from tracked census {:?}",
                self.census
            )));
        }
        Ok(())
    }
}

fn draw_transition(
    current: &[Individual],
    network: &ContactNetwork,
    draws: &DayDraws,
    id: u32,
) -> Transition {
    let mut rng = draws.rng(id);

    let exposed = network
        .contacts(id as usize)
        .iter()
        .copied()
        .filter(|&contact| current[contact as usize].health_state() == HealthState::Susceptible)
        .filter(|_| draws.infection.sample(&mut rng))
        .collect();

    let days_infectious = current[id as usize].days_infectious() + 1;
    let outcome = (days_infectious >= draws.illness_length).then(|| draws.fatality.sample(&mut rng));

    log::trace!("individual {id}: day {days_infectious} of illness, outcome {outcome:?}");

    Transition {
        id,
        exposed,
        outcome,
    }
}

/// Stochastic outbreak simulation on a contact network.
#[derive(Debug, Clone)]
pub struct OutbreakEngine {
    params: OutbreakParams,
    options: EngineOptions,
    transmission_prob: f64,
}

impl OutbreakEngine {
    /// Validate the inputs and prepare an engine.
    ///
    /// # Errors
    /// Fails before any simulation state is built if the parameters are
    /// invalid or exceed the resource limits in `options`.
    pub fn new(params: OutbreakParams, options: EngineOptions) -> Result<Self> {
        params.validate(&options)?;
        let transmission_prob =
            transmission_probability(params.r0, params.contacts(), params.illness_length);
        Ok(Self {
            params,
            options,
            transmission_prob,
        })
    }

    pub fn params(&self) -> &OutbreakParams {
        &self.params
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn transmission_probability(&self) -> f64 {
        self.transmission_prob
    }

    /// Build a fresh, seeded population for one run.
    pub fn build_population<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Population> {
        let network = ContactNetwork::generate(
            self.params.population_size,
            self.params.contacts(),
            self.options.topology,
            rng,
        )?;
        let mut population = Population::new(network);
        population.seed_infections(self.options.initial_infected, rng);
        Ok(population)
    }

    /// Run one simulation until no one is infectious.
    ///
    /// All randomness is drawn from `rng`, so a fixed seed gives identical output.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if the outbreak outlasts `max_days`
    /// and [`Error::InvariantViolation`] on internal inconsistencies.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SimulationResult> {
        let mut population = self.build_population(rng)?;

        let infection = Bernoulli::new(self.transmission_prob).map_err(|err| {
            Error::InvariantViolation(format!(
                "invalid transmission probability {}: {err}",
                self.transmission_prob
            ))
        })?;
        let fatality = Bernoulli::new(self.params.ifr)
            .map_err(|err| Error::InvariantViolation(format!("invalid ifr {}: {err}", self.params.ifr)))?;

        let mut result = SimulationResult::default();
        result.push(population.snapshot());

        let mut day = 0;
        while population.census().infectious > 0 {
            if self.options.max_days.is_some_and(|max_days| day >= max_days) {
                return Err(Error::ResourceExhausted(format!(
                    "outbreak still active after {day} days"
                )));
            }

            let mut draws = DayDraws {
                seed: Default::default(),
                infection,
                fatality,
                illness_length: self.params.illness_length,
            };
            rng.fill_bytes(&mut draws.seed);

            let parallel = population.census().infectious >= self.options.parallel_threshold;
            population.step(&draws, parallel)?;
            day += 1;

            let snapshot = population.snapshot();
            log::debug!(
                "day {day:4}: infected {:.4} deaths {:.4} immune {:.4}",
                snapshot.infected,
                snapshot.deaths,
                snapshot.immune
            );
            result.push(snapshot);
        }

        population.verify()?;

        let census = population.census();
        log::info!(
            "outbreak over after {day} days: {} recovered, {} deceased, {} never infected",
            census.recovered,
            census.deceased,
            census.susceptible
        );

        Ok(result)
    }
}

/// Run one outbreak simulation with a seeded ChaCha generator.
pub fn simulate_outbreak(
    params: OutbreakParams,
    options: EngineOptions,
    seed: u64,
) -> Result<SimulationResult> {
    let engine = OutbreakEngine::new(params, options)?;
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    engine.run(&mut rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Topology;
    use approx::assert_relative_eq;

    fn params() -> OutbreakParams {
        OutbreakParams::new(2.5, 1000, 0.01, 7).with_contacts(10)
    }

    fn check_series(result: &SimulationResult) {
        let mut prev = DailySnapshot {
            infected: 0.0,
            deaths: 0.0,
            immune: 0.0,
        };
        for snapshot in result.snapshots() {
            for frac in [snapshot.infected, snapshot.deaths, snapshot.immune] {
                assert!((0.0..=1.0).contains(&frac), "fraction {frac} out of range");
            }
            assert!(snapshot.infected + snapshot.deaths + snapshot.immune <= 1.0 + 1e-12);
            assert!(snapshot.deaths >= prev.deaths);
            assert!(snapshot.immune >= prev.immune);
            prev = snapshot;
        }
        assert_eq!(result.last().unwrap().infected, 0.0);
    }

    #[test]
    fn calibration_ties_p_to_r0() {
        assert_relative_eq!(transmission_probability(2.5, 10, 7), 2.5 / 70.0);
        assert_eq!(transmission_probability(100.0, 2, 3), 1.0);
        assert_eq!(transmission_probability(2.0, 0, 7), 0.0);

        let engine = OutbreakEngine::new(params(), EngineOptions::default()).unwrap();
        assert_relative_eq!(engine.transmission_probability(), 2.5 / 70.0);
    }

    #[test]
    fn reference_scenario_peaks_and_resolves() {
        let mut took_off = false;
        for seed in 0..10 {
            let result = simulate_outbreak(params(), EngineOptions::default(), seed).unwrap();
            check_series(&result);
            assert_eq!(result.infected[&0], 0.001);
            assert!(result.n_days() < 200, "run lasted {} days", result.n_days());

            let last = result.last().unwrap();
            let attack_rate = last.deaths + last.immune;
            if attack_rate > 0.5 {
                took_off = true;
                let peak = result.infected.values().copied().fold(0.0, f64::max);
                assert!(peak > 0.05);
                assert!(last.deaths < 0.05 * attack_rate);
            }
        }
        assert!(took_off, "no seed produced a major outbreak");
    }

    #[test]
    fn sub_critical_outbreak_dies_out() {
        for seed in 0..20 {
            let result = simulate_outbreak(
                OutbreakParams::new(0.5, 100, 0.05, 7),
                EngineOptions::default(),
                seed,
            )
            .unwrap();
            check_series(&result);
            assert!(result.n_days() < 40);
            let last = result.last().unwrap();
            assert!(last.deaths + last.immune < 0.2);
        }
    }

    #[test]
    fn same_seed_same_series() {
        let a = simulate_outbreak(params(), EngineOptions::default(), 42).unwrap();
        let b = simulate_outbreak(params(), EngineOptions::default(), 42).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn parallel_pass_matches_serial_pass() {
        let serial = EngineOptions {
            parallel_threshold: usize::MAX,
            initial_infected: 5,
            ..EngineOptions::default()
        };
        let parallel = EngineOptions {
            parallel_threshold: 0,
            ..serial.clone()
        };
        for seed in 0..3 {
            assert_eq!(
                simulate_outbreak(params(), serial.clone(), seed).unwrap(),
                simulate_outbreak(params(), parallel.clone(), seed).unwrap()
            );
        }
    }

    #[test]
    fn zero_ifr_means_no_deaths() {
        let mut p = params();
        p.ifr = 0.0;
        let result = simulate_outbreak(p, EngineOptions::default(), 1).unwrap();
        check_series(&result);
        assert!(result.deaths.values().all(|&d| d == 0.0));
    }

    #[test]
    fn unit_ifr_means_no_immunity() {
        let mut p = params();
        p.ifr = 1.0;
        let result = simulate_outbreak(p, EngineOptions::default(), 1).unwrap();
        check_series(&result);
        assert!(result.immune.values().all(|&i| i == 0.0));
        assert!(result.last().unwrap().deaths >= 0.001);
    }

    #[test]
    fn lone_individual_recovers_after_illness_length() {
        let result = simulate_outbreak(
            OutbreakParams::new(3.0, 1, 0.0, 3),
            EngineOptions::default(),
            0,
        )
        .unwrap();
        assert_eq!(result.n_days(), 4);
        assert_eq!(result.infected[&0], 1.0);
        assert_eq!(result.infected[&2], 1.0);
        assert_eq!(result.infected[&3], 0.0);
        assert_eq!(result.immune[&3], 1.0);
    }

    #[test]
    fn saturated_outbreak_reaches_everyone() {
        let p = OutbreakParams::new(1000.0, 50, 0.0, 2).with_contacts(49);
        let result = simulate_outbreak(p, EngineOptions::default(), 9).unwrap();
        check_series(&result);
        let last = result.last().unwrap();
        assert_relative_eq!(last.deaths + last.immune, 1.0);
        assert_eq!(result.infected[&1], 1.0);
    }

    #[test]
    fn lattice_and_small_world_runs_resolve() {
        for topology in [Topology::Lattice, Topology::SmallWorld { rewiring: 0.1 }] {
            let options = EngineOptions {
                topology,
                ..EngineOptions::default()
            };
            let result = simulate_outbreak(params(), options, 4).unwrap();
            check_series(&result);
        }
    }

    #[test]
    fn day_budget_is_a_resource_error() {
        let options = EngineOptions {
            max_days: Some(3),
            initial_infected: 10,
            ..EngineOptions::default()
        };
        assert!(matches!(
            simulate_outbreak(params(), options, 0),
            Err(Error::ResourceExhausted(_))
        ));
    }

    #[test]
    fn invalid_params_fail_before_running() {
        let mut p = params();
        p.ifr = 2.0;
        assert!(matches!(
            OutbreakEngine::new(p, EngineOptions::default()),
            Err(Error::InvalidParameter { name: "ifr", .. })
        ));
    }

    #[test]
    fn population_state_stays_consistent() {
        let engine = OutbreakEngine::new(
            params(),
            EngineOptions {
                initial_infected: 3,
                ..EngineOptions::default()
            },
        )
        .unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let population = engine.build_population(&mut rng).unwrap();
        assert_eq!(population.census().infectious, 3);
        assert_eq!(population.census().susceptible, 997);
        population.verify().unwrap();
        assert_eq!(population.network().n_edges(), 5000);
        let seeded = (0..population.len())
            .filter(|&id| population.individual(id).health_state() == HealthState::Infectious)
            .count();
        assert_eq!(seeded, 3);
    }

    #[test]
    fn verify_reports_corrupted_census() {
        let engine =
            OutbreakEngine::new(OutbreakParams::new(2.0, 100, 0.0, 7), EngineOptions::default())
                .unwrap();
        let mut population = engine
            .build_population(&mut ChaCha12Rng::seed_from_u64(4))
            .unwrap();
        population.verify().unwrap();

        population.census.recovered += 1;
        assert!(matches!(
            population.verify(),
            Err(Error::InvariantViolation(_))
        ));
    }
}
