//! Simulation data types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health state of an individual.
///
/// Transitions only go `Susceptible -> Infectious -> {Recovered | Deceased}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Susceptible,
    Infectious,
    Recovered,
    Deceased,
}

impl HealthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Recovered | Self::Deceased)
    }

    /// Whether `self -> next` is an allowed transition (staying put included).
    pub fn can_become(self, next: Self) -> bool {
        use HealthState::*;
        self == next
            || matches!(
                (self, next),
                (Susceptible, Infectious) | (Infectious, Recovered) | (Infectious, Deceased)
            )
    }
}

/// Member of the simulated population.
///
/// The contact set lives in the [`ContactNetwork`](crate::network::ContactNetwork),
/// indexed by the same id as the individual's slot in the population arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Individual {
    health_state: HealthState,
    days_infectious: u32,
}

impl Individual {
    pub fn health_state(&self) -> HealthState {
        self.health_state
    }

    /// Days elapsed since becoming infectious. Zero unless infectious.
    pub fn days_infectious(&self) -> u32 {
        self.days_infectious
    }

    pub(crate) fn infect(&mut self) {
        debug_assert!(self.health_state.can_become(HealthState::Infectious));
        self.health_state = HealthState::Infectious;
        self.days_infectious = 0;
    }

    pub(crate) fn progress(&mut self) {
        self.days_infectious += 1;
    }

    pub(crate) fn resolve(&mut self, deceased: bool) {
        let next = if deceased {
            HealthState::Deceased
        } else {
            HealthState::Recovered
        };
        debug_assert!(self.health_state.can_become(next));
        self.health_state = next;
        self.days_infectious = 0;
    }
}

/// Count of individuals per health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Census {
    pub susceptible: usize,
    pub infectious: usize,
    pub recovered: usize,
    pub deceased: usize,
}

impl Census {
    pub fn total(&self) -> usize {
        self.susceptible + self.infectious + self.recovered + self.deceased
    }

    pub fn snapshot(&self, population_size: usize) -> DailySnapshot {
        let n = population_size as f64;
        DailySnapshot {
            infected: self.infectious as f64 / n,
            deaths: self.deceased as f64 / n,
            immune: self.recovered as f64 / n,
        }
    }
}

/// Population fractions on one simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub infected: f64,
    pub deaths: f64,
    pub immune: f64,
}

/// Day-indexed series produced by one outbreak simulation.
///
/// Days are contiguous from 0. Serialized keys are decimal strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub infected: BTreeMap<usize, f64>,
    pub deaths: BTreeMap<usize, f64>,
    pub immune: BTreeMap<usize, f64>,
}

impl SimulationResult {
    pub(crate) fn push(&mut self, snapshot: DailySnapshot) {
        let day = self.n_days();
        self.infected.insert(day, snapshot.infected);
        self.deaths.insert(day, snapshot.deaths);
        self.immune.insert(day, snapshot.immune);
    }

    /// Number of recorded days.
    pub fn n_days(&self) -> usize {
        self.infected.len()
    }

    pub fn snapshot(&self, day: usize) -> Option<DailySnapshot> {
        Some(DailySnapshot {
            infected: *self.infected.get(&day)?,
            deaths: *self.deaths.get(&day)?,
            immune: *self.immune.get(&day)?,
        })
    }

    pub fn snapshots(&self) -> impl Iterator<Item = DailySnapshot> + '_ {
        (0..self.n_days()).filter_map(|day| self.snapshot(day))
    }

    pub fn last(&self) -> Option<DailySnapshot> {
        self.n_days().checked_sub(1).and_then(|day| self.snapshot(day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotone() {
        use HealthState::*;
        assert!(Susceptible.can_become(Infectious));
        assert!(Infectious.can_become(Recovered));
        assert!(Infectious.can_become(Deceased));
        assert!(!Infectious.can_become(Susceptible));
        assert!(!Recovered.can_become(Infectious));
        assert!(!Deceased.can_become(Recovered));
        assert!(!Susceptible.can_become(Recovered));
    }

    #[test]
    fn individual_lifecycle() {
        let mut ind = Individual::default();
        assert_eq!(ind.health_state(), HealthState::Susceptible);
        ind.infect();
        ind.progress();
        ind.progress();
        assert_eq!(ind.days_infectious(), 2);
        ind.resolve(false);
        assert_eq!(ind.health_state(), HealthState::Recovered);
        assert_eq!(ind.days_infectious(), 0);
        assert!(ind.health_state().is_terminal());
    }

    #[test]
    fn result_keys_serialize_as_contiguous_days() {
        let mut result = SimulationResult::default();
        for i in 0..12 {
            result.push(DailySnapshot {
                infected: 0.1,
                deaths: 0.0,
                immune: i as f64 / 100.0,
            });
        }
        let json = serde_json::to_value(&result).unwrap();
        let immune = json["immune"].as_object().unwrap();
        assert_eq!(immune.len(), 12);
        assert_eq!(immune["11"], 0.11);
        assert_eq!(result.last().unwrap().immune, 0.11);

        let back: SimulationResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
