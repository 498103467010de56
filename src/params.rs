use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, ops::RangeBounds};

/// Mean number of contacts used when a request does not specify one.
pub const DEFAULT_CONTACTS: usize = 10;

/// Illness length (days) used when a request does not specify one.
pub const DEFAULT_ILLNESS_LENGTH: u32 = 7;

/// Epidemiological parameters of one outbreak simulation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutbreakParams {
    /// Basic reproduction number.
    #[serde(rename = "R0", alias = "r0")]
    pub r0: f64,
    /// Number of individuals.
    pub population_size: usize,
    /// Infection fatality rate.
    pub ifr: f64,
    /// Days an individual stays infectious.
    #[serde(default = "default_illness_length")]
    pub illness_length: u32,
    /// Mean degree of the contact network.
    ///
    /// Defaults to `min(DEFAULT_CONTACTS, population_size - 1)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts_per_individual: Option<usize>,
}

fn default_illness_length() -> u32 {
    DEFAULT_ILLNESS_LENGTH
}

impl OutbreakParams {
    pub fn new(r0: f64, population_size: usize, ifr: f64, illness_length: u32) -> Self {
        Self {
            r0,
            population_size,
            ifr,
            illness_length,
            contacts_per_individual: None,
        }
    }

    pub fn with_contacts(mut self, contacts_per_individual: usize) -> Self {
        self.contacts_per_individual = Some(contacts_per_individual);
        self
    }

    /// Mean contact-network degree, with the default applied.
    pub fn contacts(&self) -> usize {
        self.contacts_per_individual
            .unwrap_or_else(|| DEFAULT_CONTACTS.min(self.population_size.saturating_sub(1)))
    }

    /// Validate the parameters against each other and against the engine options.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for out-of-range values and
    /// [`Error::ResourceExhausted`] when the run would not fit the configured budget.
    pub fn validate(&self, options: &EngineOptions) -> Result<()> {
        if !(self.r0.is_finite() && self.r0 > 0.0) {
            return Err(Error::invalid(
                "R0",
                format!("must be greater than 0, but is {:?}", self.r0),
            ));
        }
        if self.population_size == 0 {
            return Err(Error::invalid("population_size", "must be greater than 0"));
        }
        check_num("ifr", self.ifr, 0.0..=1.0)?;
        check_num("illness_length", self.illness_length, 1..)?;
        if let Some(contacts) = self.contacts_per_individual {
            check_num("contacts_per_individual", contacts, 1..self.population_size)?;
        }

        options.validate(self)?;

        if self.population_size > options.max_population || self.population_size > u32::MAX as usize
        {
            return Err(Error::ResourceExhausted(format!(
                "population size {} exceeds the limit of {}",
                self.population_size,
                options.max_population.min(u32::MAX as usize)
            )));
        }
        let n_edges = self.population_size.saturating_mul(self.contacts()).div_ceil(2);
        if n_edges > options.max_contact_edges {
            return Err(Error::ResourceExhausted(format!(
                "contact network needs {n_edges} edges, exceeding the limit of {}",
                options.max_contact_edges
            )));
        }

        Ok(())
    }
}

/// Shape of the contact network.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// Uniform random graph with the requested mean degree.
    #[default]
    Random,
    /// Ring lattice, each individual linked to its nearest neighbours.
    Lattice,
    /// Ring lattice with each edge rewired with probability `rewiring`.
    SmallWorld { rewiring: f64 },
}

/// Engine knobs that are not part of the request contract.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Number of individuals infectious on day 0.
    pub initial_infected: usize,
    /// Contact network shape.
    pub topology: Topology,
    /// Maximum number of simulated days before the run is aborted.
    pub max_days: Option<usize>,
    /// Largest accepted population.
    pub max_population: usize,
    /// Largest accepted number of undirected contact edges.
    pub max_contact_edges: usize,
    /// Number of infectious individuals from which a day's
    /// transmission pass runs on the thread pool.
    pub parallel_threshold: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            initial_infected: 1,
            topology: Topology::Random,
            max_days: None,
            max_population: 10_000_000,
            max_contact_edges: 100_000_000,
            parallel_threshold: 1024,
        }
    }
}

impl EngineOptions {
    fn validate(&self, params: &OutbreakParams) -> Result<()> {
        check_num("initial_infected", self.initial_infected, 1..=params.population_size)?;
        if let Some(max_days) = self.max_days {
            check_num("max_days", max_days, 1..)?;
        }
        match self.topology {
            Topology::Random => {}
            Topology::Lattice | Topology::SmallWorld { .. } => {
                let contacts = params.contacts();
                if contacts % 2 != 0 {
                    return Err(Error::invalid(
                        "contacts_per_individual",
                        format!("must be even for a lattice topology, but is {contacts}"),
                    ));
                }
                if let Topology::SmallWorld { rewiring } = self.topology {
                    check_num("rewiring", rewiring, 0.0..=1.0)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn check_num<T, R>(name: &'static str, num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        return Err(Error::invalid(
            name,
            format!("number must be in the range {range:?}, but is {num:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> OutbreakParams {
        OutbreakParams::new(2.5, 1000, 0.01, 7).with_contacts(10)
    }

    fn invalid_name(params: &OutbreakParams, options: &EngineOptions) -> &'static str {
        match params.validate(options) {
            Err(Error::InvalidParameter { name, .. }) => name,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_valid_params() {
        base().validate(&EngineOptions::default()).unwrap();
    }

    #[test]
    fn rejects_each_out_of_range_value() {
        let opts = EngineOptions::default();

        let mut p = base();
        p.r0 = 0.0;
        assert_eq!(invalid_name(&p, &opts), "R0");
        p.r0 = f64::NAN;
        assert_eq!(invalid_name(&p, &opts), "R0");

        let mut p = base();
        p.population_size = 0;
        assert_eq!(invalid_name(&p, &opts), "population_size");

        let mut p = base();
        p.ifr = 1.01;
        assert_eq!(invalid_name(&p, &opts), "ifr");
        p.ifr = -0.1;
        assert_eq!(invalid_name(&p, &opts), "ifr");

        let mut p = base();
        p.illness_length = 0;
        assert_eq!(invalid_name(&p, &opts), "illness_length");

        let p = base().with_contacts(1000);
        assert_eq!(invalid_name(&p, &opts), "contacts_per_individual");
        let p = base().with_contacts(0);
        assert_eq!(invalid_name(&p, &opts), "contacts_per_individual");
    }

    #[test]
    fn default_contacts_fit_small_populations() {
        assert_eq!(OutbreakParams::new(2.0, 1000, 0.0, 7).contacts(), 10);
        assert_eq!(OutbreakParams::new(2.0, 4, 0.0, 7).contacts(), 3);
        assert_eq!(OutbreakParams::new(2.0, 1, 0.0, 7).contacts(), 0);
        OutbreakParams::new(2.0, 1, 0.0, 7)
            .validate(&EngineOptions::default())
            .unwrap();
    }

    #[test]
    fn validates_engine_options() {
        let opts = EngineOptions {
            initial_infected: 1001,
            ..EngineOptions::default()
        };
        assert_eq!(invalid_name(&base(), &opts), "initial_infected");

        let opts = EngineOptions {
            topology: Topology::Lattice,
            ..EngineOptions::default()
        };
        assert_eq!(invalid_name(&base().with_contacts(5), &opts), "contacts_per_individual");
        base().validate(&opts).unwrap();

        let opts = EngineOptions {
            topology: Topology::SmallWorld { rewiring: 1.5 },
            ..EngineOptions::default()
        };
        assert_eq!(invalid_name(&base(), &opts), "rewiring");

        let opts = EngineOptions {
            max_days: Some(0),
            ..EngineOptions::default()
        };
        assert_eq!(invalid_name(&base(), &opts), "max_days");
    }

    #[test]
    fn oversized_runs_are_resource_errors() {
        let opts = EngineOptions {
            max_population: 500,
            ..EngineOptions::default()
        };
        assert!(matches!(
            base().validate(&opts),
            Err(Error::ResourceExhausted(_))
        ));

        let opts = EngineOptions {
            max_contact_edges: 4999,
            ..EngineOptions::default()
        };
        assert!(matches!(
            base().validate(&opts),
            Err(Error::ResourceExhausted(_))
        ));
    }

    #[test]
    fn edge_budget_rounds_odd_degree_sums_up() {
        // 101 * 3 = 303 half-edges need 152 edges.
        let params = OutbreakParams::new(2.0, 101, 0.01, 7).with_contacts(3);
        let opts = |max_contact_edges| EngineOptions {
            max_contact_edges,
            ..EngineOptions::default()
        };
        assert!(matches!(
            params.validate(&opts(151)),
            Err(Error::ResourceExhausted(_))
        ));
        assert_eq!(params.validate(&opts(152)), Ok(()));
    }
}
