//! Stochastic outbreak simulation on contact networks.
//!
//! [`OutbreakEngine`] runs a discrete-time Susceptible-Infectious-Recovered/Deceased
//! process over a random contact network and reports the infected, deceased and
//! immune fractions of the population for every simulated day.
//! [`herd_immunity_threshold`] gives the closed-form threshold `1 - 1/R0`.

pub mod analysis;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod model;
pub mod network;
pub mod params;
pub mod stats;
pub mod threshold;

pub use engine::{OutbreakEngine, simulate_outbreak, transmission_probability};
pub use error::{Error, ErrorResponse, Result};
pub use model::{DailySnapshot, HealthState, SimulationResult};
pub use params::{EngineOptions, OutbreakParams, Topology};
pub use threshold::{HerdImmunity, herd_immunity_threshold};
