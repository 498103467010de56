//! Contact network construction.
//!
//! The network is an undirected graph over individual ids `0..n`, stored as a
//! compressed adjacency arena: the contacts of individual `i` are
//! `targets[offsets[i]..offsets[i + 1]]`. Every edge appears in both endpoints'
//! lists and there are no self-loops or duplicate edges.

use crate::error::{Error, Result};
use crate::params::Topology;
use rand::prelude::*;
use rand_distr::{Bernoulli, Uniform};
use rustc_hash::FxHashSet;

/// Attempts made to find a free endpoint when rewiring one small-world edge.
const MAX_REWIRE_ATTEMPTS: usize = 32;

/// Immutable, symmetric contact structure of a population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactNetwork {
    offsets: Vec<usize>,
    targets: Vec<u32>,
}

impl ContactNetwork {
    /// Build a network over `n` individuals with mean degree close to `contacts`.
    pub fn generate<R: Rng + ?Sized>(
        n: usize,
        contacts: usize,
        topology: Topology,
        rng: &mut R,
    ) -> Result<Self> {
        let edges = match topology {
            Topology::Random => random_edges(n, contacts, rng)?,
            Topology::Lattice => lattice_edges(n, contacts),
            Topology::SmallWorld { rewiring } => {
                let mut edges = lattice_edges(n, contacts);
                rewire_edges(n, &mut edges, rewiring, rng)?;
                edges
            }
        };
        let network = Self::from_edges(n, &edges);
        log::info!(
            "built {topology:?} contact network: {} individuals, {} edges, mean degree {:.3}",
            n,
            network.n_edges(),
            network.mean_degree()
        );
        Ok(network)
    }

    /// Build the adjacency arena from a list of undirected edges.
    pub fn from_edges(n: usize, edges: &[(u32, u32)]) -> Self {
        let mut offsets = vec![0; n + 1];
        for &(a, b) in edges {
            offsets[a as usize + 1] += 1;
            offsets[b as usize + 1] += 1;
        }
        for i in 0..n {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets[..n].to_vec();
        let mut targets = vec![0; offsets[n]];
        for &(a, b) in edges {
            targets[cursor[a as usize]] = b;
            cursor[a as usize] += 1;
            targets[cursor[b as usize]] = a;
            cursor[b as usize] += 1;
        }

        Self { offsets, targets }
    }

    pub fn n_individuals(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of undirected edges.
    pub fn n_edges(&self) -> usize {
        self.targets.len() / 2
    }

    pub fn mean_degree(&self) -> f64 {
        match self.n_individuals() {
            0 => 0.0,
            n => self.targets.len() as f64 / n as f64,
        }
    }

    /// Contact set of individual `id`.
    pub fn contacts(&self, id: usize) -> &[u32] {
        &self.targets[self.offsets[id]..self.offsets[id + 1]]
    }

    pub fn degree(&self, id: usize) -> usize {
        self.offsets[id + 1] - self.offsets[id]
    }
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

fn random_edges<R: Rng + ?Sized>(n: usize, contacts: usize, rng: &mut R) -> Result<Vec<(u32, u32)>> {
    if n < 2 || contacts == 0 {
        return Ok(Vec::new());
    }

    // Dense requests: include each pair independently.
    if 2 * contacts > n - 1 {
        let prob = contacts as f64 / (n - 1) as f64;
        let edge_dist = Bernoulli::new(prob.min(1.0)).map_err(|err| {
            Error::InvariantViolation(format!("invalid edge probability {prob}: {err}"))
        })?;
        let mut edges = Vec::with_capacity(n * contacts / 2);
        for a in 0..n as u32 {
            for b in a + 1..n as u32 {
                if edge_dist.sample(rng) {
                    edges.push((a, b));
                }
            }
        }
        return Ok(edges);
    }

    // Sparse requests: sample a fixed number of distinct edges.
    let n_edges = (n * contacts).div_ceil(2);
    let id_dist = Uniform::new(0, n as u32)
        .map_err(|err| Error::InvariantViolation(format!("invalid id range 0..{n}: {err}")))?;
    let mut seen = FxHashSet::with_capacity_and_hasher(n_edges, Default::default());
    let mut edges = Vec::with_capacity(n_edges);
    while edges.len() < n_edges {
        let a = id_dist.sample(rng);
        let b = id_dist.sample(rng);
        if a != b && seen.insert(edge_key(a, b)) {
            edges.push((a, b));
        }
    }
    Ok(edges)
}

fn lattice_edges(n: usize, contacts: usize) -> Vec<(u32, u32)> {
    let half = contacts / 2;
    let mut edges = Vec::with_capacity(n * half);
    for i in 0..n {
        for j in 1..=half {
            edges.push((i as u32, ((i + j) % n) as u32));
        }
    }
    edges
}

fn rewire_edges<R: Rng + ?Sized>(
    n: usize,
    edges: &mut [(u32, u32)],
    rewiring: f64,
    rng: &mut R,
) -> Result<()> {
    if edges.is_empty() {
        return Ok(());
    }
    let rewire_dist = Bernoulli::new(rewiring).map_err(|err| {
        Error::InvariantViolation(format!("invalid rewiring probability {rewiring}: {err}"))
    })?;
    let id_dist = Uniform::new(0, n as u32)
        .map_err(|err| Error::InvariantViolation(format!("invalid id range 0..{n}: {err}")))?;

    let mut seen: FxHashSet<_> = edges.iter().map(|&(a, b)| edge_key(a, b)).collect();
    for edge in edges.iter_mut() {
        if !rewire_dist.sample(rng) {
            continue;
        }
        let (a, b) = *edge;
        for _ in 0..MAX_REWIRE_ATTEMPTS {
            let c = id_dist.sample(rng);
            if c == a || !seen.insert(edge_key(a, c)) {
                continue;
            }
            seen.remove(&edge_key(a, b));
            *edge = (a, c);
            break;
        }
    }
    Ok(())
}
