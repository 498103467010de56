//! Closed-form herd-immunity threshold.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Compute the herd-immunity threshold `1 - 1/R0`.
///
/// For `0 < R0 < 1` the result is negative, meaning no immunity is required
/// to stop transmission; see [`HerdImmunity::required_fraction`].
///
/// # Errors
/// Returns [`Error::InvalidParameter`] if `R0` is not a finite number greater than 0.
pub fn herd_immunity_threshold(r0: f64) -> Result<f64> {
    if !r0.is_finite() {
        return Err(Error::invalid("R0", format!("must be a finite number, but is {r0}")));
    }
    if r0 <= 0.0 {
        return Err(Error::invalid("R0", format!("must be greater than 0, but is {r0}")));
    }
    Ok(1.0 - 1.0 / r0)
}

/// Threshold response: `{ "R0": ..., "herd_immunity_threshold": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HerdImmunity {
    #[serde(rename = "R0")]
    pub r0: f64,
    pub herd_immunity_threshold: f64,
}

impl HerdImmunity {
    pub fn new(r0: f64) -> Result<Self> {
        let herd_immunity_threshold = herd_immunity_threshold(r0)?;
        Ok(Self {
            r0,
            herd_immunity_threshold,
        })
    }

    /// Immune fraction actually needed, with sub-critical `R0` mapped to 0.
    pub fn required_fraction(&self) -> f64 {
        self.herd_immunity_threshold.max(0.0)
    }
}
