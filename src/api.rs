//! Request/response contract of the computation endpoints.
//!
//! Requests arrive as raw `key=value` query parameters and responses are JSON
//! bodies with a status code. Transport is left to the serving layer.

use crate::engine::OutbreakEngine;
use crate::error::Error;
use crate::params::{DEFAULT_ILLNESS_LENGTH, EngineOptions, OutbreakParams};
use crate::threshold::HerdImmunity;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::Serialize;
use std::{collections::BTreeMap, str::FromStr};

const R0_REQUIRED: &str = "R0 parameter is required and must be a valid number";
const PARAMS_REQUIRED: &str =
    "Required parameters: R0, population_size, ifr. Optional: illness_length (default 7)";

/// Raw query parameters of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(BTreeMap<String, String>);

impl Query {
    /// Parse `key=value` pairs separated by `&`. A leading `?` is ignored.
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, val)) => (key.to_string(), val.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self(pairs)
    }

    pub fn insert(&mut self, key: impl Into<String>, val: impl ToString) {
        self.0.insert(key.into(), val.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parsed value of `key`: `Ok(None)` if absent, `Err(())` if malformed.
    fn parse_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>, ()> {
        self.get(key)
            .map(|val| val.trim().parse().map_err(|_| ()))
            .transpose()
    }

    fn parse_req<T: FromStr>(&self, key: &str) -> Result<T, ()> {
        self.parse_opt(key)?.ok_or(())
    }

    /// Like [`Self::parse_req`], but `inf` and `NaN` count as malformed.
    fn parse_finite(&self, key: &str) -> Result<f64, ()> {
        self.parse_req::<f64>(key)
            .and_then(|val| if val.is_finite() { Ok(val) } else { Err(()) })
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::default();
        for (key, val) in iter {
            query.insert(key, val);
        }
        query
    }
}

/// Status code and JSON body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Response {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(err) => Self::from_error(&Error::InvariantViolation(format!(
                "failed to serialize response: {err}"
            ))),
        }
    }

    fn bad_request(message: &str) -> Self {
        Self::message(400, message)
    }

    fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }

    fn from_error(error: &Error) -> Self {
        Self::message(error.status_code(), &error.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `herd_immunity(R0)` endpoint.
pub fn herd_immunity(query: &Query) -> Response {
    let Ok(r0) = query.parse_finite("R0") else {
        return Response::bad_request(R0_REQUIRED);
    };
    match HerdImmunity::new(r0) {
        Ok(herd) => Response::ok(&herd),
        Err(_) => Response::bad_request("R0 must be greater than 0"),
    }
}

/// `simulate_outbreak(R0, population_size, ifr, illness_length?, contacts_per_individual?)` endpoint.
///
/// The run is seeded with `seed`; `options` carries the serving layer's limits.
pub fn simulate_outbreak(query: &Query, options: &EngineOptions, seed: u64) -> Response {
    let params = match parse_outbreak_params(query) {
        Ok(params) => params,
        Err(response) => return response,
    };

    log::debug!("simulate_outbreak request: {params:?}");

    let result = OutbreakEngine::new(params, options.clone()).and_then(|engine| {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        engine.run(&mut rng)
    });
    match result {
        Ok(result) => Response::ok(&result),
        Err(error) => Response::from_error(&error),
    }
}

/// Route a request of the form `endpoint?key=value&...` to its endpoint.
pub fn dispatch(request: &str, options: &EngineOptions, seed: u64) -> Response {
    let (endpoint, query) = request.split_once('?').unwrap_or((request, ""));
    let query = Query::parse(query);
    match endpoint.trim_matches('/') {
        "herd_immunity" => herd_immunity(&query),
        "simulate_outbreak" => simulate_outbreak(&query, options, seed),
        other => Response::message(404, &format!("unknown endpoint {other:?}")),
    }
}

fn parse_outbreak_params(query: &Query) -> Result<OutbreakParams, Response> {
    let bad_params = |_| Response::bad_request(PARAMS_REQUIRED);

    let r0 = query.parse_finite("R0").map_err(bad_params)?;
    let population_size: i64 = query.parse_req("population_size").map_err(bad_params)?;
    let ifr: f64 = query.parse_req("ifr").map_err(bad_params)?;
    let illness_length: i64 = query
        .parse_opt("illness_length")
        .map_err(bad_params)?
        .unwrap_or(DEFAULT_ILLNESS_LENGTH.into());
    let contacts: Option<i64> = query.parse_opt("contacts_per_individual").map_err(bad_params)?;

    if r0 <= 0.0 {
        return Err(Response::bad_request("R0 must be greater than 0"));
    }
    if population_size <= 0 {
        return Err(Response::bad_request("population_size must be greater than 0"));
    }
    if !(0.0..=1.0).contains(&ifr) {
        return Err(Response::bad_request("ifr must be between 0 and 1"));
    }
    let Ok(illness_length) = u32::try_from(illness_length) else {
        return Err(Response::bad_request("illness_length must be greater than 0"));
    };
    if illness_length == 0 {
        return Err(Response::bad_request("illness_length must be greater than 0"));
    }

    let population_size = population_size as usize;
    let mut params = OutbreakParams::new(r0, population_size, ifr, illness_length);
    if let Some(contacts) = contacts {
        match usize::try_from(contacts) {
            Ok(contacts) if contacts >= 1 && contacts < population_size => {
                params = params.with_contacts(contacts);
            }
            _ => {
                return Err(Response::bad_request(
                    "contacts_per_individual must be between 1 and population_size - 1",
                ));
            }
        }
    }
    Ok(params)
}
