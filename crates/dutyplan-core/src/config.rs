//! Environment-driven scheduler configuration.
//!
//! Every knob has a documented default; malformed values log a warning and
//! fall back instead of failing the run.

use std::time::Duration;

use tracing::warn;

use crate::SolverParams;

/// Names of the recognized environment variables.
pub const ENV_FAIRNESS_BAND: &str = "SCHEDULER_FAIRNESS_BAND";
pub const ENV_MAX_ONE_PER_DAY: &str = "SCHEDULER_MAX_ONE_DUTY_PER_DAY";
pub const ENV_BAND_PENALTY: &str = "SCHEDULER_BAND_PENALTY";
pub const ENV_MAX_EXTRA_DUTIES: &str = "SCHEDULER_MAX_EXTRA_DUTIES";
pub const ENV_TIME_LIMIT_SECONDS: &str = "SCHEDULER_TIME_LIMIT_SECONDS";
pub const ENV_NUM_WORKERS: &str = "SCHEDULER_NUM_WORKERS";

/// Scheduler configuration resolved from the process environment.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub fairness_band: Option<u32>,
    pub max_one_per_day: bool,
    pub band_penalty: i64,
    pub max_extra_duties: Option<u32>,
    pub time_limit_seconds: f64,
    pub num_workers: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fairness_band: Some(0),
            max_one_per_day: false,
            band_penalty: 5_000_000,
            max_extra_duties: Some(0),
            time_limit_seconds: 30.0,
            num_workers: 8,
        }
    }
}

impl SchedulerConfig {
    /// Read all `SCHEDULER_*` variables from the process environment.
    pub fn from_env() -> Self {
        let get = |name: &str| std::env::var(name).ok();
        Self {
            fairness_band: parse_optional_count(ENV_FAIRNESS_BAND, get(ENV_FAIRNESS_BAND), Some(0)),
            max_one_per_day: parse_switch(get(ENV_MAX_ONE_PER_DAY)),
            band_penalty: parse_penalty(get(ENV_BAND_PENALTY)),
            max_extra_duties: parse_optional_count(
                ENV_MAX_EXTRA_DUTIES,
                get(ENV_MAX_EXTRA_DUTIES),
                Some(0),
            ),
            time_limit_seconds: parse_time_limit(get(ENV_TIME_LIMIT_SECONDS)),
            num_workers: parse_num_workers(get(ENV_NUM_WORKERS)),
        }
    }

    pub fn solver_params(&self) -> SolverParams {
        SolverParams {
            fairness_band: self.fairness_band,
            max_one_per_day: self.max_one_per_day,
            time_limit: Duration::from_secs_f64(self.time_limit_seconds.max(1.0)),
            num_workers: self.num_workers,
            band_penalty: self.band_penalty,
            max_extra_duties: self.max_extra_duties,
        }
        .normalized()
    }
}

/// `int >= 0`, or `none`/`off`/`false` to disable the knob entirely.
fn parse_optional_count(name: &str, raw: Option<String>, default: Option<u32>) -> Option<u32> {
    let raw = match raw {
        Some(raw) => raw.trim().to_owned(),
        None => return default,
    };
    if raw.is_empty() {
        return default;
    }
    if matches!(raw.to_ascii_lowercase().as_str(), "none" | "off" | "false") {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(value) => Some(value.max(0) as u32),
        Err(_) => {
            warn!("invalid value for {name} ({raw}); using default");
            default
        }
    }
}

fn parse_switch(raw: Option<String>) -> bool {
    raw.map(|raw| {
        matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
    .unwrap_or(false)
}

fn parse_penalty(raw: Option<String>) -> i64 {
    let raw = match raw {
        Some(raw) => raw.trim().to_owned(),
        None => return 5_000_000,
    };
    if raw.is_empty() {
        return 5_000_000;
    }
    match raw.parse::<i64>() {
        Ok(value) => value.max(0),
        Err(_) => {
            warn!("invalid value for {ENV_BAND_PENALTY} ({raw}); using 5000000");
            5_000_000
        }
    }
}

fn parse_time_limit(raw: Option<String>) -> f64 {
    let raw = match raw {
        Some(raw) => raw.trim().to_owned(),
        None => return 30.0,
    };
    if raw.is_empty() {
        return 30.0;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.max(1.0),
        _ => {
            warn!("invalid value for {ENV_TIME_LIMIT_SECONDS} ({raw}); using 30s");
            30.0
        }
    }
}

fn parse_num_workers(raw: Option<String>) -> u32 {
    let raw = match raw {
        Some(raw) => raw.trim().to_owned(),
        None => return 8,
    };
    if raw.is_empty() {
        return 8;
    }
    match raw.parse::<i64>() {
        Ok(value) => value.max(1) as u32,
        Err(_) => {
            warn!("invalid value for {ENV_NUM_WORKERS} ({raw}); using 8");
            8
        }
    }
}
