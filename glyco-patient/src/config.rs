//! Process configuration, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `MQTT_HOST` | required |
//! | `MQTT_PORT` | required |
//! | `USERNAME`, `PASSWORD` | no credentials |
//! | `TEAM_NAME` | required |
//! | `INSULIN_TOPIC` | `cis441-541/<team>/insulin-pump` |
//! | `CGM_TOPIC` | `cis441-541/<team>/cgm` |
//! | `PATIENT_PROFILE` | `patient_profile.json` |
//! | `LOG_LEVEL` | `info` |
//! | `SOLVER_ABS_TOL`, `SOLVER_REL_TOL` | `1e-8`, `1e-6` |

use std::{path::PathBuf, str::FromStr};

use glyco_components::solver::ode::Method;
use thiserror::Error;
use tracing::Level;

use crate::topics::Topics;

#[cfg(feature = "mqtt")]
use crate::gateway::MqttSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not set")]
    Missing { var: &'static str },
    #[error("{var} has invalid value `{value}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the binary needs before it can start a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Username and password.
    pub credentials: Option<(String, String)>,
    pub team: String,
    pub topics: Topics,
    pub profile_path: PathBuf,
    pub log_level: Level,
    pub method: Method,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let host = require("MQTT_HOST")?;
        let port = parse("MQTT_PORT", &require("MQTT_PORT")?)?;
        let credentials =
            get("USERNAME").map(|username| (username, get("PASSWORD").unwrap_or_default()));

        let team = require("TEAM_NAME")?;
        let mut topics = Topics::for_team(&team);
        if let Some(insulin) = get("INSULIN_TOPIC") {
            topics = topics.with_insulin(insulin);
        }
        if let Some(cgm) = get("CGM_TOPIC") {
            topics = topics.with_cgm(cgm);
        }

        let profile_path = get("PATIENT_PROFILE")
            .map_or_else(|| PathBuf::from("patient_profile.json"), PathBuf::from);

        let log_level = match get("LOG_LEVEL") {
            Some(level) => parse("LOG_LEVEL", &level)?,
            None => Level::INFO,
        };

        let abs_tol = tolerance("SOLVER_ABS_TOL", get("SOLVER_ABS_TOL"), 1e-8)?;
        let rel_tol = tolerance("SOLVER_REL_TOL", get("SOLVER_REL_TOL"), 1e-6)?;

        Ok(Self {
            host,
            port,
            credentials,
            team,
            topics,
            profile_path,
            log_level,
            method: Method::Dopri5 { abs_tol, rel_tol },
        })
    }

    /// The MQTT client id, unique per team.
    #[must_use]
    pub fn client_id(&self) -> String {
        format!("virtual-patient-{}", self.team)
    }

    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn mqtt_settings(&self) -> MqttSettings {
        let settings = MqttSettings::new(&self.host, self.port, self.client_id());
        match &self.credentials {
            Some((username, password)) => settings.with_credentials(username, password),
            None => settings,
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason: error.to_string(),
    })
}

fn tolerance(var: &'static str, value: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let tolerance: f64 = parse(var, &value)?;
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(tolerance)
    } else {
        Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be a positive number".into(),
        })
    }
}
