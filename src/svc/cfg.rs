//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{convert::TryFrom, net::SocketAddr, path::PathBuf};

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_REQUEUE: u64 = 10;
pub const DEFAULT_RESYNC: u64 = 300;

// -----------------------------------------------------------------------------
// Operator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Operator {
    /// socket address of the health and metrics server
    #[serde(rename = "listen")]
    pub listen: SocketAddr,
    /// delay in seconds before a resource is reconciled again when its
    /// secrets are not ready or the reconciliation failed
    #[serde(rename = "requeue")]
    pub requeue: u64,
    /// delay in seconds before a resource whose secrets are ready is
    /// reconciled again, so that secrets not owned by the operator, like the
    /// cluster ca certificate, are fingerprinted again
    #[serde(rename = "resync")]
    pub resync: u64,
}

// -----------------------------------------------------------------------------
// ConfigurationError enum

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to build configuration, {0}")]
    Build(ConfigError),
    #[error("failed to load configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structures

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    #[serde(rename = "operator")]
    pub operator: Operator,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = ConfigurationError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::try_build(defaults()?.add_source(File::from(path).required(true)))
    }
}

impl Configuration {
    /// returns the configuration read from the environment and the default
    /// locations, none of the files are required
    pub fn try_default() -> Result<Self, ConfigurationError> {
        let mut builder = defaults()?;

        for path in search_paths() {
            builder = builder.add_source(File::from(path).required(false));
        }

        Self::try_build(builder)
    }

    fn try_build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigurationError> {
        builder
            .add_source(environment())
            .build()
            .map_err(ConfigurationError::Build)?
            .try_deserialize()
            .map_err(ConfigurationError::Cast)
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigurationError> {
    Config::builder()
        .set_default("operator.listen", DEFAULT_LISTEN)
        .map_err(|err| ConfigurationError::Default("operator.listen".into(), err))?
        .set_default("operator.requeue", DEFAULT_REQUEUE as i64)
        .map_err(|err| ConfigurationError::Default("operator.requeue".into(), err))?
        .set_default("operator.resync", DEFAULT_RESYNC as i64)
        .map_err(|err| ConfigurationError::Default("operator.resync".into(), err))
}

/// returns the environment source, variables are prefixed by the package
/// name, e.g. `MANAGED_KAFKA_OPERATOR_OPERATOR__REQUEUE`
fn environment() -> Environment {
    Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// returns the locations looked up for a configuration file, from the lowest
/// to the highest precedence
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
        PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
    ];

    if let Some(home) = std::env::var_os("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config")
                .join(env!("CARGO_PKG_NAME"))
                .join("config"),
        );
    }

    paths.push(PathBuf::from("config"));
    paths
}
