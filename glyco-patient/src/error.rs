use thiserror::Error;

use crate::{
    config::ConfigError, gateway::GatewayError, profile::ProfileError,
    simulation::IntegrationError,
};

/// Any error that ends a virtual-patient run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to encode outbound message")]
    Encode(#[from] serde_json::Error),
}
