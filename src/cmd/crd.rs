//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::sync::Arc;

use async_trait::async_trait;
use clap::Subcommand;
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{cfg::Configuration, crd::managed_kafka::ManagedKafka},
};

// -----------------------------------------------------------------------------
// CustomResourceDefinitionError enum

#[derive(thiserror::Error, Debug)]
pub enum CustomResourceDefinitionError {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[clap(name = "view", aliases = &["v"])]
    View,
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = CustomResourceDefinitionError;

    #[cfg_attr(feature = "trace", tracing::instrument(skip(config)))]
    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View => view(config).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

/// returns the custom resource definition of the managed kafka serialized as
/// yaml
pub fn render() -> Result<String, CustomResourceDefinitionError> {
    serde_yaml::to_string(&ManagedKafka::crd()).map_err(CustomResourceDefinitionError::Serialize)
}

#[cfg_attr(feature = "trace", tracing::instrument(skip(_config)))]
pub async fn view(_config: Arc<Configuration>) -> Result<(), CustomResourceDefinitionError> {
    print!("{}", render()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_managed_kafka_definition() {
        let crd = render().expect("custom resource definition to be serialized");

        assert!(crd.contains("name: managedkafkas.managedkafka.bf2.org"));
        assert!(crd.contains("kind: ManagedKafka"));
        assert!(crd.contains("- mk"));
        assert!(crd.contains("secretDependencyDigest"));
    }
}
