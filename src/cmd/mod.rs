//! # Command module
//!
//! This module provide command line interface structures and helpers
use std::{io, path::PathBuf, process::abort, sync::Arc};

use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{reflector, watcher, WatchStreamExt},
    Api,
};
use tracing::{error, info, warn};

use crate::{
    cmd::crd::CustomResourceDefinitionError,
    svc::{
        cfg::Configuration,
        k8s::{
            client, managed_kafka, resource,
            secret::{reader::CacheBacked, store::KubeStore, SecuritySecretManager},
            State, Watcher,
        },
        telemetry,
    },
};

pub mod crd;

// -----------------------------------------------------------------------------
// Executor trait

#[async_trait]
pub trait Executor {
    type Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error>;
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command '{0}', {1}")]
    Execution(String, Arc<Error>),
    #[error("failed to execute command, {0}")]
    CustomResourceDefinition(CustomResourceDefinitionError),
    #[error("failed to run daemon, {0}")]
    Daemon(DaemonError),
}

// -----------------------------------------------------------------------------
// Command enum

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Interact with custom resource definition
    #[clap(name = "custom-resource-definition", aliases = &["crd"])]
    #[clap(subcommand)]
    CustomResourceDefinition(crd::CustomResourceDefinition),
}

#[async_trait]
impl Executor for Command {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::CustomResourceDefinition(crd) => crd
                .execute(config)
                .await
                .map_err(Error::CustomResourceDefinition)
                .map_err(|err| {
                    Error::Execution("custom-resource-definition".into(), Arc::new(err))
                }),
        }
    }
}

// -----------------------------------------------------------------------------
// Args struct

#[derive(Parser, Clone, Debug)]
#[clap(version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Args {
    /// Increase log verbosity
    #[clap(short = 'v', global = true, action = ArgAction::Count)]
    pub verbosity: u8,
    /// Specify location of kubeconfig
    #[clap(short = 'k', long = "kubeconfig", global = true)]
    pub kubeconfig: Option<PathBuf>,
    /// Specify location of configuration
    #[clap(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Check if configuration is healthy
    #[clap(short = 't', long = "check", global = true)]
    pub check: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

// -----------------------------------------------------------------------------
// DaemonError enum

#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error("failed to handle termintion signal, {0}")]
    SigTerm(io::Error),
    #[error("failed to create kubernetes client, {0}")]
    Client(client::Error),
}

impl From<DaemonError> for Error {
    fn from(err: DaemonError) -> Self {
        Self::Daemon(err)
    }
}

// -----------------------------------------------------------------------------
// daemon function

pub async fn daemon(
    kubeconfig: Option<PathBuf>,
    config: Arc<Configuration>,
) -> Result<(), DaemonError> {
    // -------------------------------------------------------------------------
    // Create a new kubernetes client from path if defined, or via the
    // environment or defaults locations
    let kube_client = client::try_new(kubeconfig)
        .await
        .map_err(DaemonError::Client)?;

    // -------------------------------------------------------------------------
    // Mirror the secrets managed by the operator in a local cache
    let (reader, writer) = reflector::store::<Secret>();
    let secrets = Api::<Secret>::all(kube_client.to_owned());
    let selector = resource::default_selector();
    let mirror = reflector(
        writer,
        watcher(secrets, watcher::Config::default().labels(&selector)),
    )
    .default_backoff();

    let mut handles = vec![tokio::spawn(async move {
        info!(
            selector = &selector,
            "Start to mirror secrets managed by the operator"
        );
        mirror
            .for_each(|event| async move {
                if let Err(err) = event {
                    warn!(error = err.to_string(), "Could not watch secrets");
                }
            })
            .await;
    })];

    // -------------------------------------------------------------------------
    // Create state to give to each reconciler
    let manager = SecuritySecretManager::new(
        Arc::new(KubeStore::from(kube_client.to_owned())),
        Arc::new(CacheBacked::from(reader)),
    );
    let state = State::new(kube_client, manager, config.to_owned());

    // -------------------------------------------------------------------------
    // Create reconcilers
    handles.push(tokio::spawn(async move {
        let reconciler = managed_kafka::Reconciler::default();

        info!("Start to listen for events of managed kafka custom resource");
        if let Err(err) = reconciler.watch(state).await {
            error!(
                error = err.to_string(),
                "Could not reconcile managed kafka custom resource"
            );
        }

        abort();
    }));

    // -------------------------------------------------------------------------
    // Serve health and metrics
    let listen = config.operator.listen;
    handles.push(tokio::spawn(async move {
        if let Err(err) = telemetry::serve(listen).await {
            error!(error = err.to_string(), "Could not serve http requests");
        }

        abort();
    }));

    // -------------------------------------------------------------------------
    // Wait for termination signal
    tokio::signal::ctrl_c()
        .await
        .map_err(DaemonError::SigTerm)?;

    // -------------------------------------------------------------------------
    // Cancel reconcilers
    handles.iter().for_each(|handle| handle.abort());

    for handle in handles {
        if let Err(err) = handle.await {
            if !err.is_cancelled() {
                error!(
                    error = err.to_string(),
                    "Could not wait for the task to complete"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_verbosity_and_paths() {
        let args =
            Args::try_parse_from(["managed-kafka-operator", "-vvv", "-c", "config.toml", "-t"])
                .expect("arguments to be parsed");

        assert_eq!(args.verbosity, 3);
        assert_eq!(args.config, Some(PathBuf::from("config.toml")));
        assert!(args.check);
        assert!(args.command.is_none());
    }

    #[test]
    fn parse_crd_alias() {
        let args = Args::try_parse_from(["managed-kafka-operator", "crd", "v"])
            .expect("arguments to be parsed");

        assert!(matches!(
            args.command,
            Some(Command::CustomResourceDefinition(
                crd::CustomResourceDefinition::View
            ))
        ));
    }
}
