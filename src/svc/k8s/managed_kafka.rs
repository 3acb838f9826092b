//! # ManagedKafka reconciler
//!
//! This module provide the reconciler of the managed kafka custom resource,
//! it keeps the derived secrets converged and reports their readiness and
//! digests on the status

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    Api, Resource,
};
use tracing::{debug, info};

use crate::svc::{
    cfg::Operator,
    crd::managed_kafka::{ManagedKafka, Status},
    k8s::{
        self, finalizer, recorder, resource,
        secret::{
            self,
            manager::{canary_secret_dependencies, kafka_secret_dependencies},
            SecuritySecretManager,
        },
        ControllerBuilder, State,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const SECRETS_FINALIZER: &str = "managedkafka.bf2.org/secrets";

// -----------------------------------------------------------------------------
// ManagedKafkaAction enum

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum ManagedKafkaAction {
    UpsertFinalizer,
    UpsertSecrets,
    DeleteSecrets,
    DeleteFinalizer,
}

impl Display for ManagedKafkaAction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UpsertFinalizer => write!(f, "UpsertFinalizer"),
            Self::UpsertSecrets => write!(f, "UpsertSecrets"),
            Self::DeleteSecrets => write!(f, "DeleteSecrets"),
            Self::DeleteFinalizer => write!(f, "DeleteFinalizer"),
        }
    }
}

// -----------------------------------------------------------------------------
// ReconcilerError enum

#[derive(thiserror::Error, Debug)]
pub enum ReconcilerError {
    #[error("failed to reconcile resource, {0}")]
    Reconcile(String),
    #[error("failed to execute request on kubernetes api, {0}")]
    KubeClient(kube::Error),
    #[error("failed to converge derived secrets, {0}")]
    Secret(secret::Error),
    #[error("failed to read resource, {0}")]
    Resource(resource::Error),
    #[error("failed to compute diff between the original and modified object, {0}")]
    Diff(serde_json::Error),
}

impl From<kube::Error> for ReconcilerError {
    fn from(err: kube::Error) -> Self {
        Self::KubeClient(err)
    }
}

impl From<secret::Error> for ReconcilerError {
    fn from(err: secret::Error) -> Self {
        Self::Secret(err)
    }
}

impl From<resource::Error> for ReconcilerError {
    fn from(err: resource::Error) -> Self {
        Self::Resource(err)
    }
}

impl From<controller::Error<Self, watcher::Error>> for ReconcilerError {
    fn from(err: controller::Error<ReconcilerError, watcher::Error>) -> Self {
        Self::Reconcile(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the status reporting the readiness and the digests of the secrets
/// consumed by the kafka brokers and the canary
pub async fn secrets_status(
    secrets: &SecuritySecretManager,
    mk: &ManagedKafka,
) -> Result<Status, secret::Error> {
    let kafka = kafka_secret_dependencies(mk);
    let canary = canary_secret_dependencies(mk);

    Ok(Status {
        secrets_ready: Some(secrets.secret_keys_exist(mk, &kafka).await?),
        secret_dependency_digest: Some(secrets.digest(mk, &kafka).await?),
        canary_secret_dependency_digest: Some(secrets.digest(mk, &canary).await?),
    })
}

/// returns when the resource has to be reconciled again, soon while its
/// secrets are not ready, otherwise periodically as the cluster ca certificate
/// is not watched
pub fn next_action(ready: bool, operator: &Operator) -> Action {
    if ready {
        Action::requeue(Duration::from_secs(operator.resync))
    } else {
        Action::requeue(Duration::from_secs(operator.requeue))
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

#[derive(Clone, Default)]
pub struct Reconciler {}

impl ControllerBuilder<ManagedKafka> for Reconciler {
    fn build(&self, state: State) -> Controller<ManagedKafka> {
        Controller::new(
            Api::<ManagedKafka>::all(state.kube.to_owned()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Secret>::all(state.kube),
            watcher::Config::default().labels(&resource::default_selector()),
        )
    }
}

#[async_trait]
impl k8s::Reconciler<ManagedKafka> for Reconciler {
    type Error = ReconcilerError;

    async fn upsert(ctx: Arc<State>, origin: Arc<ManagedKafka>) -> Result<Action, ReconcilerError> {
        let State {
            kube,
            secrets,
            config,
        } = ctx.as_ref();
        let kind = ManagedKafka::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(origin.as_ref())?;

        // ---------------------------------------------------------------------
        // Step 1: set finalizer

        let modified = if finalizer::contains(origin.as_ref(), SECRETS_FINALIZER) {
            origin.as_ref().to_owned()
        } else {
            info!(
                kind = &kind,
                uid = ?origin.meta().uid,
                name = &name,
                namespace = &namespace,
                "Set finalizer on custom resource"
            );
            let modified = finalizer::add(origin.as_ref().to_owned(), SECRETS_FINALIZER);

            debug!(
                kind = &kind,
                uid = ?modified.meta().uid,
                name = &name,
                namespace = &namespace,
                "Update information of custom resource"
            );
            let patch =
                resource::diff(origin.as_ref(), &modified).map_err(ReconcilerError::Diff)?;
            let modified = resource::patch(kube.to_owned(), &modified, patch).await?;

            let action = &ManagedKafkaAction::UpsertFinalizer;
            let message = &format!("Create finalizer '{}'", SECRETS_FINALIZER);
            recorder::normal(kube.to_owned(), &modified, action, message).await?;

            modified
        };

        // ---------------------------------------------------------------------
        // Step 2: converge derived secrets

        info!(
            kind = &kind,
            uid = ?modified.meta().uid,
            name = &name,
            namespace = &namespace,
            "Upsert derived secrets of custom resource"
        );
        secrets.create_or_update(&modified).await?;

        // ---------------------------------------------------------------------
        // Step 3: report readiness and digests

        let status = secrets_status(secrets, &modified).await?;
        let ready = status.secrets_ready.unwrap_or_default();
        let mut updated = modified.to_owned();
        updated.set_status(status);

        let patch = resource::diff(&modified, &updated).map_err(ReconcilerError::Diff)?;
        if !patch.0.is_empty() {
            debug!(
                kind = &kind,
                uid = ?updated.meta().uid,
                name = &name,
                namespace = &namespace,
                ready = ready,
                "Update status of custom resource"
            );
            let updated = resource::patch_status(kube.to_owned(), updated, patch).await?;

            let digest = updated
                .status
                .as_ref()
                .and_then(|status| status.secret_dependency_digest.to_owned())
                .unwrap_or_default();

            let action = &ManagedKafkaAction::UpsertSecrets;
            if ready {
                let message = &format!("Derived secrets are ready, dependency digest '{}'", digest);
                recorder::normal(kube.to_owned(), &updated, action, message).await?;
            } else {
                let message = "Derived secrets are not ready, some keys are missing";
                recorder::warning(kube.to_owned(), &updated, action, message).await?;
            }
        }

        Ok(next_action(ready, &config.operator))
    }

    async fn delete(ctx: Arc<State>, origin: Arc<ManagedKafka>) -> Result<Action, ReconcilerError> {
        let State {
            kube,
            secrets,
            config,
        } = ctx.as_ref();
        let kind = ManagedKafka::kind(&()).to_string();
        let (namespace, name) = resource::namespaced_name(origin.as_ref())?;

        if !finalizer::contains(origin.as_ref(), SECRETS_FINALIZER) {
            return Ok(Action::await_change());
        }

        // ---------------------------------------------------------------------
        // Step 1: delete derived secrets

        info!(
            kind = &kind,
            uid = ?origin.meta().uid,
            name = &name,
            namespace = &namespace,
            "Delete derived secrets of custom resource"
        );
        secrets.delete(origin.as_ref()).await?;

        if !secrets.is_deleted(origin.as_ref()).await? {
            debug!(
                kind = &kind,
                uid = ?origin.meta().uid,
                name = &name,
                namespace = &namespace,
                "Derived secrets are still present, requeue deletion"
            );
            return Ok(Action::requeue(Duration::from_secs(
                config.operator.requeue,
            )));
        }

        let action = &ManagedKafkaAction::DeleteSecrets;
        let message = "Delete derived secrets of custom resource";
        recorder::normal(kube.to_owned(), origin.as_ref(), action, message).await?;

        // ---------------------------------------------------------------------
        // Step 2: remove the finalizer

        info!(
            kind = &kind,
            uid = ?origin.meta().uid,
            name = &name,
            namespace = &namespace,
            "Remove finalizer on custom resource"
        );
        let modified = finalizer::remove(origin.as_ref().to_owned(), SECRETS_FINALIZER);

        let action = &ManagedKafkaAction::DeleteFinalizer;
        let message = "Delete finalizer from custom resource";
        recorder::normal(kube.to_owned(), &modified, action, message).await?;

        debug!(
            kind = &kind,
            uid = ?modified.meta().uid,
            name = &name,
            namespace = &namespace,
            "Update information of custom resource"
        );
        let patch = resource::diff(origin.as_ref(), &modified).map_err(ReconcilerError::Diff)?;
        resource::patch(kube.to_owned(), &modified, patch).await?;

        Ok(Action::await_change())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::svc::k8s::secret::{
        builder::{self, SecretKind},
        testing::{managed_kafka, secret, Features, InMemory, NAMESPACE},
    };

    fn manager(memory: &Arc<InMemory>) -> SecuritySecretManager {
        SecuritySecretManager::new(memory.to_owned(), memory.to_owned())
    }

    #[test]
    fn action_names() {
        assert_eq!(
            ManagedKafkaAction::UpsertFinalizer.to_string(),
            "UpsertFinalizer"
        );
        assert_eq!(
            ManagedKafkaAction::UpsertSecrets.to_string(),
            "UpsertSecrets"
        );
        assert_eq!(
            ManagedKafkaAction::DeleteSecrets.to_string(),
            "DeleteSecrets"
        );
        assert_eq!(
            ManagedKafkaAction::DeleteFinalizer.to_string(),
            "DeleteFinalizer"
        );
    }

    #[test]
    fn ready_resources_are_resynced() {
        let operator = Operator {
            listen: ([0, 0, 0, 0], 8000).into(),
            requeue: 10,
            resync: 300,
        };

        assert_eq!(
            next_action(false, &operator),
            Action::requeue(Duration::from_secs(10))
        );
        assert_eq!(
            next_action(true, &operator),
            Action::requeue(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn status_is_not_ready_before_convergence() {
        let memory = Arc::new(InMemory::default());
        let mk = managed_kafka(Features::full());

        let status = secrets_status(&manager(&memory), &mk)
            .await
            .expect("status to be computed");

        assert_eq!(status.secrets_ready, Some(false));
        // nothing is resolvable yet, so both digests are the empty input hash
        assert_eq!(
            status.secret_dependency_digest.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
        assert_eq!(
            status.canary_secret_dependency_digest,
            status.secret_dependency_digest
        );
    }

    #[tokio::test]
    async fn status_is_ready_after_convergence() {
        let memory = Arc::new(InMemory::default());
        let secrets = manager(&memory);
        let mk = managed_kafka(Features::full());

        secrets
            .create_or_update(&mk)
            .await
            .expect("secrets to be converged");
        let status = secrets_status(&secrets, &mk)
            .await
            .expect("status to be computed");

        assert_eq!(status.secrets_ready, Some(true));
        assert_ne!(
            status.secret_dependency_digest,
            status.canary_secret_dependency_digest
        );
    }

    #[tokio::test]
    async fn canary_digest_follows_the_cluster_ca() {
        let memory = Arc::new(InMemory::default());
        let secrets = manager(&memory);
        let mk = managed_kafka(Features::full());

        secrets
            .create_or_update(&mk)
            .await
            .expect("secrets to be converged");
        let before = secrets_status(&secrets, &mk)
            .await
            .expect("status to be computed");

        memory.insert(secret(
            NAMESPACE,
            &builder::cluster_ca_cert_secret_name(&mk),
            &[(builder::CLUSTER_CA_CERT, "cluster-ca")],
        ));
        let after = secrets_status(&secrets, &mk)
            .await
            .expect("status to be computed");

        assert_eq!(
            before.secret_dependency_digest,
            after.secret_dependency_digest
        );
        assert_ne!(
            before.canary_secret_dependency_digest,
            after.canary_secret_dependency_digest
        );
    }

    #[tokio::test]
    async fn status_is_not_ready_when_a_key_is_missing() {
        let memory = Arc::new(InMemory::default());
        let secrets = manager(&memory);
        let mk = managed_kafka(Features::full());

        secrets
            .create_or_update(&mk)
            .await
            .expect("secrets to be converged");
        memory.insert(secret(
            NAMESPACE,
            &SecretKind::KafkaTls.secret_name(&mk),
            &[(builder::TLS_CERT, "C")],
        ));

        let status = secrets_status(&secrets, &mk)
            .await
            .expect("status to be computed");
        assert_eq!(status.secrets_ready, Some(false));
    }
}
