//! # Kubernetes module
//!
//! This module provide kubernetes custom resources reconcilers, helpers and
//! the derived secrets management

use std::{error::Error, fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kube::{
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    CustomResourceExt, Resource, ResourceExt,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use serde::de::DeserializeOwned;
use tokio::time::{sleep_until, Instant};
#[cfg(feature = "trace")]
use tracing::Instrument;
use tracing::{debug, error, info, trace};

use crate::svc::{cfg::Configuration, k8s::secret::SecuritySecretManager};

pub mod client;
pub mod finalizer;
pub mod managed_kafka;
pub mod recorder;
pub mod resource;
pub mod secret;

// -----------------------------------------------------------------------------
// constants

pub const RECONCILIATION_UPSERT_EVENT: &str = "upsert";
pub const RECONCILIATION_DELETE_EVENT: &str = "delete";

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static RECONCILIATION_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "managed_kafka_operator_reconciliation_success",
            "number of successful reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'managed_kafka_operator_reconciliation_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "managed_kafka_operator_reconciliation_failed",
            "number of failed reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'managed_kafka_operator_reconciliation_failed' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_EVENT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "managed_kafka_operator_reconciliation_event",
            "number of upsert or delete events",
        ),
        &["kind", "namespace", "event"]
    )
    .expect("metrics 'managed_kafka_operator_reconciliation_event' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "managed_kafka_operator_reconciliation_duration",
            "duration of reconciliation",
        ),
        &["kind", "unit"]
    )
    .expect("metrics 'managed_kafka_operator_reconciliation_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// State structure

/// contains the kubernetes client, the secrets manager and the configuration
/// shared by reconcilers
#[derive(Clone)]
pub struct State {
    pub kube: kube::Client,
    pub secrets: SecuritySecretManager,
    pub config: Arc<Configuration>,
}

impl From<(kube::Client, SecuritySecretManager, Arc<Configuration>)> for State {
    fn from(
        (kube, secrets, config): (kube::Client, SecuritySecretManager, Arc<Configuration>),
    ) -> Self {
        Self {
            kube,
            secrets,
            config,
        }
    }
}

impl State {
    pub fn new(k: kube::Client, s: SecuritySecretManager, c: Arc<Configuration>) -> Self {
        Self::from((k, s, c))
    }
}

// -----------------------------------------------------------------------------
// ControllerBuilder trait

/// provides a common way to create a kubernetes
/// controller [`Controller<T>`]
pub trait ControllerBuilder<T>
where
    T: Resource + Clone + Debug,
    <T as Resource>::DynamicType: Eq + Hash,
{
    /// returns a new created kubernetes controller
    fn build(&self, state: State) -> Controller<T>;
}

// -----------------------------------------------------------------------------
// Reconciler trait

/// provides two method which is given to a kubenetes controller
/// [`Controller<T>`]
#[async_trait]
pub trait Reconciler<T>
where
    T: ResourceExt + CustomResourceExt + Debug + Clone + Send + Sync + 'static,
{
    type Error: Error + Send + Sync;

    /// create or update the object, this is part of the the reconcile function
    async fn upsert(ctx: Arc<State>, obj: Arc<T>) -> Result<Action, Self::Error>;

    /// delete the object from kubernetes
    async fn delete(ctx: Arc<State>, obj: Arc<T>) -> Result<Action, Self::Error>;

    /// returns a [`Action`] to perform following the given error
    fn retry(_obj: Arc<T>, err: &Self::Error, ctx: Arc<State>) -> Action {
        let requeue = ctx.config.operator.requeue;

        trace!(
            duration = requeue,
            error = err.to_string(),
            "Requeue failed reconciliation"
        );
        Action::requeue(Duration::from_secs(requeue))
    }

    /// process the object and perform actions on kubernetes returns a
    /// [`Action`] to maybe perform another reconciliation or an error, if
    /// something gets wrong.
    async fn reconcile(obj: Arc<T>, ctx: Arc<State>) -> Result<Action, Self::Error> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let api_resource = T::api_resource();

        if resource::deleted(&*obj) {
            info!(
                kind = &api_resource.kind,
                uid = ?obj.meta().uid,
                name = &name,
                namespace = &namespace,
                "Received deletion event for custom resource"
            );
            #[cfg(feature = "metrics")]
            RECONCILIATION_EVENT
                .with_label_values(&[&api_resource.kind, &namespace, RECONCILIATION_DELETE_EVENT])
                .inc();

            #[cfg(not(feature = "trace"))]
            let result = Self::delete(ctx, obj.to_owned()).await;
            #[cfg(feature = "trace")]
            let result = Self::delete(ctx, obj.to_owned())
                .instrument(tracing::info_span!("Reconciler::delete"))
                .await;

            if let Err(err) = &result {
                error!(
                    kind = &api_resource.kind,
                    uid = ?obj.meta().uid,
                    name = &name,
                    namespace = &namespace,
                    error = err.to_string(),
                    "Failed to delete custom resource"
                );
            }

            return result;
        }

        info!(
            kind = &api_resource.kind,
            uid = ?obj.meta().uid,
            name = &name,
            namespace = &namespace,
            "Received upsertion event for custom resource"
        );
        #[cfg(feature = "metrics")]
        RECONCILIATION_EVENT
            .with_label_values(&[&api_resource.kind, &namespace, RECONCILIATION_UPSERT_EVENT])
            .inc();

        #[cfg(not(feature = "trace"))]
        let result = Self::upsert(ctx, obj.to_owned()).await;
        #[cfg(feature = "trace")]
        let result = Self::upsert(ctx, obj.to_owned())
            .instrument(tracing::info_span!("Reconciler::upsert"))
            .await;

        if let Err(err) = &result {
            error!(
                kind = &api_resource.kind,
                uid = ?obj.meta().uid,
                name = &name,
                namespace = &namespace,
                error = err.to_string(),
                "Failed to upsert custom resource"
            );
        }

        result
    }
}

// -----------------------------------------------------------------------------
// WatcherError trait

/// group other trait needed to provide a default
/// implementation for [`Watcher<T>`] trait
pub trait WatcherError:
    From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error
where
    Self: 'static,
{
}

/// Blanklet implementation of [`WatcherError<T>`]
impl<T> WatcherError for T
where
    T: From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error,
    Self: 'static,
{
}

// -----------------------------------------------------------------------------
// Watcher trait

/// provides a watch method that listen to events of
/// kubernetes custom resource using a [`Controller<T>`]
#[async_trait]
pub trait Watcher<T>: ControllerBuilder<T> + Reconciler<T>
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync,
    Self: Send + Sync + 'static,
    <Self as Reconciler<T>>::Error: WatcherError + Send + Sync,
{
    type Error: WatcherError + Send + Sync;

    /// listen for events of the custom resource as generic parameter
    async fn watch(&self, state: State) -> Result<(), <Self as Watcher<T>>::Error> {
        let context = Arc::new(state.to_owned());
        let api_resource = T::api_resource();
        let mut stream = self
            .build(state.to_owned())
            .run(Self::reconcile, Self::retry, context)
            .boxed();

        loop {
            let instant = Instant::now();

            match stream.try_next().await {
                Ok(None) => {
                    debug!("We have reached the end of the infinite watch stream");
                    return Ok(());
                }
                Ok(Some((obj, _action))) => {
                    info!(
                        kind = &api_resource.kind,
                        name = &obj.name,
                        namespace = ?obj.namespace,
                        "Successfully reconcile resource"
                    );
                    #[cfg(feature = "metrics")]
                    RECONCILIATION_SUCCESS
                        .with_label_values(&[&api_resource.kind])
                        .inc();
                }
                Err(controller::Error::ObjectNotFound(obj_ref)) => {
                    debug!(
                        name = &obj_ref.name,
                        namespace = ?obj_ref.namespace,
                        "Received an event about an already deleted resource"
                    );
                    #[cfg(feature = "metrics")]
                    RECONCILIATION_SUCCESS
                        .with_label_values(&[&api_resource.kind])
                        .inc();
                }
                Err(err) => {
                    error!(
                        kind = &api_resource.kind,
                        error = err.to_string(),
                        "Failed to reconcile resource"
                    );
                    #[cfg(feature = "metrics")]
                    RECONCILIATION_FAILED
                        .with_label_values(&[&api_resource.kind])
                        .inc();
                }
            }

            #[cfg(feature = "metrics")]
            RECONCILIATION_DURATION
                .with_label_values(&[&api_resource.kind, "us"])
                .inc_by(Instant::now().duration_since(instant).as_micros() as f64);

            sleep_until(instant + Duration::from_millis(100)).await;
        }
    }
}

/// Blanklet implementation for [`Watcher<T>`]
impl<T, U> Watcher<T> for U
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync,
    U: Reconciler<T> + ControllerBuilder<T>,
    U::Error: WatcherError + Send + Sync,
    Self: Send + Sync + 'static,
{
    type Error = U::Error;
}
