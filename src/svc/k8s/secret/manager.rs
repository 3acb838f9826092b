//! # Manager module
//!
//! This module converges the secrets derived from a [`ManagedKafka`] and
//! answers readiness questions about the secrets workloads depend on.

use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::api::core::v1::Secret;

use crate::svc::{
    crd::managed_kafka::ManagedKafka,
    k8s::{
        resource,
        secret::{
            builder::{
                self, canary_sasl_secret_name, cluster_ca_cert_secret_name,
                is_canary_service_account_present, is_kafka_authentication_enabled,
                is_kafka_external_certificate_enabled, is_sso_client_secret_present,
                is_sso_trusted_certificate_present, kafka_tls_secret_name, sso_client_secret_name,
                sso_tls_secret_name, SecretKind,
            },
            digest,
            reader::{Fallback, SecretReader, StoreBacked},
            store::SecretStore,
            Error,
        },
    },
};

// -----------------------------------------------------------------------------
// Dependencies

/// returns the secrets, and their keys, consumed by the kafka brokers
pub fn kafka_secret_dependencies(mk: &ManagedKafka) -> BTreeMap<String, Vec<String>> {
    let mut dependencies = BTreeMap::new();

    if is_kafka_external_certificate_enabled(mk) {
        dependencies.insert(
            kafka_tls_secret_name(mk),
            vec![builder::TLS_CERT.to_string(), builder::TLS_KEY.to_string()],
        );
    }

    if is_sso_client_secret_present(mk) {
        dependencies.insert(
            sso_client_secret_name(mk),
            vec![builder::SSO_CLIENT_SECRET.to_string()],
        );
    }

    if is_sso_trusted_certificate_present(mk) {
        dependencies.insert(
            sso_tls_secret_name(mk),
            vec![builder::SSO_TLS_CERT.to_string()],
        );
    }

    dependencies
}

/// returns the secrets, and their keys, consumed by the canary
pub fn canary_secret_dependencies(mk: &ManagedKafka) -> BTreeMap<String, Vec<String>> {
    let mut dependencies = BTreeMap::from([(
        cluster_ca_cert_secret_name(mk),
        vec![builder::CLUSTER_CA_CERT.to_string()],
    )]);

    if is_canary_service_account_present(mk) {
        dependencies.insert(
            canary_sasl_secret_name(mk),
            vec![
                builder::SASL_PRINCIPAL.to_string(),
                builder::SASL_PASSWORD.to_string(),
            ],
        );
    }

    dependencies
}

// -----------------------------------------------------------------------------
// SecuritySecretManager structure

/// owns the lifecycle of the secrets derived from managed kafka resources.
///
/// It keeps no state about resources, so a single instance can serve
/// concurrent reconciliations of different resources.
#[derive(Clone)]
pub struct SecuritySecretManager {
    store: Arc<dyn SecretStore>,
    cache: Arc<dyn SecretReader>,
}

impl SecuritySecretManager {
    pub fn new(store: Arc<dyn SecretStore>, cache: Arc<dyn SecretReader>) -> Self {
        Self { store, cache }
    }

    /// returns a reader asking the cache first and the store on a miss
    pub fn reader(&self) -> Fallback<Arc<dyn SecretReader>, StoreBacked> {
        Fallback::new(
            self.cache.to_owned(),
            StoreBacked::from(self.store.to_owned()),
        )
    }

    /// converges the derived secrets of the resource: secrets whose condition
    /// holds are created or updated, the others are deleted if they exist.
    ///
    /// Every kind is attempted even if a previous one failed, the first error
    /// is returned once all of them have been processed.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_or_update(&self, mk: &ManagedKafka) -> Result<(), Error> {
        let (namespace, _) = resource::namespaced_name(mk)?;
        let reader = self.reader();
        let mut failure = None;

        for kind in SecretKind::ALL {
            if let Err(err) = self.converge(&reader, kind, mk, &namespace).await {
                failure.get_or_insert(err);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn converge<R>(
        &self,
        reader: &R,
        kind: SecretKind,
        mk: &ManagedKafka,
        namespace: &str,
    ) -> Result<(), Error>
    where
        R: SecretReader,
    {
        let name = kind.secret_name(mk);
        let current = reader.lookup(namespace, &name).await?;
        let owned = current
            .as_ref()
            .map_or(false, |secret| resource::is_owned_by(secret, mk));

        match builder::build(kind, mk, current)? {
            Some(desired) => {
                self.store.upsert(&desired).await?;
            }
            None if owned => {
                self.store.delete(namespace, &name).await?;
            }
            // absent, or owned by someone else
            None => {}
        }

        Ok(())
    }

    /// deletes the secrets of the features enabled on the resource, this is
    /// the teardown path of a resource being removed.
    ///
    /// The canary secret is left to the garbage collection of its owner.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete(&self, mk: &ManagedKafka) -> Result<(), Error> {
        let (namespace, _) = resource::namespaced_name(mk)?;

        if is_kafka_external_certificate_enabled(mk) {
            self.store
                .delete(&namespace, &kafka_tls_secret_name(mk))
                .await?;
        }

        if is_kafka_authentication_enabled(mk) {
            self.store
                .delete(&namespace, &sso_client_secret_name(mk))
                .await?;

            if is_sso_trusted_certificate_present(mk) {
                self.store
                    .delete(&namespace, &sso_tls_secret_name(mk))
                    .await?;
            }
        }

        Ok(())
    }

    /// returns if the secrets of every feature enabled on the resource are gone
    /// from the cache
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn is_deleted(&self, mk: &ManagedKafka) -> Result<bool, Error> {
        let (namespace, _) = resource::namespaced_name(mk)?;
        let mut names = vec![];

        if is_kafka_external_certificate_enabled(mk) {
            names.push(kafka_tls_secret_name(mk));
        }

        if is_kafka_authentication_enabled(mk) {
            names.push(sso_client_secret_name(mk));
            names.push(sso_tls_secret_name(mk));
        }

        for name in names {
            if self.cache.lookup(&namespace, &name).await?.is_some() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// returns if every given secret exists and holds every given key
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn secret_keys_exist(
        &self,
        mk: &ManagedKafka,
        secret_keys: &BTreeMap<String, Vec<String>>,
    ) -> Result<bool, Error> {
        let (namespace, _) = resource::namespaced_name(mk)?;
        let reader = self.reader();

        for (name, keys) in secret_keys {
            let secret = match reader.lookup(&namespace, name).await? {
                Some(secret) => secret,
                None => return Ok(false),
            };

            let data = secret.data.unwrap_or_default();
            if keys.iter().any(|key| !data.contains_key(key)) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// returns the digest of the content of the given secrets, absent secrets
    /// are skipped.
    ///
    /// Every entry of a resolved secret contributes, not only the given keys.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn digest(
        &self,
        mk: &ManagedKafka,
        secret_keys: &BTreeMap<String, Vec<String>>,
    ) -> Result<String, Error> {
        let (namespace, _) = resource::namespaced_name(mk)?;
        let reader = self.reader();
        let mut secrets: Vec<Secret> = vec![];

        for name in secret_keys.keys() {
            if let Some(secret) = reader.lookup(&namespace, name).await? {
                secrets.push(secret);
            }
        }

        Ok(digest::compute(secrets.iter()))
    }
}
