//! # Store module
//!
//! This module provide the authoritative store of secrets and its kubernetes
//! implementation

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{DeleteParams, PostParams},
    Api, Client,
};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::svc::k8s::{resource, secret::Error};

// -----------------------------------------------------------------------------
// SecretStore trait

/// authoritative read and write access to secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// returns the secret, or none if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// creates the secret if absent, otherwise replaces the fields managed by
    /// this operator
    async fn upsert(&self, secret: &Secret) -> Result<Secret, Error>;

    /// deletes the secret, returns false if there was nothing to delete
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error>;
}

// -----------------------------------------------------------------------------
// KubeStore structure

/// [`SecretStore`] backed by the kubernetes api server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl From<Client> for KubeStore {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

impl KubeStore {
    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.to_owned(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    #[cfg_attr(feature = "trace", tracing::instrument(skip(self)))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        debug!(
            kind = "Secret",
            namespace = namespace,
            name = name,
            "execute a request to retrieve secret"
        );
        match self.api(namespace).get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(Error::Kube(err)),
        }
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn upsert(&self, secret: &Secret) -> Result<Secret, Error> {
        let (namespace, name) = resource::namespaced_name(secret)?;

        if let Some(current) = self.get(&namespace, &name).await? {
            let modified = overlay(&current, secret);
            let patch = resource::diff(&current, &modified).map_err(Error::Diff)?;

            debug!(
                kind = "Secret",
                namespace = &namespace,
                name = &name,
                "execute a request to update secret"
            );
            return Ok(resource::patch(self.client.to_owned(), &modified, patch).await?);
        }

        debug!(
            kind = "Secret",
            namespace = &namespace,
            name = &name,
            "execute a request to create secret"
        );
        Ok(self
            .api(&namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip(self)))]
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        debug!(
            kind = "Secret",
            namespace = namespace,
            name = name,
            "execute a request to delete secret"
        );
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(false),
            Err(err) => Err(Error::Kube(err)),
        }
    }
}

/// returns the current secret with the fields owned by this operator taken
/// from the desired one
///
/// The desired secret may have been built from a stale cached copy, so only
/// the managed fields are carried over to keep the patch minimal.
pub fn overlay(current: &Secret, desired: &Secret) -> Secret {
    let mut modified = current.to_owned();

    modified.metadata.labels = desired.metadata.labels.to_owned();
    modified.metadata.owner_references = desired.metadata.owner_references.to_owned();
    modified.type_ = desired.type_.to_owned();
    modified.data = desired.data.to_owned();
    modified
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    use super::*;

    #[test]
    fn overlay_keeps_server_side_metadata() {
        let current = Secret {
            metadata: ObjectMeta {
                name: Some("my-kafka-tls-secret".into()),
                namespace: Some("kafka".into()),
                resource_version: Some("42".into()),
                annotations: Some(BTreeMap::from([("a".into(), "b".into())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "stale".into(),
                ByteString(b"x".to_vec()),
            )])),
            ..Default::default()
        };

        let desired = Secret {
            metadata: ObjectMeta {
                name: Some("my-kafka-tls-secret".into()),
                namespace: Some("kafka".into()),
                resource_version: Some("41".into()),
                labels: Some(resource::default_labels()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".into()),
            data: Some(BTreeMap::from([(
                "tls.crt".into(),
                ByteString(b"C".to_vec()),
            )])),
            ..Default::default()
        };

        let modified = overlay(&current, &desired);

        assert_eq!(modified.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(modified.metadata.annotations, current.metadata.annotations);
        assert_eq!(modified.metadata.labels, Some(resource::default_labels()));
        assert_eq!(modified.type_.as_deref(), Some("kubernetes.io/tls"));
        assert_eq!(modified.data, desired.data);
    }
}
