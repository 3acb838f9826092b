//! # Reader module
//!
//! This module provide read access to secrets. The informer cache is a local
//! mirror of the api server which may lag behind it, so lookups that must not
//! be fooled by a cache miss compose it with the authoritative store using
//! [`Fallback`].

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::{ObjectRef, Store};

use crate::svc::k8s::secret::{store::SecretStore, Error};

// -----------------------------------------------------------------------------
// SecretReader trait

#[async_trait]
pub trait SecretReader: Send + Sync {
    /// returns the secret, or none if it is not known by this reader
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;
}

#[async_trait]
impl<T> SecretReader for Arc<T>
where
    T: SecretReader + ?Sized,
{
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        (**self).lookup(namespace, name).await
    }
}

// -----------------------------------------------------------------------------
// CacheBacked structure

/// reads secrets from the reflector store populated by a watcher, never
/// reaches the network
#[derive(Clone)]
pub struct CacheBacked {
    store: Store<Secret>,
}

impl From<Store<Secret>> for CacheBacked {
    fn from(store: Store<Secret>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SecretReader for CacheBacked {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let key = ObjectRef::<Secret>::new(name).within(namespace);

        Ok(self.store.get(&key).map(|secret| (*secret).to_owned()))
    }
}

// -----------------------------------------------------------------------------
// StoreBacked structure

/// reads secrets from the authoritative store
#[derive(Clone)]
pub struct StoreBacked {
    store: Arc<dyn SecretStore>,
}

impl From<Arc<dyn SecretStore>> for StoreBacked {
    fn from(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SecretReader for StoreBacked {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        self.store.get(namespace, name).await
    }
}

// -----------------------------------------------------------------------------
// Fallback structure

/// asks the primary reader first and the secondary one only on a miss
#[derive(Clone)]
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> Fallback<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl<P, S> SecretReader for Fallback<P, S>
where
    P: SecretReader,
    S: SecretReader,
{
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        if let Some(secret) = self.primary.lookup(namespace, name).await? {
            return Ok(Some(secret));
        }

        self.secondary.lookup(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use kube::runtime::{reflector, watcher};

    use super::*;
    use crate::svc::k8s::secret::{
        store::MockSecretStore,
        testing::{secret, InMemory},
    };

    #[tokio::test]
    async fn cache_hit_does_not_reach_the_store() {
        let cache = InMemory::default();
        cache.insert(secret("kafka", "my-kafka-tls-secret", &[("tls.crt", "C")]));

        let mut store = MockSecretStore::new();
        store.expect_get().times(0);

        let reader = Fallback::new(
            cache,
            StoreBacked::from(Arc::new(store) as Arc<dyn SecretStore>),
        );
        let found = reader
            .lookup("kafka", "my-kafka-tls-secret")
            .await
            .expect("lookup to succeed");

        assert!(found.is_some());
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_the_store() {
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .withf(|namespace, name| {
                namespace.to_string() == "kafka" && name.to_string() == "my-kafka-sso-secret"
            })
            .times(1)
            .returning(|namespace, name| {
                Ok(Some(secret(namespace, name, &[("ssoClientSecret", "S")])))
            });

        let reader = Fallback::new(
            InMemory::default(),
            StoreBacked::from(Arc::new(store) as Arc<dyn SecretStore>),
        );
        let found = reader
            .lookup("kafka", "my-kafka-sso-secret")
            .await
            .expect("lookup to succeed")
            .expect("secret to be found in the store");

        assert_eq!(found.metadata.name.as_deref(), Some("my-kafka-sso-secret"));
    }

    #[tokio::test]
    async fn absence_is_not_an_error() {
        let reader = Fallback::new(InMemory::default(), InMemory::default());
        let found = reader
            .lookup("kafka", "unknown")
            .await
            .expect("lookup to succeed");

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn reflector_store_is_read_by_namespace_and_name() {
        let (store, mut writer) = reflector::store::<Secret>();
        writer.apply_watcher_event(&watcher::Event::Applied(secret(
            "kafka",
            "my-kafka-sso-cert",
            &[("keycloak.crt", "CA")],
        )));

        let reader = CacheBacked::from(store);
        assert!(reader
            .lookup("kafka", "my-kafka-sso-cert")
            .await
            .expect("lookup to succeed")
            .is_some());
        assert!(reader
            .lookup("other", "my-kafka-sso-cert")
            .await
            .expect("lookup to succeed")
            .is_none());
    }
}
