//! In-memory doubles and fixtures shared by the secret tests

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::api::ObjectMeta;

use crate::svc::{
    crd::managed_kafka::{
        Endpoint, ManagedKafka, OAuth, ServiceAccount, ServiceAccountName, Spec, TlsKeyPair,
    },
    k8s::secret::{reader::SecretReader, store::SecretStore, Error},
};

pub const NAMESPACE: &str = "kafka";
pub const NAME: &str = "my-kafka";
pub const UID: &str = "8b9c2f3e-0000-4000-8000-000000000001";

// -----------------------------------------------------------------------------
// Fixtures

pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// which parts of the specification are set on the fixture resource
#[derive(Clone, Copy, Debug, Default)]
pub struct Features {
    pub tls: bool,
    pub oauth: bool,
    pub client_secret: bool,
    pub trusted_certificate: bool,
    pub canary: bool,
}

impl Features {
    pub fn full() -> Self {
        Self {
            tls: true,
            oauth: true,
            client_secret: true,
            trusted_certificate: true,
            canary: true,
        }
    }

    /// every combination of features
    pub fn all() -> Vec<Self> {
        (0..32u8)
            .map(|bits| Self {
                tls: bits & 1 != 0,
                oauth: bits & 2 != 0,
                client_secret: bits & 4 != 0,
                trusted_certificate: bits & 8 != 0,
                canary: bits & 16 != 0,
            })
            .collect()
    }
}

pub fn managed_kafka(features: Features) -> ManagedKafka {
    let spec = Spec {
        endpoint: Endpoint {
            bootstrap_server_host: "my-kafka.example.com".into(),
            tls: features.tls.then(|| TlsKeyPair {
                cert: "C".into(),
                key: "K".into(),
            }),
        },
        oauth: features.oauth.then(|| OAuth {
            client_id: "client-id".into(),
            client_secret: features.client_secret.then(|| "client-secret".into()),
            tls_trusted_certificate: features.trusted_certificate.then(|| "CA".into()),
            ..Default::default()
        }),
        service_accounts: features.canary.then(|| {
            vec![ServiceAccount {
                name: ServiceAccountName::Canary,
                principal: "canary-principal".into(),
                password: "canary-password".into(),
            }]
        }),
    };

    let mut mk = ManagedKafka::new(NAME, spec);
    mk.metadata = ObjectMeta {
        name: Some(NAME.into()),
        namespace: Some(NAMESPACE.into()),
        uid: Some(UID.into()),
        ..Default::default()
    };
    mk
}

// -----------------------------------------------------------------------------
// InMemory structure

/// a secret store and reader keeping everything in a map, resource versions
/// are bumped on each write like the api server does
#[derive(Default)]
pub struct InMemory {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    version: AtomicU64,
}

impl InMemory {
    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }

    pub fn insert(&self, secret: Secret) {
        let key = Self::key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );

        self.secrets
            .lock()
            .expect("lock not to be poisoned")
            .insert(key, secret);
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .expect("lock not to be poisoned")
            .get(&Self::key(namespace, name))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .expect("lock not to be poisoned")
            .remove(&Self::key(namespace, name))
    }

    pub fn names(&self) -> Vec<String> {
        self.secrets
            .lock()
            .expect("lock not to be poisoned")
            .keys()
            .map(|(_, name)| name.to_owned())
            .collect()
    }
}

#[async_trait]
impl SecretReader for InMemory {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.find(namespace, name))
    }
}

#[async_trait]
impl SecretStore for InMemory {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.find(namespace, name))
    }

    async fn upsert(&self, secret: &Secret) -> Result<Secret, Error> {
        let mut secret = secret.to_owned();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        secret.metadata.resource_version = Some(version.to_string());
        self.insert(secret.to_owned());
        Ok(secret)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        Ok(self.remove(namespace, name).is_some())
    }
}
