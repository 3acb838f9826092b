//! # Secret module
//!
//! This module derives the secrets of a [`ManagedKafka`] from its
//! specification, converges them on kubernetes and fingerprints the secrets
//! that dependent workloads consume.
//!
//! It is split as follow:
//! - [`reader`], two-tier lookup of secrets (informer cache, then api server)
//! - [`store`], the authoritative store of secrets
//! - [`builder`], pure derivation of the desired secrets
//! - [`digest`], deterministic fingerprint over secrets' content
//! - [`manager`], the lifecycle of derived secrets
//!
//! [`ManagedKafka`]: crate::svc::crd::managed_kafka::ManagedKafka

use crate::svc::k8s::resource;

pub mod builder;
pub mod digest;
pub mod manager;
pub mod reader;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::SecretKind;
pub use manager::SecuritySecretManager;

// -----------------------------------------------------------------------------
// Constants

/// annotation under which workloads carry the digest of their secret dependencies
pub const ANNOTATION_SECRET_DEP_DIGEST: &str = "managedkafka.bf2.org/secret-dependency-digest";

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute request on kubernetes api, {0}")]
    Kube(kube::Error),
    #[error("failed to compute diff between the current and desired secret, {0}")]
    Diff(serde_json::Error),
    #[error("failed to derive secret from resource, {0}")]
    Resource(resource::Error),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::Kube(err)
    }
}

impl From<resource::Error> for Error {
    fn from(err: resource::Error) -> Self {
        Self::Resource(err)
    }
}
