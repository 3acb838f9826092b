//! # ManagedKafka custom resource
//!
//! This module provide the managed kafka custom resource and its definition.
//! Only the parts of the specification from which secrets are derived are
//! modelled here.

use std::fmt::{self, Display, Formatter};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// TlsKeyPair structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct TlsKeyPair {
    #[serde(rename = "cert")]
    pub cert: String,
    #[serde(rename = "key")]
    pub key: String,
}

// -----------------------------------------------------------------------------
// Endpoint structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Endpoint {
    #[serde(rename = "bootstrapServerHost")]
    pub bootstrap_server_host: String,
    #[serde(rename = "tls", default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsKeyPair>,
}

// -----------------------------------------------------------------------------
// OAuth structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct OAuth {
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(
        rename = "clientSecret",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_secret: Option<String>,
    #[serde(
        rename = "tokenEndpointURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub token_endpoint_uri: Option<String>,
    #[serde(
        rename = "jwksEndpointURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub jwks_endpoint_uri: Option<String>,
    #[serde(
        rename = "validIssuerEndpointURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_issuer_endpoint_uri: Option<String>,
    #[serde(
        rename = "userNameClaim",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_name_claim: Option<String>,
    #[serde(
        rename = "tlsTrustedCertificate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tls_trusted_certificate: Option<String>,
}

// -----------------------------------------------------------------------------
// ServiceAccountName enumeration

#[derive(
    JsonSchema, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug,
)]
pub enum ServiceAccountName {
    #[serde(rename = "canary")]
    Canary,
}

impl Display for ServiceAccountName {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Canary => write!(f, "canary"),
        }
    }
}

// -----------------------------------------------------------------------------
// ServiceAccount structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct ServiceAccount {
    #[serde(rename = "name")]
    pub name: ServiceAccountName,
    #[serde(rename = "principal")]
    pub principal: String,
    #[serde(rename = "password")]
    pub password: String,
}

// -----------------------------------------------------------------------------
// Spec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[kube(group = "managedkafka.bf2.org")]
#[kube(version = "v1alpha1")]
#[kube(kind = "ManagedKafka")]
#[kube(singular = "managedkafka")]
#[kube(plural = "managedkafkas")]
#[kube(shortname = "mk")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
pub struct Spec {
    #[serde(rename = "endpoint")]
    pub endpoint: Endpoint,
    #[serde(rename = "oauth", default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuth>,
    #[serde(
        rename = "serviceAccounts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_accounts: Option<Vec<ServiceAccount>>,
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    #[serde(
        rename = "secretsReady",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secrets_ready: Option<bool>,
    #[serde(
        rename = "secretDependencyDigest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_dependency_digest: Option<String>,
    #[serde(
        rename = "canarySecretDependencyDigest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub canary_secret_dependency_digest: Option<String>,
}

// -----------------------------------------------------------------------------
// ManagedKafka implementation

impl ManagedKafka {
    /// returns the service account declared for the given role, if any
    pub fn service_account(&self, name: ServiceAccountName) -> Option<&ServiceAccount> {
        self.spec
            .service_accounts
            .as_ref()
            .and_then(|accounts| accounts.iter().find(|account| account.name == name))
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }
}
