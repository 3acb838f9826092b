//! # Builder module
//!
//! This module derives, for each kind of secret, the desired kubernetes secret
//! from the [`ManagedKafka`] specification. Everything here is pure, nothing
//! talks to the api server.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::ResourceExt;

use crate::svc::{
    crd::managed_kafka::{ManagedKafka, ServiceAccountName},
    k8s::{resource, secret::Error},
};

// -----------------------------------------------------------------------------
// Constants

pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub const SECRET_TYPE_OPAQUE: &str = "Opaque";

pub const TLS_CERT: &str = "tls.crt";
pub const TLS_KEY: &str = "tls.key";
pub const SSO_CLIENT_SECRET: &str = "ssoClientSecret";
pub const SSO_TLS_CERT: &str = "keycloak.crt";
pub const SASL_PRINCIPAL: &str = "sasl.principal";
pub const SASL_PASSWORD: &str = "sasl.password";
pub const CLUSTER_CA_CERT: &str = "ca.crt";

// -----------------------------------------------------------------------------
// Gating conditions

pub fn is_kafka_authentication_enabled(mk: &ManagedKafka) -> bool {
    mk.spec.oauth.is_some()
}

pub fn is_kafka_external_certificate_enabled(mk: &ManagedKafka) -> bool {
    mk.spec.endpoint.tls.is_some()
}

pub fn is_sso_client_secret_present(mk: &ManagedKafka) -> bool {
    mk.spec
        .oauth
        .as_ref()
        .map_or(false, |oauth| oauth.client_secret.is_some())
}

pub fn is_sso_trusted_certificate_present(mk: &ManagedKafka) -> bool {
    mk.spec
        .oauth
        .as_ref()
        .map_or(false, |oauth| oauth.tls_trusted_certificate.is_some())
}

pub fn is_canary_service_account_present(mk: &ManagedKafka) -> bool {
    mk.service_account(ServiceAccountName::Canary).is_some()
}

// -----------------------------------------------------------------------------
// Naming

pub fn kafka_tls_secret_name(mk: &ManagedKafka) -> String {
    format!("{}-tls-secret", mk.name_any())
}

pub fn sso_client_secret_name(mk: &ManagedKafka) -> String {
    format!("{}-sso-secret", mk.name_any())
}

pub fn sso_tls_secret_name(mk: &ManagedKafka) -> String {
    format!("{}-sso-cert", mk.name_any())
}

pub fn canary_sasl_secret_name(mk: &ManagedKafka) -> String {
    format!("{}-canary-sasl-secret", mk.name_any())
}

/// returns the name of the cluster certificate authority secret maintained by
/// strimzi for the kafka cluster
pub fn cluster_ca_cert_secret_name(mk: &ManagedKafka) -> String {
    format!("{}-cluster-ca-cert", mk.name_any())
}

// -----------------------------------------------------------------------------
// SecretKind enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum SecretKind {
    KafkaTls,
    SsoClient,
    SsoTls,
    CanarySasl,
}

impl Display for SecretKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::KafkaTls => write!(f, "kafka-tls"),
            Self::SsoClient => write!(f, "sso-client"),
            Self::SsoTls => write!(f, "sso-tls"),
            Self::CanarySasl => write!(f, "canary-sasl"),
        }
    }
}

impl SecretKind {
    /// every kind, in the order in which they are reconciled
    pub const ALL: [SecretKind; 4] = [
        Self::KafkaTls,
        Self::SsoClient,
        Self::SsoTls,
        Self::CanarySasl,
    ];

    pub fn secret_name(&self, mk: &ManagedKafka) -> String {
        match self {
            Self::KafkaTls => kafka_tls_secret_name(mk),
            Self::SsoClient => sso_client_secret_name(mk),
            Self::SsoTls => sso_tls_secret_name(mk),
            Self::CanarySasl => canary_sasl_secret_name(mk),
        }
    }

    pub fn secret_type(&self) -> &'static str {
        match self {
            Self::KafkaTls => SECRET_TYPE_TLS,
            Self::SsoClient | Self::SsoTls | Self::CanarySasl => SECRET_TYPE_OPAQUE,
        }
    }

    /// returns if a secret of this kind has to exist for the given resource
    pub fn is_required(&self, mk: &ManagedKafka) -> bool {
        match self {
            Self::KafkaTls => is_kafka_external_certificate_enabled(mk),
            Self::SsoClient => is_sso_client_secret_present(mk),
            Self::SsoTls => is_sso_trusted_certificate_present(mk),
            Self::CanarySasl => is_canary_service_account_present(mk),
        }
    }

    /// returns the raw key/value pairs of the secret, or none if the resource
    /// does not require it
    pub fn data(&self, mk: &ManagedKafka) -> Option<BTreeMap<&'static str, String>> {
        let spec = &mk.spec;

        match self {
            Self::KafkaTls => spec.endpoint.tls.as_ref().map(|tls| {
                BTreeMap::from([
                    (TLS_CERT, tls.cert.to_owned()),
                    (TLS_KEY, tls.key.to_owned()),
                ])
            }),
            Self::SsoClient => spec
                .oauth
                .as_ref()
                .and_then(|oauth| oauth.client_secret.to_owned())
                .map(|secret| BTreeMap::from([(SSO_CLIENT_SECRET, secret)])),
            Self::SsoTls => spec
                .oauth
                .as_ref()
                .and_then(|oauth| oauth.tls_trusted_certificate.to_owned())
                .map(|cert| BTreeMap::from([(SSO_TLS_CERT, cert)])),
            Self::CanarySasl => mk
                .service_account(ServiceAccountName::Canary)
                .map(|account| {
                    BTreeMap::from([
                        (SASL_PRINCIPAL, account.principal.to_owned()),
                        (SASL_PASSWORD, account.password.to_owned()),
                    ])
                }),
        }
    }
}

// -----------------------------------------------------------------------------
// Helper functions

/// returns the desired secret of the given kind, or none if the resource does
/// not require it.
///
/// When a current secret is given, it is used as the base object, so that the
/// metadata maintained by kubernetes (resource version, annotations, ...) is
/// kept. The data is always replaced as a whole.
pub fn build(
    kind: SecretKind,
    mk: &ManagedKafka,
    current: Option<Secret>,
) -> Result<Option<Secret>, Error> {
    let source = match kind.data(mk) {
        Some(source) => source,
        None => return Ok(None),
    };

    let (namespace, _) = resource::namespaced_name(mk)?;
    let owner = resource::owner_reference(mk)?;
    let mut secret = current.unwrap_or_default();

    secret.metadata.namespace = Some(namespace);
    secret.metadata.name = Some(kind.secret_name(mk));
    secret.metadata.labels = Some(resource::default_labels());
    secret.metadata.owner_references = Some(vec![owner]);
    secret.type_ = Some(kind.secret_type().to_string());
    secret.string_data = None;
    secret.data = Some(
        source
            .into_iter()
            .map(|(key, value)| (key.to_string(), ByteString(value.into_bytes())))
            .collect(),
    );

    Ok(Some(secret))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine};
    use k8s_openapi::ByteString;

    use super::*;
    use crate::svc::k8s::secret::testing::{managed_kafka, Features};

    #[test]
    fn names_are_derived_from_the_resource_name() {
        let mk = managed_kafka(Features::default());

        assert_eq!(kafka_tls_secret_name(&mk), "my-kafka-tls-secret");
        assert_eq!(sso_client_secret_name(&mk), "my-kafka-sso-secret");
        assert_eq!(sso_tls_secret_name(&mk), "my-kafka-sso-cert");
        assert_eq!(canary_sasl_secret_name(&mk), "my-kafka-canary-sasl-secret");
        assert_eq!(cluster_ca_cert_secret_name(&mk), "my-kafka-cluster-ca-cert");
    }

    #[test]
    fn data_exists_exactly_when_the_kind_is_required() {
        for features in Features::all() {
            let mk = managed_kafka(features);
            for kind in SecretKind::ALL {
                assert_eq!(
                    kind.data(&mk).is_some(),
                    kind.is_required(&mk),
                    "{kind} with {features:?}"
                );
            }
        }
    }

    #[test]
    fn oauth_without_client_secret_does_not_require_the_client_secret() {
        let mk = managed_kafka(Features {
            oauth: true,
            trusted_certificate: true,
            ..Default::default()
        });

        assert!(is_kafka_authentication_enabled(&mk));
        assert!(!SecretKind::SsoClient.is_required(&mk));
        assert!(SecretKind::SsoTls.is_required(&mk));
    }

    #[test]
    fn kafka_tls_secret_carries_the_endpoint_key_pair() {
        let mk = managed_kafka(Features {
            tls: true,
            ..Default::default()
        });

        let secret = build(SecretKind::KafkaTls, &mk, None)
            .expect("secret to be built")
            .expect("secret to be required");

        assert_eq!(secret.metadata.name.as_deref(), Some("my-kafka-tls-secret"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("kafka"));
        assert_eq!(secret.type_.as_deref(), Some(SECRET_TYPE_TLS));
        assert_eq!(secret.metadata.labels, Some(resource::default_labels()));
        assert_eq!(
            secret.data,
            Some(BTreeMap::from([
                (TLS_CERT.to_string(), ByteString(b"C".to_vec())),
                (TLS_KEY.to_string(), ByteString(b"K".to_vec())),
            ]))
        );

        let owners = secret.metadata.owner_references.expect("owner to be set");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "ManagedKafka");
        assert_eq!(owners[0].uid, "8b9c2f3e-0000-4000-8000-000000000001");
    }

    #[test]
    fn values_are_transport_encoded_on_the_wire() {
        let mk = managed_kafka(Features {
            tls: true,
            ..Default::default()
        });

        let secret = build(SecretKind::KafkaTls, &mk, None)
            .expect("secret to be built")
            .expect("secret to be required");
        let value = serde_json::to_value(&secret).expect("secret to serialize");

        assert_eq!(value["data"][TLS_CERT], STANDARD.encode("C"));
        assert_eq!(value["data"][TLS_KEY], STANDARD.encode("K"));
    }

    #[test]
    fn build_returns_none_when_not_required() {
        let mk = managed_kafka(Features::default());

        for kind in SecretKind::ALL {
            assert!(build(kind, &mk, None).expect("build to succeed").is_none());
        }
    }

    #[test]
    fn build_keeps_current_metadata_and_replaces_data() {
        let mk = managed_kafka(Features {
            canary: true,
            ..Default::default()
        });

        let mut current = build(SecretKind::CanarySasl, &mk, None)
            .expect("secret to be built")
            .expect("secret to be required");
        current.metadata.resource_version = Some("1234".into());
        current.metadata.annotations = Some(BTreeMap::from([(
            "owner".to_string(),
            "someone".to_string(),
        )]));
        current.metadata.labels = Some(BTreeMap::from([("extra".to_string(), "x".to_string())]));
        if let Some(data) = current.data.as_mut() {
            data.insert("leftover".into(), ByteString(b"old".to_vec()));
            data.insert(SASL_PASSWORD.into(), ByteString(b"stale".to_vec()));
        }

        let desired = build(SecretKind::CanarySasl, &mk, Some(current))
            .expect("secret to be built")
            .expect("secret to be required");

        assert_eq!(desired.metadata.resource_version.as_deref(), Some("1234"));
        assert_eq!(
            desired.metadata.annotations,
            Some(BTreeMap::from([(
                "owner".to_string(),
                "someone".to_string()
            )]))
        );
        assert_eq!(desired.metadata.labels, Some(resource::default_labels()));
        assert_eq!(
            desired.data,
            Some(BTreeMap::from([
                (
                    SASL_PASSWORD.to_string(),
                    ByteString(b"canary-password".to_vec())
                ),
                (
                    SASL_PRINCIPAL.to_string(),
                    ByteString(b"canary-principal".to_vec())
                ),
            ]))
        );
    }

    #[test]
    fn build_is_idempotent() {
        let mk = managed_kafka(Features::full());

        for kind in SecretKind::ALL {
            let first = build(kind, &mk, None).expect("build to succeed");
            let second = build(kind, &mk, first.clone()).expect("build to succeed");
            assert_eq!(first, second, "{kind}");
        }
    }
}
