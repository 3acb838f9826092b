//! # Digest module
//!
//! This module computes a deterministic fingerprint over the content of a set
//! of secrets. Workloads carry it as an annotation, a change of the digest
//! means that a rollout is required.

use std::cmp::Ordering;

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::{api::core::v1::Secret, ByteString};
use sha1::{Digest, Sha1};

/// returns every data entry of the given secrets, sorted by key using byte
/// order, ties are broken by value
///
/// Iteration order over secrets is not meaningful, so the sort is the only
/// thing that makes the digest deterministic.
pub fn sorted_entries<'a, I>(secrets: I) -> Vec<(&'a str, &'a ByteString)>
where
    I: IntoIterator<Item = &'a Secret>,
{
    let mut entries: Vec<(&'a str, &'a ByteString)> = secrets
        .into_iter()
        .filter_map(|secret| secret.data.as_ref())
        .flat_map(|data| data.iter().map(|(key, value)| (key.as_str(), value)))
        .collect();

    entries.sort_by(
        |(lkey, lvalue), (rkey, rvalue)| match lkey.as_bytes().cmp(rkey.as_bytes()) {
            Ordering::Equal => lvalue.0.cmp(&rvalue.0),
            ordering => ordering,
        },
    );

    entries
}

/// returns the lowercase hexadecimal sha-1 of the transport encoded values of
/// the given secrets
pub fn compute<'a, I>(secrets: I) -> String
where
    I: IntoIterator<Item = &'a Secret>,
{
    let mut hasher = Sha1::new();
    for (_, value) in sorted_entries(secrets) {
        hasher.update(STANDARD.encode(&value.0).as_bytes());
    }

    format!("{:x}", hasher.finalize())
}
