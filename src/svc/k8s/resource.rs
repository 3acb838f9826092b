//! # Resource module
//!
//! This module provide helpers on kubernetes [`Resource`]

use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::{
    api::core::v1::ObjectReference, apimachinery::pkg::apis::meta::v1::OwnerReference,
    NamespaceResourceScope,
};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Constants

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("resource '{0}' is not owned by a namespace")]
    MissingNamespace(String),
    #[error("resource '{0}' does not have an unique identifier provided by kubernetes")]
    MissingUid(String),
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the resource is considered from kubernetes point of view as deleted
pub fn deleted<T>(obj: &T) -> bool
where
    T: Resource,
{
    obj.meta().deletion_timestamp.is_some()
}

/// returns the namespace and name of the kubernetes resource
pub fn namespaced_name<T>(obj: &T) -> Result<(String, String), Error>
where
    T: ResourceExt,
{
    let name = obj.name_any();
    match obj.namespace() {
        Some(namespace) => Ok((namespace, name)),
        None => Err(Error::MissingNamespace(name)),
    }
}

/// returns the labels set on every object created by this operator
pub fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        env!("CARGO_PKG_NAME").to_string(),
    )])
}

/// returns the label selector matching objects created by this operator
pub fn default_selector() -> String {
    format!("{}={}", LABEL_MANAGED_BY, env!("CARGO_PKG_NAME"))
}

/// returns difference between the two given object serialize as json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// make a patch request on the given resource using the given patch
pub async fn patch<T>(client: Client, obj: &T, patch: json_patch::Patch) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    if patch.0.is_empty() {
        debug!(
            name = &name,
            namespace = &namespace,
            "skip patch request on resource, no operation to apply"
        );
        return Ok(obj.to_owned());
    }

    debug!(
        name = &name,
        namespace = &namespace,
        operations = patch.0.len(),
        "execute patch request on resource"
    );
    Api::namespaced(client, &namespace)
        .patch(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// make a patch request on the given resource's status using the given patch
pub async fn patch_status<T>(
    client: Client,
    obj: T,
    patch: json_patch::Patch,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    if patch.0.is_empty() {
        debug!(
            name = &name,
            namespace = &namespace,
            "skip patch request on resource's status, no operation to apply"
        );
        return Ok(obj);
    }

    debug!(
        name = &name,
        namespace = &namespace,
        operations = patch.0.len(),
        "execute patch request on resource's status"
    );
    Api::namespaced(client, &namespace)
        .patch_status(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// returns a owner references object pointing to the given resource
pub fn owner_reference<T>(obj: &T) -> Result<OwnerReference, Error>
where
    T: Resource<DynamicType = ()>,
{
    let name = obj.meta().name.to_owned().unwrap_or_default();
    let uid = match &obj.meta().uid {
        Some(uid) => uid.to_owned(),
        None => return Err(Error::MissingUid(name)),
    };

    Ok(OwnerReference {
        api_version: T::api_version(&()).to_string(),
        block_owner_deletion: Some(true),
        controller: Some(true),
        kind: T::kind(&()).to_string(),
        name,
        uid,
    })
}

/// returns if one of the owner references of the object points to the given
/// owner, matched by unique identifier
pub fn is_owned_by<T, O>(obj: &T, owner: &O) -> bool
where
    T: Resource,
    O: Resource,
{
    match &owner.meta().uid {
        Some(uid) => obj
            .meta()
            .owner_references
            .as_ref()
            .map_or(false, |owners| {
                owners.iter().any(|reference| &reference.uid == uid)
            }),
        None => false,
    }
}

/// returns an object reference pointing to the given resource
pub fn object_reference<T>(obj: &T) -> ObjectReference
where
    T: Resource<DynamicType = ()>,
{
    obj.object_ref(&())
}
