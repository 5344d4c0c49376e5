//! The sync executor (spec §4.3): idempotently applies a desired child
//! Secret against live cluster state.
//!
//! The decision of *what* to do (create / replace / leave alone / treat as
//! foreign) is factored into pure helpers so the idempotence and
//! foreign-secret-safety properties (spec §8.3, §8.5) are unit-testable
//! without a live API server; `create_or_update`/`delete_owned` are thin
//! async shells around those decisions, in the same spirit as
//! `projection::resolve_payload` vs. `projection::build`.

use k8s_openapi::api::core::v1::Secret;
use kube::api::PostParams;
use kube::{Api, Client};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    Replaced,
    SkippedForeign,
    NsGone,
}

/// Is `existing` owned by the ClusterSecret with this `uid`? (spec §4.3,
/// §8.4 owner-reference invariant.)
pub fn is_owned_by(existing: &Secret, uid: &str) -> bool {
    existing
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.first())
        .is_some_and(|owner| owner.kind == "ClusterSecret" && owner.uid == uid)
}

/// Does `existing` already match `desired` on every field the projection
/// engine controls? If so, `create_or_update` must be a no-op (spec §8.3
/// Idempotence).
pub fn matches_projection(existing: &Secret, desired: &Secret) -> bool {
    existing.data == desired.data
        && existing.type_ == desired.type_
        && existing.metadata.owner_references == desired.metadata.owner_references
        && is_superset(&existing.metadata.labels, &desired.metadata.labels)
        && is_superset(&existing.metadata.annotations, &desired.metadata.annotations)
}

fn is_superset(
    existing: &Option<std::collections::BTreeMap<String, String>>,
    desired: &Option<std::collections::BTreeMap<String, String>>,
) -> bool {
    let existing = existing.clone().unwrap_or_default();
    let desired = desired.clone().unwrap_or_default();
    desired.iter().all(|(k, v)| existing.get(k) == Some(v))
}

/// The decision spec §4.3's `createOrUpdate` contract is built from,
/// separated from the read/write calls themselves.
enum Decision {
    Create,
    Unchanged,
    Update,
    Replace,
    SkippedForeign,
}

fn decide(existing: Option<&Secret>, desired: &Secret, owner_uid: &str, replace_existing: bool) -> Decision {
    let Some(existing) = existing else {
        return Decision::Create;
    };
    if is_owned_by(existing, owner_uid) {
        if matches_projection(existing, desired) {
            Decision::Unchanged
        } else {
            Decision::Update
        }
    } else if replace_existing {
        Decision::Replace
    } else {
        Decision::SkippedForeign
    }
}

/// spec §4.3 `createOrUpdate`. `owner_uid` is the owning ClusterSecret's
/// uid, used to distinguish "ours, drifted" from "foreign".
pub async fn create_or_update(
    client: &Client,
    namespace: &str,
    desired: &Secret,
    owner_uid: &str,
    replace_existing: bool,
) -> Result<SyncOutcome, Error> {
    let name = desired
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingObjectKey { name: "metadata.name" })?;

    // A 404 here just means "doesn't exist yet" (`get_opt` already folds it
    // into `Ok(None)`) — it never surfaces as an `Err`. The namespace itself
    // having vanished only becomes observable once we actually try to write
    // to it below, where the API server rejects the create/replace with a
    // real 404.
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let existing = secrets.get_opt(&name).await?;

    match decide(existing.as_ref(), desired, owner_uid, replace_existing) {
        Decision::Create => match secrets.create(&PostParams::default(), desired).await {
            Ok(_) => Ok(SyncOutcome::Created),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(SyncOutcome::NsGone),
            Err(e) => Err(e.into()),
        },
        Decision::Unchanged => Ok(SyncOutcome::Unchanged),
        Decision::Update => match secrets.replace(&name, &PostParams::default(), desired).await {
            Ok(_) => Ok(SyncOutcome::Updated),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(SyncOutcome::NsGone),
            Err(e) => Err(e.into()),
        },
        Decision::Replace => {
            tracing::warn!(namespace, name, "replacing a pre-existing Secret not owned by any ClusterSecret");
            match secrets.replace(&name, &PostParams::default(), desired).await {
                Ok(_) => Ok(SyncOutcome::Replaced),
                Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(SyncOutcome::NsGone),
                Err(e) => Err(e.into()),
            }
        }
        Decision::SkippedForeign => {
            tracing::warn!(
                namespace,
                name,
                "a Secret with this name already exists and is not owned by this ClusterSecret; \
                 not replacing it (set REPLACE_EXISTING=true to override)"
            );
            Ok(SyncOutcome::SkippedForeign)
        }
    }
}

/// spec §4.3 `deleteOwned`: a 404 is success.
pub async fn delete_owned(client: &Client, namespace: &str, name: &str) -> Result<(), Error> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match secrets.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => {
            tracing::warn!(namespace, name, error = %e, "error deleting owned Secret");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn owner_ref(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "clustersecret.io/v1".to_string(),
            kind: "ClusterSecret".to_string(),
            name: "s1".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn secret_with(owners: Option<Vec<OwnerReference>>, data: BTreeMap<String, k8s_openapi::ByteString>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("s1".to_string()),
                namespace: Some("ns".to_string()),
                owner_references: owners,
                labels: Some(BTreeMap::from([("clustersecret.io".to_string(), "true".to_string())])),
                annotations: Some(BTreeMap::from([("clustersecret.io/version".to_string(), "0".to_string())])),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn create_when_absent() {
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        assert!(matches!(decide(None, &desired, "uid-1", false), Decision::Create));
    }

    #[test]
    fn unchanged_when_identical_and_owned() {
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        let existing = desired.clone();
        assert!(matches!(decide(Some(&existing), &desired, "uid-1", false), Decision::Unchanged));
    }

    #[test]
    fn update_when_owned_but_drifted() {
        let mut data = BTreeMap::new();
        data.insert("u".to_string(), k8s_openapi::ByteString(b"new".to_vec()));
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), data);
        let existing = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        assert!(matches!(decide(Some(&existing), &desired, "uid-1", false), Decision::Update));
    }

    #[test]
    fn foreign_secret_is_never_touched_without_replace_existing() {
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        let existing = secret_with(None, BTreeMap::new());
        assert!(matches!(
            decide(Some(&existing), &desired, "uid-1", false),
            Decision::SkippedForeign
        ));
    }

    #[test]
    fn foreign_secret_is_replaced_when_policy_enabled() {
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        let existing = secret_with(None, BTreeMap::new());
        assert!(matches!(
            decide(Some(&existing), &desired, "uid-1", true),
            Decision::Replace
        ));
    }

    #[test]
    fn owned_by_a_different_cluster_secret_is_foreign() {
        let desired = secret_with(Some(vec![owner_ref("uid-2")]), BTreeMap::new());
        let existing = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        assert!(matches!(
            decide(Some(&existing), &desired, "uid-2", false),
            Decision::SkippedForeign
        ));
    }

    #[test]
    fn extra_labels_on_existing_secret_still_count_as_matching() {
        let desired = secret_with(Some(vec![owner_ref("uid-1")]), BTreeMap::new());
        let mut existing = desired.clone();
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("team".to_string(), "payments".to_string());
        assert!(matches_projection(&existing, &desired));
    }
}
