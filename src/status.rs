//! The status reporter (spec §4.6): writes the list of namespaces
//! currently holding a child into `status.syncedns`.
//!
//! Grounded on `original_source/src/handlers.py::patch_clustersecret_status`
//! (read-the-object-then-patch-the-whole-status via the custom objects
//! API), translated to `Api<ClusterSecret>::patch_status` with a JSON
//! merge patch, the idiom `molnett-neon-operator`'s controller uses for
//! its own cluster status (`cluster_object.patch_status`).

use std::collections::BTreeSet;

use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;

use crate::crd::ClusterSecret;
use crate::error::Error;

/// Best-effort per spec §4.6/§7: failures are logged, never propagated as
/// a reconcile failure, since convergence will be retried by the next
/// watch event regardless of whether the status write landed.
pub async fn patch_synced_ns(client: &Client, name: &str, synced: &BTreeSet<&str>) {
    let api: Api<ClusterSecret> = Api::all(client.clone());
    let patch = json!({
        "status": {
            "syncedns": synced.iter().collect::<Vec<_>>()
        }
    });

    if let Err(error) = api
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::from)
    {
        tracing::warn!(name, %error, "failed to patch ClusterSecret status; will retry on next reconcile");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_patch_body_is_sorted_and_stable() {
        let synced: BTreeSet<&str> = BTreeSet::from(["b", "a", "c"]);
        let patch = json!({ "status": { "syncedns": synced.iter().collect::<Vec<_>>() } });
        assert_eq!(patch["status"]["syncedns"], json!(["a", "b", "c"]));
    }
}
