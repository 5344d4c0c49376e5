//! The projection engine: `(ClusterSecret, namespace) -> desired child
//! Secret` (spec §4.2). Split into a pure metadata/data synthesis function
//! (`build`) and an async payload resolver (`resolve_payload`) that's the
//! only place this module touches the network, per Design Note 4 (handlers
//! return a result enum; I/O is a thin shell around pure decision logic).
//!
//! Grounded on `original_source/src/handlers.py::sync_secret` (the
//! `valueFrom`/`fromSecret` key-filtering and metadata-filtering logic) and
//! `examples/afitzek-spreading-operator/src/main.rs::sync_secret` (the
//! `ObjectMeta`/`Secret` construction shape) plus the owner-reference
//! literal used across the corpus, e.g.
//! `mbround18-meilisearch-operator::key_controller` and
//! `flavio-rancher-project-info-propagator::project`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta};
use kube::{Client, Resource, ResourceExt};

use crate::config::Config;
use crate::crd::ClusterSecret;
use crate::error::Error;

pub const CLUSTER_SECRET_LABEL: &str = "clustersecret.io";
pub const VERSION_ANNOTATION: &str = "clustersecret.io/version";

/// Why projection was skipped rather than producing a Secret (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `fromSecret` points at a Secret that doesn't exist (yet).
    SourceSecretNotFound { namespace: String, name: String },
}

pub enum PayloadResolution {
    Data(BTreeMap<String, ByteString>),
    Skip(SkipReason),
}

/// Resolves `spec.data` or `spec.fromSecret` into the raw key/value map
/// that will become the child Secret's `data` (spec §4.2 step 1). The
/// caller is expected to have already run `ClusterSecretSpec::validate`,
/// so `data`/`fromSecret` mutual exclusion is assumed, not re-checked.
pub async fn resolve_payload(client: &Client, cs: &ClusterSecret) -> Result<PayloadResolution, Error> {
    if let Some(data) = &cs.spec.data {
        return Ok(PayloadResolution::Data(data.clone()));
    }

    let from_secret = cs
        .spec
        .from_secret
        .as_ref()
        .expect("validate() guarantees data xor fromSecret is set");

    let source_api: Api<Secret> = Api::namespaced(client.clone(), &from_secret.namespace);
    let source = match source_api.get_opt(&from_secret.name).await? {
        Some(secret) => secret,
        None => {
            return Ok(PayloadResolution::Skip(SkipReason::SourceSecretNotFound {
                namespace: from_secret.namespace.clone(),
                name: from_secret.name.clone(),
            }))
        }
    };

    let raw = source.data.unwrap_or_default();
    let data = match &from_secret.keys {
        Some(keys) => raw
            .into_iter()
            .filter(|(k, _)| keys.contains(k))
            .collect(),
        None => raw,
    };
    Ok(PayloadResolution::Data(data))
}

/// `filter(map, prefixes)` (spec §4.2): retains entries whose key does not
/// start with any blocked prefix. `base` entries are always emitted first
/// and are never filtered, matching the spec's "base pair always present".
fn filter_and_merge(
    base: Vec<(String, String)>,
    source: Option<&BTreeMap<String, String>>,
    blocked_prefixes: &[String],
) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = base.into_iter().collect();
    if let Some(source) = source {
        for (key, value) in source {
            if out.contains_key(key) {
                continue;
            }
            if blocked_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// spec §4.2 step 2-3: synthesizes the desired child Secret's metadata,
/// type and data. Pure — no I/O, no clock reads.
pub fn build(cs: &ClusterSecret, namespace: &str, data: BTreeMap<String, ByteString>, config: &Config) -> Secret {
    let name = cs.metadata.name.clone().expect("ClusterSecret always has a name");

    let labels = filter_and_merge(
        vec![(CLUSTER_SECRET_LABEL.to_string(), "true".to_string())],
        cs.metadata.labels.as_ref(),
        &config.blocked_labels,
    );
    let annotations = filter_and_merge(
        vec![(VERSION_ANNOTATION.to_string(), config.version.clone())],
        cs.metadata.annotations.as_ref(),
        &config.blocked_annotations,
    );

    let owner_references = vec![cs
        .controller_owner_ref(&())
        .expect("ClusterSecret always has a name and uid")];

    Secret {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(owner_references),
            ..Default::default()
        },
        type_: Some(cs.spec.secret_type()),
        data: Some(data),
        ..Default::default()
    }
}
