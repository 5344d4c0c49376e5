//! The `ClusterSecret` custom resource (spec §3.1, §6).
//!
//! Grounded on the `CustomResource` derive pattern used throughout the
//! reference corpus (`flavio-rancher-project-info-propagator::project::Project`,
//! `microscaler-secret-manager-controller::crd::SecretManagerConfig`): a
//! tagged-record type with explicit fields instead of the original
//! implementation's untyped `Dict[str, Any]` body (Design Note 2).

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// `matchNamespace`/`matchLabels` combination policy (spec §3.1).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchedSetsJoin {
    #[default]
    Union,
    Intersection,
}

/// Reference to a source Secret that `spec.data` is resolved from instead
/// of an inline payload (spec §3.1).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FromSecretRef {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "clustersecret.io",
    version = "v1",
    kind = "ClusterSecret",
    plural = "clustersecrets",
    status = "ClusterSecretStatus",
    shortname = "csec"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretSpec {
    /// Inline payload: key -> base64-encoded value. Mutually exclusive
    /// with `from_secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, ByteString>>,

    /// Reference to an existing Secret to source the payload from.
    /// Mutually exclusive with `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_secret: Option<FromSecretRef>,

    /// Kubernetes secret type. Defaults to `Opaque`.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub type_: Option<String>,

    /// Ordered list of namespace-name regular expressions to match.
    /// Absent and empty are distinct (spec §4.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_namespace: Option<Vec<String>>,

    /// Ordered list of namespace-name regular expressions to exclude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_namespaces: Option<Vec<String>>,

    /// Namespace labels that must all be present (equality) for a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// How `match_namespace` and `match_labels` combine. Defaults to `union`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_sets_join: Option<MatchedSetsJoin>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ClusterSecretStatus {
    #[serde(default, rename = "syncedns")]
    pub synced_ns: Vec<String>,
}

impl ClusterSecretSpec {
    /// Validates the mutual exclusion of `data`/`fromSecret` and the
    /// `fromSecret` reference shape (spec §3.2, §7 Validation errors).
    /// Regex-list *shape* (they're just `Vec<String>`) is always valid at
    /// the type level; the values themselves are validated lazily by
    /// `selection::matched_namespaces` since that's the first place they
    /// need to compile, matching spec §4.1.
    pub fn validate(&self, cs_name: &str) -> Result<(), Error> {
        match (&self.data, &self.from_secret) {
            (Some(_), Some(_)) => Err(Error::Validation {
                name: cs_name.to_string(),
                reason: "`data` and `fromSecret` are mutually exclusive".to_string(),
            }),
            (None, None) => Err(Error::Validation {
                name: cs_name.to_string(),
                reason: "one of `data` or `fromSecret` is required".to_string(),
            }),
            (Some(_), None) => Ok(()),
            (None, Some(from_secret)) => {
                if from_secret.namespace.is_empty() || from_secret.name.is_empty() {
                    return Err(Error::Validation {
                        name: cs_name.to_string(),
                        reason: "`fromSecret` requires both `namespace` and `name`".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn secret_type(&self) -> String {
        self.type_.clone().unwrap_or_else(|| "Opaque".to_string())
    }
}
