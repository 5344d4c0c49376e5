//! Environment-driven policy knobs (spec §6).
//!
//! The original Python implementation (`os_utils.py`) wraps each of these
//! in a `functools.cache`-decorated accessor so the environment is only
//! read once per process. Here that's a single struct parsed up front in
//! `main` and threaded through the reconciler `Context`, rather than a set
//! of memoized free functions.

use std::env;

/// Annotation/label prefixes blocked from propagating onto child Secrets
/// by default (spec §4.2), overridable via `BLOCKED_LABELS`.
const DEFAULT_BLOCKED_ANNOTATIONS: &[&str] = &["kopf.zalando.org", "kubectl.kubernetes.io"];
const DEFAULT_BLOCKED_LABELS: &[&str] = &["app.kubernetes.io"];

#[derive(Debug, Clone)]
pub struct Config {
    /// `CLUSTER_SECRET_VERSION` — emitted as the version annotation on children.
    pub version: String,
    /// `REPLACE_EXISTING` — when true, sync may overwrite a foreign Secret
    /// of the same name.
    pub replace_existing: bool,
    /// Blocked annotation key prefixes.
    pub blocked_annotations: Vec<String>,
    /// Blocked label key prefixes. Overridden in full by `BLOCKED_LABELS`.
    pub blocked_labels: Vec<String>,
    /// Whether `KUBERNETES_SERVICE_HOST` is present, i.e. we're running
    /// inside a cluster rather than against a local kubeconfig.
    pub in_cluster: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            version: env::var("CLUSTER_SECRET_VERSION").unwrap_or_else(|_| "0".to_string()),
            replace_existing: env::var("REPLACE_EXISTING")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            blocked_annotations: DEFAULT_BLOCKED_ANNOTATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_labels: parse_blocked_labels(env::var("BLOCKED_LABELS").ok().as_deref()),
            in_cluster: env::var("KUBERNETES_SERVICE_HOST").is_ok(),
        }
    }
}

/// Pure helper so the comma-list parsing can be unit tested without
/// touching process environment state.
fn parse_blocked_labels(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => DEFAULT_BLOCKED_LABELS.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        // SAFETY in the sense that this just reads absent env vars; doesn't
        // mutate shared process state.
        let cfg = Config {
            version: "0".to_string(),
            replace_existing: false,
            blocked_annotations: DEFAULT_BLOCKED_ANNOTATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_labels: DEFAULT_BLOCKED_LABELS.iter().map(|s| s.to_string()).collect(),
            in_cluster: false,
        };
        assert_eq!(cfg.version, "0");
        assert!(!cfg.replace_existing);
        assert_eq!(cfg.blocked_labels, vec!["app.kubernetes.io".to_string()]);
    }

    #[test]
    fn blocked_labels_parses_comma_list() {
        let parsed = parse_blocked_labels(Some("foo.bar, baz.qux ,,quux"));
        assert_eq!(parsed, vec!["foo.bar", "baz.qux", "quux"]);
    }

    #[test]
    fn blocked_labels_falls_back_to_default_when_unset() {
        assert_eq!(parse_blocked_labels(None), vec!["app.kubernetes.io".to_string()]);
        assert_eq!(parse_blocked_labels(Some("  ")), vec!["app.kubernetes.io".to_string()]);
    }
}
