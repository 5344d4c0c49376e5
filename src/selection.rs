//! The selection algebra: which namespaces a `ClusterSecret` projects into
//! (spec §4.1). Pure, synchronous, and total — an empty result is a valid
//! answer, never an error, except for a malformed regex pattern.
//!
//! Grounded on `original_source/src/handlers.py::get_ns_list` (the
//! `re.match`-based matching/avoiding/set-difference algorithm) and
//! `kubernetes_utils.py::get_ns_list` for the earlier `'*'`-vs-`[".*"]`
//! default that spec §9 Open Question 1 fixes to `[".*"]`.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::crd::{ClusterSecretSpec, MatchedSetsJoin};
use crate::error::Error;

/// A `(name, labels)` pair describing one namespace in the cluster
/// inventory (spec §4.1 input).
pub struct NamespaceInfo<'a> {
    pub name: &'a str,
    pub labels: &'a BTreeMap<String, String>,
}

/// Compiles `pattern` so that matching it behaves like Python's
/// `re.match`: anchored at the start of the string, but not required to
/// consume the whole string. `regex::Regex::is_match` is unanchored on
/// both ends, so every pattern is wrapped in `^(?:...)`  before compiling.
fn compile_anchored(pattern: &str) -> Result<Regex, Error> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| Error::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Namespace names whose name matches at least one pattern in `patterns`,
/// deduplicating repeated patterns since "duplicates in input lists are
/// ignored" (spec §4.1).
fn name_matches<'a>(
    patterns: &[String],
    namespaces: &[NamespaceInfo<'a>],
) -> Result<BTreeSet<&'a str>, Error> {
    let mut seen_patterns = BTreeSet::new();
    let mut matched = BTreeSet::new();
    for pattern in patterns {
        if !seen_patterns.insert(pattern.as_str()) {
            continue;
        }
        let re = compile_anchored(pattern)?;
        for ns in namespaces {
            if re.is_match(ns.name) {
                matched.insert(ns.name);
            }
        }
    }
    Ok(matched)
}

/// Namespaces carrying every `(key, value)` pair in `match_labels`.
/// Vacuously true (every namespace matches) when `match_labels` is empty.
fn label_matches<'a>(
    match_labels: &BTreeMap<String, String>,
    namespaces: &[NamespaceInfo<'a>],
) -> BTreeSet<&'a str> {
    namespaces
        .iter()
        .filter(|ns| match_labels.iter().all(|(k, v)| ns.labels.get(k) == Some(v)))
        .map(|ns| ns.name)
        .collect()
}

/// spec §4.1 step 2: `matchNamespace` default resolution. Absent and empty
/// are distinct: an explicit `matchNamespace: []` means "match nothing by
/// name", while an absent field defaults depending on whether labels alone
/// should drive matching.
fn effective_match_namespace(spec: &ClusterSecretSpec) -> Vec<String> {
    match &spec.match_namespace {
        Some(patterns) => patterns.clone(),
        None => {
            let labels_drive_matching = spec
                .match_labels
                .as_ref()
                .map(|m| !m.is_empty())
                .unwrap_or(false)
                && spec.matched_sets_join.unwrap_or_default() == MatchedSetsJoin::Union;
            if labels_drive_matching {
                Vec::new()
            } else {
                vec![".*".to_string()]
            }
        }
    }
}

/// spec §4.1: the full namespace inventory version of the algebra.
pub fn matched_namespaces<'a>(
    spec: &ClusterSecretSpec,
    namespaces: &[NamespaceInfo<'a>],
) -> Result<BTreeSet<&'a str>, Error> {
    let match_ns = effective_match_namespace(spec);
    let avoid_ns = spec.avoid_namespaces.clone().unwrap_or_default();
    let match_labels = spec.match_labels.clone().unwrap_or_default();
    let join = spec.matched_sets_join.unwrap_or_default();

    let name_matched = name_matches(&match_ns, namespaces)?;
    let label_matched = label_matches(&match_labels, namespaces);

    let matched = match join {
        MatchedSetsJoin::Intersection => name_matched.intersection(&label_matched).copied().collect(),
        MatchedSetsJoin::Union if !match_labels.is_empty() => {
            name_matched.union(&label_matched).copied().collect()
        }
        MatchedSetsJoin::Union => name_matched,
    };

    let avoided = name_matches(&avoid_ns, namespaces)?;
    Ok(matched.difference(&avoided).copied().collect())
}

/// spec §4.1 companion predicate `belongs(CS, N, labels(N))`: answers a
/// single-namespace membership query without enumerating the cluster, for
/// use by namespace/secret event handlers that already know which
/// namespace they care about.
pub fn belongs(spec: &ClusterSecretSpec, namespace: &str, labels: &BTreeMap<String, String>) -> Result<bool, Error> {
    let infos = [NamespaceInfo { name: namespace, labels }];
    Ok(!matched_namespaces(spec, &infos)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(
        match_namespace: Option<Vec<&str>>,
        avoid_namespaces: Option<Vec<&str>>,
        match_labels: Option<Vec<(&str, &str)>>,
        join: MatchedSetsJoin,
    ) -> ClusterSecretSpec {
        ClusterSecretSpec {
            data: None,
            from_secret: None,
            type_: None,
            match_namespace: match_namespace.map(|v| v.into_iter().map(String::from).collect()),
            avoid_namespaces: avoid_namespaces.map(|v| v.into_iter().map(String::from).collect()),
            match_labels: match_labels
                .map(|v| v.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            matched_sets_join: Some(join),
        }
    }

    fn ns<'a>(name: &'a str, labels: &'a BTreeMap<String, String>) -> NamespaceInfo<'a> {
        NamespaceInfo { name, labels }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn s1_match_all_inline() {
        let s = spec(None, None, None, MatchedSetsJoin::Union);
        let empty = BTreeMap::new();
        let namespaces = vec![
            ns("default", &empty),
            ns("kube-system", &empty),
            ns("a", &empty),
            ns("b", &empty),
        ];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched.len(), 4);
    }

    #[test]
    fn s2_pattern_and_avoid() {
        let s = spec(Some(vec!["example-.*"]), Some(vec!["example-1"]), None, MatchedSetsJoin::Union);
        let empty = BTreeMap::new();
        let namespaces = vec![
            ns("example-1", &empty),
            ns("example-2", &empty),
            ns("example-3", &empty),
            ns("other", &empty),
        ];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched, BTreeSet::from(["example-2", "example-3"]));
    }

    #[test]
    fn s3_label_intersection() {
        let s = spec(
            Some(vec![".*"]),
            None,
            Some(vec![("team", "x")]),
            MatchedSetsJoin::Intersection,
        );
        let a_labels = labels(&[("env", "prod")]);
        let b_labels = labels(&[("env", "prod"), ("team", "x")]);
        let c_labels = labels(&[("team", "x")]);
        let namespaces = vec![ns("a", &a_labels), ns("b", &b_labels), ns("c", &c_labels)];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched, BTreeSet::from(["b", "c"]));
    }

    #[test]
    fn labels_alone_drive_union_when_match_namespace_absent() {
        let s = spec(None, None, Some(vec![("team", "x")]), MatchedSetsJoin::Union);
        let a_labels = labels(&[("team", "x")]);
        let b_labels = labels(&[("team", "y")]);
        let namespaces = vec![ns("a", &a_labels), ns("b", &b_labels)];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched, BTreeSet::from(["a"]));
    }

    #[test]
    fn empty_match_namespace_is_distinct_from_absent() {
        // Explicit empty list: name-matching contributes nothing, labels
        // still drive union matching.
        let mut s = spec(Some(vec![]), None, Some(vec![("team", "x")]), MatchedSetsJoin::Union);
        s.match_namespace = Some(vec![]);
        let a_labels = labels(&[("team", "x")]);
        let namespaces = vec![ns("a", &a_labels)];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched, BTreeSet::from(["a"]));
    }

    #[rstest]
    #[case("example-.*", "example-1", true)]
    #[case("example-.*", "other", false)]
    #[case("a", "ab", true)] // re.match semantics: need not reach end of string
    #[case("^a$", "ab", false)]
    fn anchored_regex_matches_like_python_re_match(#[case] pattern: &str, #[case] name: &str, #[case] expect: bool) {
        let re = compile_anchored(pattern).unwrap();
        assert_eq!(re.is_match(name), expect);
    }

    #[test]
    fn duplicate_patterns_are_harmless() {
        let s = spec(Some(vec!["a.*", "a.*"]), None, None, MatchedSetsJoin::Union);
        let empty = BTreeMap::new();
        let namespaces = vec![ns("a1", &empty)];
        let matched = matched_namespaces(&s, &namespaces).unwrap();
        assert_eq!(matched, BTreeSet::from(["a1"]));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let s = spec(Some(vec!["("]), None, None, MatchedSetsJoin::Union);
        let empty = BTreeMap::new();
        let namespaces = vec![ns("a", &empty)];
        assert!(matched_namespaces(&s, &namespaces).is_err());
    }

    #[test]
    fn belongs_matches_single_namespace_query() {
        let s = spec(Some(vec!["example-.*"]), None, None, MatchedSetsJoin::Union);
        let empty = BTreeMap::new();
        assert!(belongs(&s, "example-1", &empty).unwrap());
        assert!(!belongs(&s, "other", &empty).unwrap());
    }
}
