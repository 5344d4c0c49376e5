//! Binary entry point (spec.md §2, SPEC_FULL.md §2): owns process-wide
//! concerns only — tracing init, `Config::from_env()`, client construction,
//! cache warm-up, and wiring the `kube::runtime::Controller` with its two
//! secondary watches into [`dispatch`]. All reconciliation logic lives in
//! the library modules; this file is the "thin adapter" Design Note 1
//! calls for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};

mod cache;
mod config;
mod crd;
mod dispatch;
mod error;
mod executor;
mod finalizer;
mod projection;
mod selection;
mod status;

use cache::{Cache, CacheEntry, InMemoryCache};
use config::Config;
use crd::ClusterSecret;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        version = %config.version,
        replace_existing = config.replace_existing,
        in_cluster = config.in_cluster,
        "starting clustersecret controller"
    );

    let client = Client::try_default()
        .await
        .expect("a valid kubeconfig (or in-cluster service account) is required to start");

    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
    warm_cache(&client, &cache).await;

    // Shared with the `Namespace` watch mapper below so a namespace
    // create/re-label/delete can hand `apply` the exact namespace(s) to
    // test instead of making it re-list the cluster (spec §1/§4.4).
    let namespace_hints: Arc<Mutex<HashMap<String, Vec<dispatch::NamespaceHint>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let context = Arc::new(dispatch::Context {
        client: client.clone(),
        cache: cache.clone(),
        config,
        namespace_hints: namespace_hints.clone(),
    });

    let cluster_secrets: Api<ClusterSecret> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client.clone());

    Controller::new(cluster_secrets, watcher::Config::default())
        .watches(
            namespaces,
            watcher::Config::default(),
            dispatch::map_namespace_event(cache.clone(), namespace_hints),
        )
        .watches(secrets, watcher::Config::default(), dispatch::map_secret_event(cache.clone()))
        .shutdown_on_signal()
        .run(dispatch::reconcile, dispatch::error_policy, context)
        .for_each(|reconcile_result| async move {
            match reconcile_result {
                Ok((object_ref, action)) => {
                    tracing::debug!(name = %object_ref.name, ?action, "reconciled");
                }
                Err(error) => {
                    tracing::error!(%error, "reconcile failed");
                }
            }
        })
        .await;
}

/// spec §4.5 "Startup": lists every `ClusterSecret` and warms the cache
/// before the `Controller` starts so namespace/secret events that race the
/// controller's own initial listing can still be resolved in O(1). The
/// `Controller`'s own initial listing then re-enters `dispatch::reconcile`
/// for each object, which is the "sync each as if freshly created"
/// recovery behavior spec §4.5 asks for.
async fn warm_cache(client: &Client, cache: &Arc<dyn Cache>) {
    let api: Api<ClusterSecret> = Api::all(client.clone());
    let existing = match api.list(&Default::default()).await {
        Ok(list) => list,
        Err(error) => {
            tracing::warn!(%error, "failed to list ClusterSecrets at startup; cache starts empty");
            return;
        }
    };

    for cs in existing {
        let Some(uid) = cs.metadata.uid.clone() else { continue };
        let name = cs.name_any();
        cache.put(CacheEntry {
            uid,
            name,
            body: cs,
            synced_namespaces: Default::default(),
        });
    }
    tracing::info!(count = cache.iterate_all().len(), "cache warmed from existing ClusterSecrets");
}
