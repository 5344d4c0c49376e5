//! Finalizer handling for `ClusterSecret` deletion.
//!
//! The teacher operator hand-rolled finalizer add/remove as two merge-patch
//! calls (`Patch::Merge` against `metadata.finalizers`). Modern
//! `kube::runtime` ships that exact pattern as `finalizer()`, so this
//! module is now a thin name for it plus the finalizer string constant,
//! rather than the patch calls themselves.
//!
//! The finalizer here exists purely so `dispatch::cleanup` gets a chance
//! to prune the in-memory cache entry on delete (spec §3.3, §4.5) — it
//! does not block deletion on any remote cleanup, since child Secrets are
//! reclaimed by Kubernetes garbage collection via the owner reference
//! (spec §3.3), not by an explicit delete loop here.

use std::sync::Arc;

use futures::future::BoxFuture;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};

use crate::crd::ClusterSecret;
use crate::error::Error;

pub const FINALIZER_NAME: &str = "clustersecret.io/finalizer";

/// Runs `apply`/`cleanup` under the `clustersecret.io/finalizer` guard.
pub async fn guarded<'a, Apply, Cleanup>(
    api: &Api<ClusterSecret>,
    cs: Arc<ClusterSecret>,
    apply: Apply,
    cleanup: Cleanup,
) -> Result<Action, Error>
where
    Apply: FnOnce(Arc<ClusterSecret>) -> BoxFuture<'a, Result<Action, Error>>,
    Cleanup: FnOnce(Arc<ClusterSecret>) -> BoxFuture<'a, Result<Action, Error>>,
{
    finalizer(api, FINALIZER_NAME, cs, |event| async move {
        match event {
            FinalizerEvent::Apply(cs) => apply(cs).await,
            FinalizerEvent::Cleanup(cs) => cleanup(cs).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}
