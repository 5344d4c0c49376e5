use std::time::Duration;

/// All errors possible to occur during reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube` crate.
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// A malformed `matchNamespace`/`avoidNamespaces` regular expression.
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A ClusterSecret failed validation (spec §7: Validation errors).
    /// Logged, not retried, until the spec changes.
    #[error("invalid ClusterSecret {name}: {reason}")]
    Validation { name: String, reason: String },

    /// Error raised by the `kube::runtime::finalizer` wrapper.
    #[error("finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    /// Expected object field was missing (e.g. `metadata.uid`).
    #[error("missing object field: {name}")]
    MissingObjectKey { name: &'static str },
}

impl Error {
    /// How long to wait before re-queuing a reconcile that failed with this
    /// error. Validation errors are "permanent" (spec §7): there is
    /// nothing to retry until the resource is edited, so they get a long
    /// backoff rather than a tight retry loop.
    ///
    /// Every error returned by `apply`/`cleanup` is boxed by
    /// `kube::runtime::finalizer::finalizer()` into `Error::Finalizer`
    /// before `dispatch::error_policy` ever sees it, so the backoff decision
    /// has to look through that wrapper at the original cause, not just
    /// match on `self`.
    pub fn requeue_after(&self) -> Duration {
        match self.root_cause() {
            Error::Validation { .. } => Duration::from_secs(300),
            _ => Duration::from_secs(5),
        }
    }

    /// Unwraps the `kube::runtime::finalizer` wrapper (if present) to find
    /// the error `apply`/`cleanup` actually returned.
    fn root_cause(&self) -> &Error {
        match self {
            Error::Finalizer(inner) => match inner.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(source)
                | kube::runtime::finalizer::Error::CleanupFailed(source) => source.root_cause(),
                _ => self,
            },
            _ => self,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_error() -> Error {
        Error::Validation {
            name: "s1".to_string(),
            reason: "both data and fromSecret set".to_string(),
        }
    }

    #[test]
    fn bare_validation_error_gets_long_backoff() {
        assert_eq!(validation_error().requeue_after(), Duration::from_secs(300));
    }

    #[test]
    fn validation_error_boxed_by_finalizer_apply_still_gets_long_backoff() {
        let wrapped = Error::Finalizer(Box::new(kube::runtime::finalizer::Error::ApplyFailed(
            validation_error(),
        )));
        assert_eq!(wrapped.requeue_after(), Duration::from_secs(300));
    }

    #[test]
    fn validation_error_boxed_by_finalizer_cleanup_still_gets_long_backoff() {
        let wrapped = Error::Finalizer(Box::new(kube::runtime::finalizer::Error::CleanupFailed(
            validation_error(),
        )));
        assert_eq!(wrapped.requeue_after(), Duration::from_secs(300));
    }

    #[test]
    fn transient_kube_error_gets_short_backoff_even_when_boxed() {
        let inner = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "internal error".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        });
        let wrapped = Error::Finalizer(Box::new(kube::runtime::finalizer::Error::ApplyFailed(
            Error::KubeError { source: inner },
        )));
        assert_eq!(wrapped.requeue_after(), Duration::from_secs(5));
    }
}
