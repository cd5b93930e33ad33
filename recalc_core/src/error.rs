use std::error::Error as StdError;

/// Common error type for `recalc_core`.
///
/// Remote collaborators should preserve the underlying error chain via
/// `Error::remote_request` / `Error::remote_operation`. Anything that might
/// carry a URL must be redacted before it reaches a context string.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Count or page fetch failed (transport, non-2xx, unparseable body).
    #[error("remote request failed: {context}")]
    RemoteRequest {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// Bulk operation failed or its response was malformed.
    #[error("remote operation failed: {context}")]
    RemoteOperation {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// A remote failure in the middle of a traversal.
    ///
    /// `partial` holds the aggregate folded from the pages that completed before
    /// the failure. It is diagnostic only; nothing resumes from it.
    #[error("traversal of '{entity_type}' aborted after {pages_completed} page(s)")]
    TraversalAborted {
        entity_type: String,
        pages_completed: u64,
        partial: serde_json::Value,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn remote_request(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteRequest {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Remote request failure without an underlying error value (protocol violations).
    pub fn remote_request_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::RemoteRequest {
            context: context.into(),
            source: message.into(),
        }
    }

    pub fn remote_operation(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteOperation {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn remote_operation_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::RemoteOperation {
            context: context.into(),
            source: message.into(),
        }
    }

    /// Innermost `Error`, looking through `TraversalAborted`.
    pub fn root(&self) -> &Error {
        match self {
            Error::TraversalAborted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_remote_request(&self) -> bool {
        matches!(self.root(), Error::RemoteRequest { .. })
    }

    pub fn is_remote_operation(&self) -> bool {
        matches!(self.root(), Error::RemoteOperation { .. })
    }

    /// Aggregate accumulated before a mid-traversal failure, if any.
    pub fn partial_aggregate(&self) -> Option<&serde_json::Value> {
        match self {
            Error::TraversalAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_looks_through_aborted_traversal() {
        let err = Error::TraversalAborted {
            entity_type: "bug".to_string(),
            pages_completed: 1,
            partial: serde_json::json!({"total_errors": 2}),
            source: Box::new(Error::remote_request_msg("fetch ids", "connection reset")),
        };
        assert!(err.is_remote_request());
        assert!(!err.is_remote_operation());
        assert_eq!(
            err.partial_aggregate(),
            Some(&serde_json::json!({"total_errors": 2}))
        );
        assert_eq!(err.root().to_string(), "remote request failed: fetch ids");
    }

    #[test]
    fn source_chain_is_preserved() {
        let err = Error::remote_operation_msg("bulk validate", "reports missing");
        let source = StdError::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("reports missing"));
    }
}
