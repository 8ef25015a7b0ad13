//! Consolidated error taxonomy (§7).
//!
//! One discriminated variant per taxonomy kind, per the Design Notes'
//! "exceptions used as control flow" guidance: the retry FSM in
//! `meridian-client` inspects `ErrorKind` rather than unwinding, and
//! exactly one `Error` is raised per command, carrying the chain of prior
//! attempt errors for diagnosis.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The taxonomy kind, independent of any particular attempt's details.
/// Used by the retry FSM to decide whether a failure is retryable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Timeout,
    Authentication,
    Protocol,
    Server,
    InDoubt,
    Cancelled,
}

/// A single taxonomy-tagged failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("socket timeout after {0:?}")]
    SocketTimeout(std::time::Duration),

    #[error("total timeout exceeded after {0:?}")]
    TotalTimeout(std::time::Duration),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("protocol parse error: {0}")]
    Protocol(String),

    #[error("server error (code {code}): {message}")]
    Server {
        code: u8,
        message: String,
        retryable: bool,
    },

    #[error("record not found")]
    NotFound,

    #[error("filtered out by policy predicate")]
    FilteredOut,

    #[error("operation cancelled")]
    Cancelled,

    #[error("no node is reachable in the cluster: {0}")]
    InvalidNode(String),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Connection(_) | Error::PoolExhausted | Error::InvalidNode(_) | Error::Io(_) => {
                ErrorKind::Connection
            }
            Error::SocketTimeout(_) | Error::TotalTimeout(_) => ErrorKind::Timeout,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Server { .. } | Error::NotFound | Error::FilteredOut => ErrorKind::Server,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the retry FSM is allowed to attempt this command again.
    /// Not-found and filtered-out are terminal-but-not-failures from the
    /// server's point of view, so they are not retryable either.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Server { retryable, .. } => *retryable,
            Error::SocketTimeout(_) => true,
            Error::Connection(_) | Error::Io(_) => true,
            Error::PoolExhausted => true,
            _ => false,
        }
    }
}

/// Wraps a terminal `Error` together with every prior attempt's error, and
/// whether the failing operation was a write whose acknowledgement never
/// arrived (§7 "In-doubt write").
#[derive(Debug, Error)]
#[error("{last}")]
pub struct CommandError {
    pub last: Error,
    pub node: Option<String>,
    pub in_doubt: bool,
    pub attempts: Vec<Error>,
}

impl CommandError {
    pub fn new(last: Error) -> Self {
        Self {
            last,
            node: None,
            in_doubt: false,
            attempts: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_in_doubt(mut self, in_doubt: bool) -> Self {
        self.in_doubt = in_doubt;
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<Error>) -> Self {
        self.attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_retryable_flag_drives_is_retryable() {
        let retryable = Error::Server {
            code: 13,
            message: "partition unavailable".into(),
            retryable: true,
        };
        assert!(retryable.is_retryable());

        let fatal = Error::Server {
            code: 5,
            message: "record too big".into(),
            retryable: false,
        };
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn socket_timeout_is_retryable_but_total_timeout_is_not() {
        assert!(Error::SocketTimeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!Error::TotalTimeout(std::time::Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn command_error_carries_attempt_chain() {
        let attempts = vec![
            Error::SocketTimeout(std::time::Duration::from_millis(100)),
            Error::Connection("reset".into()),
        ];
        let err = CommandError::new(Error::Connection("reset".into()))
            .with_node("BB9020011AC4202")
            .with_in_doubt(false)
            .with_attempts(attempts);
        assert_eq!(err.attempts.len(), 2);
        assert_eq!(err.node.as_deref(), Some("BB9020011AC4202"));
    }

    #[test]
    fn kind_classification_matches_taxonomy() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::NotFound.kind(), ErrorKind::Server);
        assert_eq!(Error::PoolExhausted.kind(), ErrorKind::Connection);
    }
}
