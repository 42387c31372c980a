use std::time::Duration;

use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport, authentication or pool checkout failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected a catalog query.
    #[error("catalog query failed: {0}")]
    Query(#[source] tokio_postgres::Error),

    #[error("permission denied on {object}: {message}")]
    PermissionDenied { object: String, message: String },

    #[error("schema {0:?} not found")]
    SchemaNotFound(String),

    #[error("parse error: {message}\n  in: {statement}")]
    Parse { statement: String, message: String },

    #[error("unresolved {kind} reference: {name}")]
    UnresolvedReference { kind: &'static str, name: String },

    /// A failure inside one inspection phase, labeled with the phase.
    #[error("{phase}: {source}")]
    Phase {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("inspection timed out after {0:?}")]
    Timeout(Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            statement: statement.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(kind: &'static str, name: impl Into<String>) -> Self {
        Error::UnresolvedReference {
            kind,
            name: name.into(),
        }
    }

    pub fn permission_denied(object: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PermissionDenied {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Wrap with a phase label, unless already wrapped.
    pub fn in_phase(self, phase: &'static str) -> Self {
        match self {
            Error::Phase { .. } => self,
            other => Error::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through phase labels.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        let Some(db) = err.as_db_error() else {
            return Error::Connection(err.to_string());
        };
        if *db.code() == SqlState::INSUFFICIENT_PRIVILEGE {
            let object = db
                .table()
                .or(db.schema())
                .unwrap_or("catalog")
                .to_string();
            return Error::PermissionDenied {
                object,
                message: db.message().to_string(),
            };
        }
        Error::Query(err)
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(err) => err.into(),
            other => Error::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
