//! Error taxonomy shared by every workflow.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A definition, repository or installation record is absent.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// The downloaded artifact does not hash to the recorded digest.
    #[error("checksums did not match for {name}: expected {expected} but saw {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// An unqualified alias is offered by more than one repository.
    #[error(
        "more than one match found for {alias}; specify the fully qualified name. Matches: {}",
        .candidates.join(", ")
    )]
    Ambiguous {
        alias: String,
        candidates: Vec<String>,
    },

    #[error("another apm process holds the lock at {}", .path.display())]
    Locked { path: PathBuf },

    #[error("{0} is already registered as a repository")]
    RepositoryExists(String),

    #[error("{0} is not a valid alias (must be in the form of organization/repository)")]
    InvalidAlias(String),

    #[error("{0} is not a valid qualified name (must be in the form of organization/repository:plugin)")]
    InvalidQualifiedName(String),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("{program} exited with {status}: {output}")]
    CommandFailed {
        program: String,
        status: String,
        output: String,
    },

    #[error("git: {0}")]
    Git(String),

    #[error("failed to download {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The node's admin API refused the connection. Callers may treat this
    /// as "node not running".
    #[error("admin API at {endpoint} is unreachable: {reason}")]
    AdminUnreachable { endpoint: String, reason: String },

    #[error("admin API call {method} failed: {message}")]
    AdminApi { method: String, message: String },

    #[error("invalid definition {}: {reason}", .path.display())]
    InvalidDefinition { path: PathBuf, reason: String },

    #[error("archive entry {} escapes the extraction directory", .0.display())]
    UnsafeArchiveEntry(PathBuf),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to parse {}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse config {}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Error {
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            context: "I/O error".to_string(),
            source,
        }
    }
}

/// Attach a message to I/O failures, in the spirit of `anyhow::Context`.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}
