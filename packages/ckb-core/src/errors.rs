//! Unified error type for ckb-core.
//!
//! Mirrors `ckb_storage::StorageError`'s shape — kind enum, message, optional
//! boxed source — and adds two fields the storage boundary doesn't need:
//! suggested fixes and a free-form detail map, both surfaced to clients.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Closed set of error kinds a CKB response can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BackendUnavailable,
    Timeout,
    SymbolNotFound,
    InvalidParameter,
    SnapshotMismatch,
    StatsMismatch,
    HashMismatch,
    UnsupportedVersion,
    MissingField,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SymbolNotFound => "symbol_not_found",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::SnapshotMismatch => "snapshot_mismatch",
            ErrorKind::StatsMismatch => "stats_mismatch",
            ErrorKind::HashMismatch => "hash_mismatch",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A suggested follow-up command, surfaced to the client alongside an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedFix {
    pub command: String,
    /// Whether running `command` is safe without further confirmation —
    /// e.g. `doctor --check=index` vs. `git init`, which changes repo state.
    pub safe: bool,
}

/// Unified CKB error.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct CkbError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
    pub suggested_fixes: Vec<SuggestedFix>,
    pub details: HashMap<String, String>,
}

impl CkbError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            suggested_fixes: Vec::new(),
            details: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_fix(mut self, command: impl Into<String>, safe: bool) -> Self {
        self.suggested_fixes.push(SuggestedFix {
            command: command.into(),
            safe,
        });
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn symbol_not_found(symbol_id: impl Into<String>) -> Self {
        let id = symbol_id.into();
        Self::new(ErrorKind::SymbolNotFound, format!("symbol not found: {id}"))
            .with_detail("symbolId", id)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn snapshot_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        let (expected, found) = (expected.into(), found.into());
        Self::new(
            ErrorKind::SnapshotMismatch,
            format!("expected base snapshot {expected}, current snapshot is {found}"),
        )
        .with_detail("expected", expected)
        .with_detail("found", found)
    }

    pub fn stats_mismatch(field: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::StatsMismatch,
            format!("declared stats do not match recomputed stats for field: {}", field.into()),
        )
    }

    pub fn hash_mismatch(entity: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::HashMismatch,
            format!("spot-checked hash mismatch for entity: {}", entity.into()),
        )
    }

    pub fn unsupported_version(found: u32, max_supported: u32) -> Self {
        Self::new(
            ErrorKind::UnsupportedVersion,
            format!("schema version {found} is unsupported (max supported is {max_supported})"),
        )
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingField, format!("missing required field: {}", field.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl From<ckb_storage::StorageError> for CkbError {
    fn from(err: ckb_storage::StorageError) -> Self {
        let kind = match err.kind {
            ckb_storage::ErrorKind::SnapshotNotFound => ErrorKind::SnapshotMismatch,
            ckb_storage::ErrorKind::SymbolNotFound => ErrorKind::SymbolNotFound,
            _ => ErrorKind::BackendUnavailable,
        };
        CkbError::new(kind, err.message.clone()).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, CkbError>;
