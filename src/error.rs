//! Fatal build errors
//!
//! Everything in here aborts a build before any output is written. Broken
//! references are reported separately (see [`crate::content::ValidationReport`])
//! and only end up here when a strict build promotes them.

use std::path::PathBuf;
use thiserror::Error;

use crate::content::SourceId;

/// Result alias for the content pipeline
pub type Result<T, E = ContentError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{source_id}:{line}: malformed front matter: {message}")]
    MalformedHeader {
        source_id: SourceId,
        line: usize,
        message: String,
    },

    #[error("{source_id}: missing required front-matter field `{field}`")]
    MissingRequiredField {
        source_id: SourceId,
        field: &'static str,
    },

    #[error("{source_id}: invalid date `{value}` (expected `YYYY-MM-DD HH:MM:SS +HHMM`)")]
    InvalidDate { source_id: SourceId, value: String },

    #[error("{source_id}: {kind} `{identifier}` is already used by {existing}")]
    DuplicateIdentifier {
        source_id: SourceId,
        kind: IdentifierKind,
        identifier: String,
        existing: SourceId,
    },

    #[error("{source_id}:{line}: code fence opened here is never closed")]
    UnterminatedCodeFence { source_id: SourceId, line: usize },

    #[error("output path `{}` is produced by both {first} and {second}", path.display())]
    OutputPathCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("{count} broken reference(s) found in strict mode")]
    BrokenReferences { count: usize },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Source identity of the offending document, if the error is tied to one
    pub fn source_id(&self) -> Option<&SourceId> {
        match self {
            Self::MalformedHeader { source_id, .. }
            | Self::MissingRequiredField { source_id, .. }
            | Self::InvalidDate { source_id, .. }
            | Self::DuplicateIdentifier { source_id, .. }
            | Self::UnterminatedCodeFence { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

/// Which identifier collided during registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Permalink,
    Slug,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Permalink => f.write_str("permalink"),
            IdentifierKind::Slug => f.write_str("slug"),
        }
    }
}
