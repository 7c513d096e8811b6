// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for reedkv operations.
//!
//! Every layer of the store (record files, nodes, tree engine, persister,
//! registry, dispatcher) returns [`Result<T>`], converting lower-level
//! failures into [`Error`] with `?`.

use std::fmt;
use std::path::PathBuf;

/// Standard Result type for all reedkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy used to classify [`Error`] for a front-end's status
/// mapping (see the dispatcher's response-status contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dataset unknown, key absent, record file missing.
    NotFound,
    /// Dataset name collision on create.
    AlreadyExists,
    /// Bad argument: order < 3, empty name, lo > hi, oversized request.
    InvalidArgument,
    /// Open/read/write/rename/unlink failed.
    IoFailure,
    /// JSON malformed, schema missing fields, child count mismatch.
    Corruption,
    /// Dataset table full, request body too large.
    CapacityExceeded,
}

/// Errors that can occur anywhere in reedkv.
#[derive(Debug)]
pub enum Error {
    /// A dataset with this name is not known to the registry.
    DatasetNotFound { name: String },

    /// A dataset with this name already exists.
    DatasetAlreadyExists { name: String },

    /// A key was not present in the dataset.
    KeyNotFound { key: i32 },

    /// A record file referenced by a leaf does not exist or is unreadable.
    RecordFileMissing { file_id: String },

    /// The B+ tree order is invalid (must be >= 3).
    InvalidOrder { order: u16 },

    /// A range query had `lo > hi`.
    InvalidRange { lo: i32, hi: i32 },

    /// An empty or otherwise malformed dataset name was supplied.
    InvalidName { name: String },

    /// A bulk-insert request exceeded the dispatcher's size caps.
    RequestTooLarge { reason: String },

    /// The dataset registry table is at capacity.
    RegistryFull { capacity: usize },

    /// Underlying I/O failure.
    Io {
        operation: String,
        path: Option<PathBuf>,
        source: std::io::Error,
    },

    /// The `index.json` document could not be parsed.
    IndexCorrupted { path: PathBuf, reason: String },

    /// A node's `children` array did not have `keys.len() + 1` entries.
    ChildCountMismatch {
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Classifies this error for a front-end's status-code mapping.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatasetNotFound { .. }
            | Self::KeyNotFound { .. }
            | Self::RecordFileMissing { .. } => ErrorKind::NotFound,

            Self::DatasetAlreadyExists { .. } => ErrorKind::AlreadyExists,

            Self::InvalidOrder { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidName { .. } => ErrorKind::InvalidArgument,

            Self::RequestTooLarge { .. } | Self::RegistryFull { .. } => {
                ErrorKind::CapacityExceeded
            }

            Self::Io { .. } => ErrorKind::IoFailure,

            Self::IndexCorrupted { .. } | Self::ChildCountMismatch { .. } => {
                ErrorKind::Corruption
            }
        }
    }

    pub(crate) fn io(operation: impl Into<String>, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let operation = operation.into();
        let path = path.into();
        move |source| Self::Io {
            operation,
            path: Some(path),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatasetNotFound { name } => write!(f, "dataset '{name}' not found"),
            Self::DatasetAlreadyExists { name } => write!(f, "dataset '{name}' already exists"),
            Self::KeyNotFound { key } => write!(f, "key {key} not found"),
            Self::RecordFileMissing { file_id } => {
                write!(f, "record file '{file_id}' missing or unreadable")
            }
            Self::InvalidOrder { order } => {
                write!(f, "B+ tree order must be >= 3, got {order}")
            }
            Self::InvalidRange { lo, hi } => {
                write!(f, "invalid range: lo ({lo}) > hi ({hi})")
            }
            Self::InvalidName { name } => write!(f, "invalid dataset name: '{name}'"),
            Self::RequestTooLarge { reason } => write!(f, "request too large: {reason}"),
            Self::RegistryFull { capacity } => {
                write!(f, "dataset registry is full (capacity {capacity})")
            }
            Self::Io {
                operation,
                path,
                source,
            } => match path {
                Some(p) => write!(f, "I/O error during '{operation}' on {}: {source}", p.display()),
                None => write!(f, "I/O error during '{operation}': {source}"),
            },
            Self::IndexCorrupted { path, reason } => {
                write!(f, "index at {} is corrupted: {reason}", path.display())
            }
            Self::ChildCountMismatch { expected, actual } => write!(
                f,
                "internal node child count mismatch: expected {expected}, got {actual}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::IndexCorrupted {
            path: PathBuf::new(),
            reason: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification() {
        assert_eq!(
            Error::DatasetNotFound { name: "x".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::DatasetAlreadyExists { name: "x".into() }.kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            Error::InvalidRange { lo: 5, hi: 1 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            Error::RegistryFull { capacity: 100 }.kind(),
            ErrorKind::CapacityExceeded
        );
    }

    #[test]
    fn display_includes_context() {
        let err = Error::KeyNotFound { key: 42 };
        assert_eq!(err.to_string(), "key 42 not found");
    }
}
