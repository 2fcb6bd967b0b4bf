use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    /// Write to a path that has no document yet.
    Set,
    /// Field updates, or a set over an existing document.
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Set => "set",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied: {operation} {path}")]
    PermissionDenied {
        path: String,
        operation: Operation,
        payload: Option<Value>,
    },
    #[error("invalid document path {0:?}")]
    InvalidPath(String),
    #[error("store backend failed at {path}")]
    Backend {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("malformed document at {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("local storage write failed for {key}: {reason}")]
    LocalWrite { key: String, reason: String },
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            StoreError::PermissionDenied { path, .. }
            | StoreError::Backend { path, .. }
            | StoreError::Decode { path, .. } => path,
            StoreError::InvalidPath(path) => path,
            StoreError::LocalWrite { key, .. } => key,
        }
    }
}

/// Where failed remote writes are reported once the caller has handled them.
///
/// The client registers one sink at the top level; tests use [`CollectingSink`].
pub trait ErrorSink: Send + Sync {
    fn report(&self, err: StoreError);
}

/// Sink half of an mpsc pair, drained by the client each frame.
#[derive(Debug, Clone)]
pub struct ErrorChannel {
    tx: Sender<StoreError>,
}

impl ErrorChannel {
    pub fn new() -> (Self, Receiver<StoreError>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ErrorChannel {
    fn report(&self, err: StoreError) {
        if self.tx.send(err).is_err() {
            tracing::warn!("error channel closed; dropping store error");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    errors: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, err: StoreError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(err.to_string());
        }
    }
}
