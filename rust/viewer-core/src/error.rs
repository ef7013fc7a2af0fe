// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the viewer lifecycle.
//!
//! Collaborating services report [`ServiceError`]; the session translates
//! those into [`ViewerError`] according to the operation that was running.
//! `ViewerError` is `Clone` because a single in-flight initialization
//! outcome is handed to every caller awaiting it.

use crate::types::{ModelId, SetupStep};
use thiserror::Error;

/// Errors reported by viewer sessions and the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error("Invalid display surface: {0}")]
    InvalidSurface(String),

    #[error("Viewer session is not ready")]
    NotReady,

    #[error("Viewer session has been destroyed")]
    SessionDestroyed,

    #[error("Failed to decode '{name}': {reason}")]
    DecodeFailure { name: String, reason: String },

    #[error("Failed to fetch {url}: {reason}")]
    EndpointFetchFailure { url: String, reason: String },

    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Model {0} is not loaded in this session")]
    ModelNotFound(ModelId),

    #[error("Setup step '{step}' failed: {reason}")]
    SetupFailed { step: SetupStep, reason: String },

    #[error("Export of model {model} failed: {reason}")]
    ExportFailure { model: ModelId, reason: String },

    #[error("Viewer setup task aborted: {0}")]
    SetupAborted(String),
}

impl ViewerError {
    /// Whether re-invoking the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ViewerError::EndpointFetchFailure { .. }
                | ViewerError::SetupFailed { .. }
                | ViewerError::SetupAborted(_)
                | ViewerError::NotReady
        )
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ViewerError::InvalidSurface(_) => "INVALID_SURFACE",
            ViewerError::NotReady => "NOT_READY",
            ViewerError::SessionDestroyed => "SESSION_DESTROYED",
            ViewerError::DecodeFailure { .. } => "DECODE_FAILURE",
            ViewerError::EndpointFetchFailure { .. } => "ENDPOINT_FETCH_FAILURE",
            ViewerError::NoModelLoaded => "NO_MODEL_LOADED",
            ViewerError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            ViewerError::SetupFailed { .. } => "SETUP_FAILED",
            ViewerError::ExportFailure { .. } => "EXPORT_FAILURE",
            ViewerError::SetupAborted(_) => "SETUP_ABORTED",
        }
    }
}

/// Result alias for viewer operations.
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Failure of a byte fetch (worker code or remote model).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Empty response body")]
    EmptyBody,

    #[error("{0}")]
    Other(String),
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("fetch of {url} failed: {source}")]
    Fetch { url: String, source: FetchError },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("service not configured: {0}")]
    NotConfigured(String),

    #[error("unknown model {0}")]
    UnknownModel(ModelId),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Rejected(String),
}

impl ServiceError {
    /// Map a failure during the given setup step.
    pub(crate) fn into_setup_error(self, step: SetupStep) -> ViewerError {
        match self {
            ServiceError::Fetch { url, source } => ViewerError::EndpointFetchFailure {
                url,
                reason: source.to_string(),
            },
            other => ViewerError::SetupFailed {
                step,
                reason: other.to_string(),
            },
        }
    }

    /// Map a failure while loading the model called `name`.
    pub(crate) fn into_load_error(self, name: &str) -> ViewerError {
        match self {
            ServiceError::Fetch { url, source } => ViewerError::EndpointFetchFailure {
                url,
                reason: source.to_string(),
            },
            other => ViewerError::DecodeFailure {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Map a failure while serializing `model`.
    pub(crate) fn into_export_error(self, model: ModelId) -> ViewerError {
        match self {
            ServiceError::UnknownModel(id) => ViewerError::ModelNotFound(id),
            other => ViewerError::ExportFailure {
                model,
                reason: other.to_string(),
            },
        }
    }
}
