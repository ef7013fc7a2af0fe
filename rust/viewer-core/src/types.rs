// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handles and value types shared between the lifecycle and its services.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Identity of a host display surface.
    SurfaceId,
    "surface"
);
handle!(
    /// Identity of a viewer session within its registry.
    SessionId,
    "session"
);
handle!(
    /// Model identifier assigned by the fragments service.
    ModelId,
    "model"
);
handle!(SceneHandle, "scene");
handle!(CameraHandle, "camera");
handle!(RendererHandle, "renderer");
handle!(GridHandle, "grid");
handle!(
    /// Renderable object owned by a scene.
    ObjectHandle,
    "object"
);
handle!(
    /// Child element appended to a surface (telemetry panels and the like).
    ElementId,
    "element"
);

/// Camera placement: eye position and look-at target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAt {
    pub position: [f64; 3],
    pub target: [f64; 3],
}

/// Viewpoint every camera starts from.
pub const DEFAULT_VIEW: LookAt = LookAt {
    position: [10.0, 10.0, 10.0],
    target: [0.0, 0.0, 0.0],
};

/// Where the IFC decoder finds its WebAssembly payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderSettings {
    pub wasm_path: String,
    pub absolute: bool,
}

/// Local handle to fetched worker code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    /// URL the worker code was fetched from.
    pub source_url: String,
    /// Local URI the fragments service starts its worker from.
    pub local_uri: String,
    /// Size of the worker code in bytes.
    pub size: usize,
}

/// Render loop bracket reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Before,
    After,
}

/// Output of the IFC decoder, ready to be registered as fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedModel {
    /// User-facing name (usually the file name).
    pub name: String,
    /// IFC schema identifier, e.g. "IFC4".
    pub schema: String,
    /// Number of entities in the file.
    pub entity_count: usize,
    /// Number of geometry-bearing entities.
    pub geometry_count: usize,
    /// Converted geometry, opaque to the lifecycle.
    pub payload: Bytes,
}

/// A model as registered by the fragments service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModel {
    pub id: ModelId,
    pub name: String,
    /// Scene object carrying the model geometry.
    pub object: ObjectHandle,
}

/// A model loaded into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedModel {
    pub id: ModelId,
    pub name: String,
    pub schema: String,
    pub entity_count: usize,
    pub geometry_count: usize,
    pub object: ObjectHandle,
}

/// Serialized geometry of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedModel {
    pub model: ModelId,
    /// Suggested download name, derived from the model name.
    pub file_name: String,
    pub bytes: Bytes,
}

/// Where the bytes of a model come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// In-memory buffer, e.g. from a file picker.
    Bytes { data: Bytes, name: String },
    /// Remote file to fetch.
    Url(String),
}

impl ModelSource {
    pub fn bytes(data: impl Into<Bytes>, name: impl Into<String>) -> Self {
        ModelSource::Bytes {
            data: data.into(),
            name: name.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ModelSource::Url(url.into())
    }

    /// Display name the model will be registered under.
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Bytes { name, .. } => name.clone(),
            ModelSource::Url(url) => name_from_url(url),
        }
    }
}

/// The eight setup steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupStep {
    BindScene,
    BindCamera,
    BindRenderer,
    CreateGrid,
    ConfigureDecoder,
    AcquireWorker,
    AttachBridges,
    AttachTelemetry,
}

impl SetupStep {
    pub const ALL: [SetupStep; 8] = [
        SetupStep::BindScene,
        SetupStep::BindCamera,
        SetupStep::BindRenderer,
        SetupStep::CreateGrid,
        SetupStep::ConfigureDecoder,
        SetupStep::AcquireWorker,
        SetupStep::AttachBridges,
        SetupStep::AttachTelemetry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::BindScene => "bind scene",
            SetupStep::BindCamera => "bind camera",
            SetupStep::BindRenderer => "bind renderer",
            SetupStep::CreateGrid => "create grid",
            SetupStep::ConfigureDecoder => "configure decoder",
            SetupStep::AcquireWorker => "acquire worker",
            SetupStep::AttachBridges => "attach bridges",
            SetupStep::AttachTelemetry => "attach telemetry",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

/// Fallback when a URL has no usable file segment.
const DEFAULT_URL_MODEL_NAME: &str = "example.ifc";

/// Fallback export name for unnamed models.
const DEFAULT_EXPORT_NAME: &str = "fragments.frag";

/// Derive a model name from the last path segment of a URL.
pub fn name_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => without_query,
    };

    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| DEFAULT_URL_MODEL_NAME.to_string())
}

/// Suggested download name for the fragments of a model called `model_name`.
pub fn fragments_file_name(model_name: &str) -> String {
    let trimmed = model_name.trim();
    if trimmed.is_empty() {
        return DEFAULT_EXPORT_NAME.to_string();
    }
    let stem = match trimmed.rfind('.') {
        Some(dot) if dot > 0 && trimmed[dot + 1..].eq_ignore_ascii_case("ifc") => &trimmed[..dot],
        _ => trimmed,
    };
    format!("{stem}.frag")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_names_use_last_segment() {
        assert_eq!(
            name_from_url("https://thatopen.github.io/engine_components/resources/ifc/school_str.ifc"),
            "school_str.ifc"
        );
        assert_eq!(name_from_url("https://example.com/models/a.ifc?token=1#top"), "a.ifc");
        assert_eq!(name_from_url("https://example.com/models/"), "models");
        assert_eq!(name_from_url("https://example.com"), "example.ifc");
        assert_eq!(name_from_url("/local/path/tower.ifc"), "tower.ifc");
    }

    #[test]
    fn fragment_names_replace_ifc_extension() {
        assert_eq!(fragments_file_name("school_str.ifc"), "school_str.frag");
        assert_eq!(fragments_file_name("Tower.IFC"), "Tower.frag");
        assert_eq!(fragments_file_name("model"), "model.frag");
        assert_eq!(fragments_file_name("archive.ifczip"), "archive.ifczip.frag");
        assert_eq!(fragments_file_name("   "), "fragments.frag");
    }

    #[test]
    fn handles_display_with_prefix() {
        assert_eq!(ModelId(3).to_string(), "model#3");
        assert_eq!(SurfaceId(1).to_string(), "surface#1");
    }

    #[test]
    fn setup_steps_are_ordered() {
        assert_eq!(SetupStep::ALL.first(), Some(&SetupStep::BindScene));
        assert_eq!(SetupStep::ALL.last(), Some(&SetupStep::AttachTelemetry));
    }
}
