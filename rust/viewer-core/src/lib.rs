// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Lite Viewer Core
//!
//! Lifecycle and model-loading state machine for IFC viewers.
//!
//! A viewer is glue between a scene renderer, an IFC decoder, a worker-based
//! fragments geometry service and a telemetry overlay. This crate owns the
//! part that has to be right: the one-time setup sequence, the guarantees
//! around re-entrant initialization, and the load/export/unload contract once
//! a viewer is ready. The collaborators themselves are traits in
//! [`services`]; `ifc-lite-viewer-headless` provides implementations.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_lite_viewer_core::{ModelSource, SessionRegistry, Surface, ViewerConfig};
//!
//! let registry = SessionRegistry::new(backend, ViewerConfig::from_env());
//! let surface = Surface::new("viewer", 1280, 720);
//!
//! let session = registry.create(Some(&surface))?;
//! session.initialize().await?;
//!
//! let model = session
//!     .load_model(ModelSource::url("https://example.com/school_str.ifc"), None)
//!     .await?;
//! let exported = session.export_model(model.id).await?;
//! std::fs::write(&exported.file_name, &exported.bytes)?;
//! ```
//!
//! ## Lifecycle
//!
//! `Uninitialized → Initializing → Ready → Destroyed`. Setup binds, in order:
//! scene, camera (fixed default viewpoint), renderer, the navigational grid
//! (once per registry), decoder WebAssembly location, fragments worker
//! endpoint, camera/model event bridges and the telemetry overlay.

pub mod config;
pub mod error;
pub mod events;
pub mod load;
pub mod registry;
pub mod services;
pub mod session;
pub mod surface;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::ViewerConfig;
pub use error::{FetchError, Result, ServiceError, ViewerError};
pub use events::{EventHub, Listener, Subscription, SubscriptionList};
pub use load::PendingLoad;
pub use registry::{GridSlot, SessionRegistry, SharedState};
pub use services::{
    ByteFetcher, FragmentsService, IfcDecoder, ProgressCallback, SceneService, ServiceSet,
    TelemetryOverlay, ViewerBackend,
};
pub use session::ViewerSession;
pub use surface::Surface;
pub use types::{
    fragments_file_name, name_from_url, CameraHandle, DecodedModel, DecoderSettings, ElementId,
    ExportedModel, GridHandle, LoadedModel, LookAt, ModelId, ModelSource, ObjectHandle,
    RegisteredModel, RenderPhase, RendererHandle, SceneHandle, SessionId, SessionState,
    SetupStep, SurfaceId, WorkerEndpoint, DEFAULT_VIEW,
};
