// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contracts of the external collaborators a viewer session drives.
//!
//! Rendering, IFC decoding and fragments processing are opaque to the
//! lifecycle. Each is reached only through the traits below; a
//! [`ViewerBackend`] hands out one [`ServiceSet`] per surface.

use crate::error::{FetchError, ServiceError};
use crate::events::EventHub;
use crate::surface::Surface;
use crate::types::{
    CameraHandle, DecodedModel, DecoderSettings, ElementId, GridHandle, LookAt, ModelId,
    ObjectHandle, RegisteredModel, RenderPhase, RendererHandle, SceneHandle, SurfaceId,
    WorkerEndpoint,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Progress callback, called with a percentage in `[0, 100]`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Scene graph, camera and renderer.
#[async_trait]
pub trait SceneService: Send + Sync {
    fn create_scene(&self, surface: &Surface) -> Result<SceneHandle, ServiceError>;

    fn create_camera(&self, surface: &Surface) -> Result<CameraHandle, ServiceError>;

    fn create_renderer(&self, surface: &Surface) -> Result<RendererHandle, ServiceError>;

    /// Move the camera. Completes when the camera controls settle.
    async fn set_look_at(&self, camera: CameraHandle, view: LookAt) -> Result<(), ServiceError>;

    fn add_grid_visual(&self, scene: SceneHandle) -> Result<GridHandle, ServiceError>;

    fn attach_object(&self, scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError>;

    fn detach_object(&self, scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError>;

    /// Detach the renderer from its surface.
    fn release_renderer(&self, renderer: RendererHandle);

    /// Fired whenever camera controls move a camera.
    fn camera_updates(&self) -> EventHub<CameraHandle>;

    /// Fired around every rendered frame.
    fn render_events(&self) -> EventHub<RenderPhase>;
}

/// IFC-to-geometry decoder.
#[async_trait]
pub trait IfcDecoder: Send + Sync {
    /// Tell the decoder where its WebAssembly payload lives. Must precede `decode`.
    async fn configure(&self, settings: DecoderSettings) -> Result<(), ServiceError>;

    async fn decode(
        &self,
        bytes: Bytes,
        name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DecodedModel, ServiceError>;
}

/// Worker-backed fragments geometry service.
#[async_trait]
pub trait FragmentsService: Send + Sync {
    /// Fetch worker code and turn it into a local endpoint.
    async fn acquire_worker_endpoint(&self, url: &str) -> Result<WorkerEndpoint, ServiceError>;

    /// Start background processing from `endpoint`.
    async fn init(&self, endpoint: &WorkerEndpoint) -> Result<(), ServiceError>;

    /// Register a decoded model. Fires [`FragmentsService::model_registered`].
    async fn register_model(&self, model: DecodedModel) -> Result<RegisteredModel, ServiceError>;

    fn model_registered(&self) -> EventHub<RegisteredModel>;

    fn bind_camera(&self, model: ModelId, camera: CameraHandle) -> Result<(), ServiceError>;

    /// Refresh visible geometry; `force` skips the worker's throttling.
    fn update(&self, force: bool);

    async fn serialize_model(&self, model: ModelId) -> Result<Bytes, ServiceError>;

    async fn unload_model(&self, model: ModelId) -> Result<(), ServiceError>;

    /// Stop background processing and drop every model.
    async fn shutdown(&self);
}

/// Performance overlay bracketing render frames.
pub trait TelemetryOverlay: Send + Sync {
    /// Append the overlay to `surface`.
    fn mount(&self, surface: &Surface) -> Result<ElementId, ServiceError>;

    fn begin(&self);

    fn end(&self);

    fn unmount(&self, surface: &Surface, element: ElementId);
}

/// Network access for worker code and remote models.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Collaborators bound to one session.
#[derive(Clone)]
pub struct ServiceSet {
    pub scene: Arc<dyn SceneService>,
    pub decoder: Arc<dyn IfcDecoder>,
    pub fragments: Arc<dyn FragmentsService>,
    pub telemetry: Arc<dyn TelemetryOverlay>,
    pub fetcher: Arc<dyn ByteFetcher>,
}

impl std::fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSet").finish_non_exhaustive()
    }
}

/// Factory for per-surface service sets.
pub trait ViewerBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn services(&self, surface: &Surface) -> Result<ServiceSet, ServiceError>;

    /// Called once the session bound to `surface` has been torn down.
    fn release(&self, _surface: SurfaceId) {}
}
