// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Counting in-memory services for lifecycle tests.

use crate::error::{FetchError, ServiceError};
use crate::events::EventHub;
use crate::services::{
    ByteFetcher, FragmentsService, IfcDecoder, ProgressCallback, SceneService, ServiceSet,
    TelemetryOverlay, ViewerBackend,
};
use crate::surface::Surface;
use crate::types::{
    CameraHandle, DecodedModel, DecoderSettings, ElementId, GridHandle, LookAt, ModelId,
    ObjectHandle, RegisteredModel, RenderPhase, RendererHandle, SceneHandle, SurfaceId,
    WorkerEndpoint,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn sample_ifc() -> Vec<u8> {
    b"ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n#1=IFCPROJECT('0x',$,'School',$,$,$,$,$,$);\n#2=IFCWALL('1x',$,$,$,$,$,$,$);\nENDSEC;\nEND-ISO-10303-21;\n".to_vec()
}

/// One session's worth of mock services, recording every call.
pub struct Probe {
    calls: Mutex<Vec<&'static str>>,
    look_at: Mutex<Option<LookAt>>,
    attached: Mutex<Vec<ObjectHandle>>,
    stored: Mutex<HashMap<ModelId, Bytes>>,
    next_model: AtomicU64,
    camera_hub: EventHub<CameraHandle>,
    render_hub: EventHub<RenderPhase>,
    model_hub: EventHub<RegisteredModel>,
    look_at_delay: Option<Duration>,
    failing_worker_fetches: Arc<AtomicUsize>,
    failing_configure: bool,
}

impl Probe {
    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn look_at(&self) -> Option<LookAt> {
        *self.look_at.lock()
    }

    pub fn attached_objects(&self) -> Vec<ObjectHandle> {
        self.attached.lock().clone()
    }

    pub fn forced_updates(&self) -> usize {
        self.count("update_forced")
    }

    pub fn camera_listeners(&self) -> usize {
        self.camera_hub.listener_count()
    }

    pub fn model_listeners(&self) -> usize {
        self.model_hub.listener_count()
    }

    pub fn render_listeners(&self) -> usize {
        self.render_hub.listener_count()
    }

    pub fn move_camera(&self) {
        self.camera_hub.emit(&CameraHandle(1));
    }
}

#[async_trait]
impl SceneService for Probe {
    fn create_scene(&self, _surface: &Surface) -> Result<SceneHandle, ServiceError> {
        self.record("create_scene");
        Ok(SceneHandle(1))
    }

    fn create_camera(&self, _surface: &Surface) -> Result<CameraHandle, ServiceError> {
        self.record("create_camera");
        Ok(CameraHandle(1))
    }

    fn create_renderer(&self, _surface: &Surface) -> Result<RendererHandle, ServiceError> {
        self.record("create_renderer");
        Ok(RendererHandle(1))
    }

    async fn set_look_at(&self, _camera: CameraHandle, view: LookAt) -> Result<(), ServiceError> {
        self.record("set_look_at");
        if let Some(delay) = self.look_at_delay {
            tokio::time::sleep(delay).await;
        }
        *self.look_at.lock() = Some(view);
        Ok(())
    }

    fn add_grid_visual(&self, _scene: SceneHandle) -> Result<GridHandle, ServiceError> {
        self.record("add_grid_visual");
        Ok(GridHandle(1))
    }

    fn attach_object(&self, _scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError> {
        self.record("attach_object");
        self.attached.lock().push(object);
        Ok(())
    }

    fn detach_object(&self, _scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError> {
        self.record("detach_object");
        self.attached.lock().retain(|o| *o != object);
        Ok(())
    }

    fn release_renderer(&self, _renderer: RendererHandle) {
        self.record("release_renderer");
    }

    fn camera_updates(&self) -> EventHub<CameraHandle> {
        self.camera_hub.clone()
    }

    fn render_events(&self) -> EventHub<RenderPhase> {
        self.render_hub.clone()
    }
}

#[async_trait]
impl IfcDecoder for Probe {
    async fn configure(&self, _settings: DecoderSettings) -> Result<(), ServiceError> {
        self.record("configure");
        if self.failing_configure {
            return Err(ServiceError::NotConfigured("wasm payload missing".into()));
        }
        Ok(())
    }

    async fn decode(
        &self,
        bytes: Bytes,
        name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DecodedModel, ServiceError> {
        self.record("decode");
        if !bytes.starts_with(b"ISO-10303-21;") {
            return Err(ServiceError::Decode("not a STEP file".into()));
        }
        if let Some(progress) = on_progress {
            for percent in [25.0, 50.0, 40.0, 75.0] {
                progress(percent);
            }
        }
        Ok(DecodedModel {
            name: name.to_string(),
            schema: "IFC4".into(),
            entity_count: 2,
            geometry_count: 1,
            payload: bytes,
        })
    }
}

#[async_trait]
impl FragmentsService for Probe {
    async fn acquire_worker_endpoint(&self, url: &str) -> Result<WorkerEndpoint, ServiceError> {
        self.record("acquire_worker_endpoint");
        let failing = self
            .failing_worker_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::Fetch {
                url: url.to_string(),
                source: FetchError::Status { status: 503 },
            });
        }
        Ok(WorkerEndpoint {
            source_url: url.to_string(),
            local_uri: "blob:mock-worker".into(),
            size: 16,
        })
    }

    async fn init(&self, _endpoint: &WorkerEndpoint) -> Result<(), ServiceError> {
        self.record("init");
        Ok(())
    }

    async fn register_model(&self, model: DecodedModel) -> Result<RegisteredModel, ServiceError> {
        self.record("register_model");
        let id = ModelId(self.next_model.fetch_add(1, Ordering::SeqCst));
        self.stored.lock().insert(id, model.payload);
        let registered = RegisteredModel {
            id,
            name: model.name,
            object: ObjectHandle(100 + id.0),
        };
        self.model_hub.emit(&registered);
        Ok(registered)
    }

    fn model_registered(&self) -> EventHub<RegisteredModel> {
        self.model_hub.clone()
    }

    fn bind_camera(&self, _model: ModelId, _camera: CameraHandle) -> Result<(), ServiceError> {
        self.record("bind_camera");
        Ok(())
    }

    fn update(&self, force: bool) {
        self.record(if force { "update_forced" } else { "update" });
    }

    async fn serialize_model(&self, model: ModelId) -> Result<Bytes, ServiceError> {
        self.record("serialize_model");
        self.stored
            .lock()
            .get(&model)
            .cloned()
            .ok_or(ServiceError::UnknownModel(model))
    }

    async fn unload_model(&self, model: ModelId) -> Result<(), ServiceError> {
        self.record("unload_model");
        self.stored
            .lock()
            .remove(&model)
            .map(|_| ())
            .ok_or(ServiceError::UnknownModel(model))
    }

    async fn shutdown(&self) {
        self.record("shutdown");
        self.stored.lock().clear();
    }
}

impl TelemetryOverlay for Probe {
    fn mount(&self, surface: &Surface) -> Result<ElementId, ServiceError> {
        self.record("mount");
        Ok(surface.append_element("stats"))
    }

    fn begin(&self) {
        self.record("begin");
    }

    fn end(&self) {
        self.record("end");
    }

    fn unmount(&self, surface: &Surface, element: ElementId) {
        self.record("unmount");
        surface.remove_element(element);
    }
}

#[async_trait]
impl ByteFetcher for Probe {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.record("fetch");
        if url.contains("missing") {
            return Err(FetchError::Status { status: 404 });
        }
        Ok(Bytes::from(sample_ifc()))
    }
}

/// Backend handing out one [`Probe`] per surface.
#[derive(Default)]
pub struct MockBackend {
    probes: Mutex<Vec<Arc<Probe>>>,
    released: Mutex<Vec<SurfaceId>>,
    look_at_delay: Option<Duration>,
    failing_worker_fetches: Arc<AtomicUsize>,
    failing_configure: bool,
}

impl MockBackend {
    pub fn with_look_at_delay(mut self, delay: Duration) -> Self {
        self.look_at_delay = Some(delay);
        self
    }

    pub fn failing_worker_fetches(self, count: usize) -> Self {
        self.failing_worker_fetches.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.failing_configure = true;
        self
    }

    pub fn probe(&self, index: usize) -> Arc<Probe> {
        Arc::clone(&self.probes.lock()[index])
    }

    pub fn constructed(&self) -> usize {
        self.probes.lock().len()
    }

    pub fn released(&self) -> Vec<SurfaceId> {
        self.released.lock().clone()
    }
}

impl ViewerBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn services(&self, _surface: &Surface) -> Result<ServiceSet, ServiceError> {
        let probe = Arc::new(Probe {
            calls: Mutex::new(Vec::new()),
            look_at: Mutex::new(None),
            attached: Mutex::new(Vec::new()),
            stored: Mutex::new(HashMap::new()),
            next_model: AtomicU64::new(1),
            camera_hub: EventHub::new(),
            render_hub: EventHub::new(),
            model_hub: EventHub::new(),
            look_at_delay: self.look_at_delay,
            failing_worker_fetches: Arc::clone(&self.failing_worker_fetches),
            failing_configure: self.failing_configure,
        });
        self.probes.lock().push(Arc::clone(&probe));
        Ok(ServiceSet {
            scene: probe.clone(),
            decoder: probe.clone(),
            fragments: probe.clone(),
            telemetry: probe.clone(),
            fetcher: probe,
        })
    }

    fn release(&self, surface: SurfaceId) {
        self.released.lock().push(surface);
    }
}
