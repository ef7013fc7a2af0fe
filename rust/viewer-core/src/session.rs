// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Viewer session lifecycle: `Uninitialized → Initializing → Ready → Destroyed`.
//!
//! A session is created by the [`SessionRegistry`](crate::SessionRegistry)
//! and must be initialized before any model can be loaded. Initialization
//! runs the eight setup steps exactly once; overlapping calls await the same
//! in-flight sequence. The sequence runs on its own task, so it finishes even
//! when every caller stops waiting. A failed attempt releases everything it
//! bound and leaves the session `Uninitialized` so the caller can retry.

use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::events::{Subscription, SubscriptionList};
use crate::load::PendingLoad;
use crate::registry::SharedState;
use crate::services::{ProgressCallback, ServiceSet};
use crate::surface::Surface;
use crate::types::{
    fragments_file_name, CameraHandle, ElementId, ExportedModel, GridHandle, LoadedModel,
    ModelId, ModelSource, RegisteredModel, RenderPhase, RendererHandle, SceneHandle,
    SessionId, SessionState, SetupStep, DEFAULT_VIEW,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type SetupFuture = Shared<BoxFuture<'static, Result<()>>>;

/// Handles a ready session keeps for later operations.
#[derive(Debug, Clone, Copy)]
struct ReadyHandles {
    scene: SceneHandle,
}

/// Everything a setup attempt has bound so far.
#[derive(Debug, Default)]
struct Bindings {
    renderer: Option<RendererHandle>,
    grid: Option<GridHandle>,
    grid_claimed: bool,
    fragments_started: bool,
    telemetry: Option<ElementId>,
    subscriptions: SubscriptionList,
}

enum Phase {
    Uninitialized,
    Initializing(SetupFuture),
    Ready {
        handles: ReadyHandles,
        bindings: Bindings,
    },
    Destroyed,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Initializing(_) => SessionState::Initializing,
            Phase::Ready { .. } => SessionState::Ready,
            Phase::Destroyed => SessionState::Destroyed,
        }
    }
}

/// One viewer bound to one display surface.
pub struct ViewerSession {
    id: SessionId,
    surface: Surface,
    services: ServiceSet,
    config: Arc<ViewerConfig>,
    shared: Arc<SharedState>,
    phase: Mutex<Phase>,
    models: Mutex<IndexMap<ModelId, LoadedModel>>,
    setup_runs: AtomicUsize,
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("id", &self.id)
            .field("surface", &self.surface.id())
            .field("state", &self.state())
            .field("models", &self.model_count())
            .finish()
    }
}

impl ViewerSession {
    pub(crate) fn new(
        id: SessionId,
        surface: Surface,
        services: ServiceSet,
        config: Arc<ViewerConfig>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            id,
            surface,
            services,
            config,
            shared,
            phase: Mutex::new(Phase::Uninitialized),
            models: Mutex::new(IndexMap::new()),
            setup_runs: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn state(&self) -> SessionState {
        self.phase.lock().state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == SessionState::Destroyed
    }

    /// Loaded models in load order.
    pub fn models(&self) -> Vec<LoadedModel> {
        self.models.lock().values().cloned().collect()
    }

    pub fn model(&self, id: ModelId) -> Option<LoadedModel> {
        self.models.lock().get(&id).cloned()
    }

    pub fn model_count(&self) -> usize {
        self.models.lock().len()
    }

    /// Number of setup sequences started over the session's lifetime.
    pub fn setup_runs(&self) -> usize {
        self.setup_runs.load(Ordering::SeqCst)
    }

    /// Labels of the listeners the session currently holds.
    pub fn subscriptions(&self) -> Vec<&'static str> {
        match &*self.phase.lock() {
            Phase::Ready { bindings, .. } => bindings.subscriptions.labels(),
            _ => Vec::new(),
        }
    }

    /// Grid created by this session, if it was the one to create it.
    pub fn grid(&self) -> Option<GridHandle> {
        match &*self.phase.lock() {
            Phase::Ready { bindings, .. } => bindings.grid,
            _ => None,
        }
    }

    /// Run the setup sequence, or join the one already running.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let setup = {
            let mut phase = self.phase.lock();
            match &*phase {
                Phase::Ready { .. } => return Ok(()),
                Phase::Destroyed => return Err(ViewerError::SessionDestroyed),
                Phase::Initializing(setup) => {
                    tracing::debug!(session = %self.id, "Joining in-flight initialization");
                    setup.clone()
                }
                Phase::Uninitialized => {
                    let task = tokio::spawn(Arc::clone(self).run_setup());
                    let session = Arc::clone(self);
                    let setup = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => {
                                session.abandon_setup();
                                Err(ViewerError::SetupAborted(e.to_string()))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *phase = Phase::Initializing(setup.clone());
                    setup
                }
            }
        };
        setup.await
    }

    /// The setup task died without reporting back.
    fn abandon_setup(&self) {
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::Initializing(_)) {
            *phase = Phase::Uninitialized;
        }
    }

    async fn run_setup(self: Arc<Self>) -> Result<()> {
        let run = self.setup_runs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            session = %self.id,
            surface = %self.surface.id(),
            run,
            "Initializing viewer session"
        );

        let mut bindings = Bindings::default();
        let outcome = self.setup_steps(&mut bindings).await;

        let (result, leftover) = {
            let mut phase = self.phase.lock();
            let destroyed = matches!(*phase, Phase::Destroyed);
            match outcome {
                Ok(handles) if !destroyed => {
                    *phase = Phase::Ready { handles, bindings };
                    (Ok(()), None)
                }
                Ok(_) => (Err(ViewerError::SessionDestroyed), Some(bindings)),
                Err(err) => {
                    if !destroyed {
                        *phase = Phase::Uninitialized;
                    }
                    (Err(err), Some(bindings))
                }
            }
        };

        if let Some(bindings) = leftover {
            self.release(bindings, true).await;
        }

        match &result {
            Ok(()) => tracing::info!(session = %self.id, "Viewer session ready"),
            Err(err) => tracing::warn!(
                session = %self.id,
                error = %err,
                code = err.code(),
                "Viewer initialization failed"
            ),
        }
        result
    }

    async fn setup_steps(&self, bindings: &mut Bindings) -> Result<ReadyHandles> {
        self.surface.validate().map_err(ViewerError::InvalidSurface)?;
        let scene_service = &self.services.scene;

        let scene = scene_service
            .create_scene(&self.surface)
            .map_err(|e| e.into_setup_error(SetupStep::BindScene))?;
        self.step_done(SetupStep::BindScene);

        let camera = scene_service
            .create_camera(&self.surface)
            .map_err(|e| e.into_setup_error(SetupStep::BindCamera))?;
        scene_service
            .set_look_at(camera, DEFAULT_VIEW)
            .await
            .map_err(|e| e.into_setup_error(SetupStep::BindCamera))?;
        self.step_done(SetupStep::BindCamera);

        let renderer = scene_service
            .create_renderer(&self.surface)
            .map_err(|e| e.into_setup_error(SetupStep::BindRenderer))?;
        bindings.renderer = Some(renderer);
        self.step_done(SetupStep::BindRenderer);

        if self.shared.grid().claim(self.id) {
            bindings.grid_claimed = true;
            let grid = scene_service
                .add_grid_visual(scene)
                .map_err(|e| e.into_setup_error(SetupStep::CreateGrid))?;
            bindings.grid = Some(grid);
            self.step_done(SetupStep::CreateGrid);
        } else {
            tracing::debug!(session = %self.id, "Grid already present, skipping");
        }

        self.services
            .decoder
            .configure(self.config.decoder_settings())
            .await
            .map_err(|e| e.into_setup_error(SetupStep::ConfigureDecoder))?;
        tracing::debug!(session = %self.id, wasm_path = %self.config.wasm_path, "IFC importer initialized");
        self.step_done(SetupStep::ConfigureDecoder);

        let fragments = Arc::clone(&self.services.fragments);
        let worker_url = self.config.worker_url.clone();
        let endpoint = self
            .shared
            .worker_endpoint(|| async move { fragments.acquire_worker_endpoint(&worker_url).await })
            .await
            .map_err(|e| e.into_setup_error(SetupStep::AcquireWorker))?;
        bindings.fragments_started = true;
        self.services
            .fragments
            .init(&endpoint)
            .await
            .map_err(|e| e.into_setup_error(SetupStep::AcquireWorker))?;
        self.step_done(SetupStep::AcquireWorker);

        bindings.subscriptions.push(self.camera_bridge());
        bindings.subscriptions.push(self.model_bridge(scene, camera));
        self.step_done(SetupStep::AttachBridges);

        if self.config.telemetry {
            let element = self
                .services
                .telemetry
                .mount(&self.surface)
                .map_err(|e| e.into_setup_error(SetupStep::AttachTelemetry))?;
            bindings.telemetry = Some(element);
            bindings.subscriptions.push(self.telemetry_bridge());
            self.step_done(SetupStep::AttachTelemetry);
        }

        Ok(ReadyHandles { scene })
    }

    fn step_done(&self, step: SetupStep) {
        tracing::debug!(session = %self.id, step = %step, "Setup step complete");
    }

    /// Camera movement refreshes fragments visibility.
    fn camera_bridge(&self) -> Subscription {
        let fragments = Arc::downgrade(&self.services.fragments);
        self.services
            .scene
            .camera_updates()
            .add("camera-update", move |_camera: &CameraHandle| {
                if let Some(fragments) = fragments.upgrade() {
                    fragments.update(false);
                }
            })
    }

    /// Registered models become camera-aware and visible.
    fn model_bridge(&self, scene: SceneHandle, camera: CameraHandle) -> Subscription {
        let fragments = Arc::downgrade(&self.services.fragments);
        let scene_service = Arc::downgrade(&self.services.scene);
        let session = self.id;
        self.services
            .fragments
            .model_registered()
            .add("model-registered", move |model: &RegisteredModel| {
                let (Some(fragments), Some(scene_service)) =
                    (fragments.upgrade(), scene_service.upgrade())
                else {
                    return;
                };
                if let Err(e) = fragments.bind_camera(model.id, camera) {
                    tracing::warn!(%session, model = %model.id, error = %e, "Failed to bind camera");
                }
                if let Err(e) = scene_service.attach_object(scene, model.object) {
                    tracing::warn!(%session, model = %model.id, error = %e, "Failed to attach model");
                }
                fragments.update(true);
            })
    }

    /// Frame telemetry brackets every render.
    fn telemetry_bridge(&self) -> Subscription {
        let telemetry = Arc::downgrade(&self.services.telemetry);
        self.services
            .scene
            .render_events()
            .add("telemetry", move |phase: &RenderPhase| {
                if let Some(telemetry) = telemetry.upgrade() {
                    match phase {
                        RenderPhase::Before => telemetry.begin(),
                        RenderPhase::After => telemetry.end(),
                    }
                }
            })
    }

    /// Release everything in `bindings`. A rollback also gives back the grid slot.
    async fn release(&self, mut bindings: Bindings, rollback: bool) {
        bindings.subscriptions.cancel_all();
        if let Some(element) = bindings.telemetry.take() {
            self.services.telemetry.unmount(&self.surface, element);
        }
        if bindings.fragments_started {
            self.services.fragments.shutdown().await;
        }
        if let Some(renderer) = bindings.renderer.take() {
            self.services.scene.release_renderer(renderer);
        }
        if rollback && bindings.grid_claimed {
            self.shared.grid().release(self.id);
        }
    }

    fn ready_handles(&self) -> Result<ReadyHandles> {
        match &*self.phase.lock() {
            Phase::Ready { handles, .. } => Ok(*handles),
            Phase::Destroyed => Err(ViewerError::SessionDestroyed),
            Phase::Uninitialized | Phase::Initializing(_) => Err(ViewerError::NotReady),
        }
    }

    /// Load a model from a buffer or URL.
    ///
    /// The host should not issue a second load for the same session while one
    /// is pending; the decoder's own serialization is unspecified.
    pub async fn load_model(
        &self,
        source: ModelSource,
        on_progress: Option<ProgressCallback>,
    ) -> Result<LoadedModel> {
        self.ready_handles()?;

        let name = source.display_name();
        let pending = PendingLoad::new(&source, on_progress);
        tracing::info!(session = %self.id, origin = pending.origin(), "Loading IFC model");

        let data = match source {
            ModelSource::Bytes { data, .. } => data,
            ModelSource::Url(url) => self.services.fetcher.fetch(&url).await.map_err(|e| {
                ViewerError::EndpointFetchFailure {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            })?,
        };
        pending.report(0.0);

        let decoded = self
            .services
            .decoder
            .decode(data, &name, Some(pending.callback()))
            .await
            .map_err(|e| e.into_load_error(&name))?;
        self.ready_handles()?;

        let schema = decoded.schema.clone();
        let entity_count = decoded.entity_count;
        let geometry_count = decoded.geometry_count;
        let registered = self
            .services
            .fragments
            .register_model(decoded)
            .await
            .map_err(|e| e.into_load_error(&name))?;

        if self.ready_handles().is_err() {
            if let Err(e) = self.services.fragments.unload_model(registered.id).await {
                tracing::debug!(model = %registered.id, error = %e, "Unload after teardown failed");
            }
            return Err(ViewerError::SessionDestroyed);
        }

        let model = LoadedModel {
            id: registered.id,
            name: registered.name,
            schema,
            entity_count,
            geometry_count,
            object: registered.object,
        };
        self.models.lock().insert(model.id, model.clone());
        pending.finish();

        tracing::info!(
            session = %self.id,
            model = %model.id,
            name = %model.name,
            schema = %model.schema,
            entities = model.entity_count,
            "Model loaded"
        );
        Ok(model)
    }

    /// Serialize one loaded model's geometry.
    pub async fn export_model(&self, model: ModelId) -> Result<ExportedModel> {
        self.ready_handles()?;
        let loaded = {
            let models = self.models.lock();
            if models.is_empty() {
                return Err(ViewerError::NoModelLoaded);
            }
            models
                .get(&model)
                .cloned()
                .ok_or(ViewerError::ModelNotFound(model))?
        };

        let bytes = self
            .services
            .fragments
            .serialize_model(model)
            .await
            .map_err(|e| e.into_export_error(model))?;
        if bytes.is_empty() {
            return Err(ViewerError::ExportFailure {
                model,
                reason: "fragments service returned an empty buffer".into(),
            });
        }

        let file_name = fragments_file_name(&loaded.name);
        tracing::info!(session = %self.id, model = %model, file = %file_name, size = bytes.len(), "Model exported");
        Ok(ExportedModel {
            model,
            file_name,
            bytes,
        })
    }

    /// Export the first model in load order.
    pub async fn export_first_model(&self) -> Result<ExportedModel> {
        self.ready_handles()?;
        let first = self
            .models
            .lock()
            .keys()
            .next()
            .copied()
            .ok_or(ViewerError::NoModelLoaded)?;
        self.export_model(first).await
    }

    /// Remove a model from the scene and release it in the fragments service.
    pub async fn unload_model(&self, model: ModelId) -> Result<()> {
        let handles = self.ready_handles()?;
        let loaded = self
            .models
            .lock()
            .shift_remove(&model)
            .ok_or(ViewerError::ModelNotFound(model))?;

        if let Err(e) = self.services.scene.detach_object(handles.scene, loaded.object) {
            tracing::warn!(session = %self.id, model = %model, error = %e, "Failed to detach model");
        }
        if let Err(e) = self.services.fragments.unload_model(model).await {
            tracing::warn!(session = %self.id, model = %model, error = %e, "Failed to release model");
        }
        tracing::info!(session = %self.id, model = %model, "Model unloaded");
        Ok(())
    }

    /// Tear the session down. Calling it again is a no-op.
    ///
    /// A setup still in flight is awaited, so everything it bound has been
    /// released by the time this returns.
    pub async fn destroy(&self) {
        let previous = {
            let mut phase = self.phase.lock();
            std::mem::replace(&mut *phase, Phase::Destroyed)
        };

        match previous {
            Phase::Destroyed => return,
            Phase::Ready { handles, bindings } => {
                let models: Vec<LoadedModel> = self.models.lock().drain(..).map(|(_, m)| m).collect();
                for model in &models {
                    if let Err(e) = self.services.scene.detach_object(handles.scene, model.object) {
                        tracing::debug!(model = %model.id, error = %e, "Detach during teardown failed");
                    }
                }
                self.release(bindings, false).await;
            }
            Phase::Initializing(setup) => {
                tracing::debug!(session = %self.id, "Destroyed during initialization, awaiting rollback");
                // The setup task sees `Destroyed` and releases its own bindings.
                let _ = setup.await;
            }
            Phase::Uninitialized => {}
        }

        self.models.lock().clear();
        tracing::info!(session = %self.id, surface = %self.surface.id(), "Viewer session destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use crate::testing::{sample_ifc, MockBackend};
    use crate::types::SessionState;
    use std::time::Duration;

    fn registry(backend: &Arc<MockBackend>) -> SessionRegistry {
        let config = ViewerConfig::from_env()
            .with_worker_url("mock://worker.mjs")
            .with_telemetry(true);
        SessionRegistry::new(backend.clone(), config)
    }

    async fn ready_session(backend: &Arc<MockBackend>) -> (SessionRegistry, Arc<ViewerSession>) {
        let registry = registry(backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();
        session.initialize().await.unwrap();
        (registry, session)
    }

    #[tokio::test]
    async fn initialize_runs_every_step_once() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        assert_eq!(session.state(), SessionState::Ready);
        let probe = backend.probe(0);
        assert_eq!(probe.count("create_scene"), 1);
        assert_eq!(probe.count("create_camera"), 1);
        assert_eq!(probe.count("set_look_at"), 1);
        assert_eq!(probe.count("create_renderer"), 1);
        assert_eq!(probe.count("add_grid_visual"), 1);
        assert_eq!(probe.count("configure"), 1);
        assert_eq!(probe.count("acquire_worker_endpoint"), 1);
        assert_eq!(probe.count("init"), 1);
        assert_eq!(probe.count("mount"), 1);
        assert_eq!(session.subscriptions(), vec!["camera-update", "model-registered", "telemetry"]);
        assert_eq!(probe.look_at(), Some(DEFAULT_VIEW));
    }

    #[tokio::test]
    async fn setup_steps_run_in_order() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, _session) = ready_session(&backend).await;
        assert_eq!(
            backend.probe(0).calls(),
            vec![
                "create_scene",
                "create_camera",
                "set_look_at",
                "create_renderer",
                "add_grid_visual",
                "configure",
                "acquire_worker_endpoint",
                "init",
                "mount",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_initialize_runs_one_sequence() {
        let backend = Arc::new(MockBackend::default().with_look_at_delay(Duration::from_millis(50)));
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.initialize().await }
        });
        let second = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.initialize().await }
        });
        let (a, b) = (first.await.unwrap(), second.await.unwrap());
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(session.setup_runs(), 1);
        let probe = backend.probe(0);
        assert_eq!(probe.count("create_scene"), 1);
        assert_eq!(probe.camera_listeners(), 1);
        assert_eq!(probe.model_listeners(), 1);
        assert_eq!(probe.render_listeners(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn destroy_during_initialize_rolls_back() {
        let backend = Arc::new(MockBackend::default().with_look_at_delay(Duration::from_millis(100)));
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();

        let init = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.initialize().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.state(), SessionState::Initializing);
        session.destroy().await;

        assert_eq!(init.await.unwrap(), Err(ViewerError::SessionDestroyed));
        assert_eq!(session.state(), SessionState::Destroyed);
        let probe = backend.probe(0);
        assert_eq!(probe.count("release_renderer"), 1);
        assert_eq!(probe.camera_listeners(), 0);
        assert!(surface.elements().is_empty());
        assert_eq!(registry.shared().grid().owner(), None);
    }

    #[tokio::test]
    async fn abandoned_initialize_is_released_on_destroy() {
        let backend = Arc::new(MockBackend::default().with_look_at_delay(Duration::from_millis(200)));
        let registry = registry(&backend);
        let first = Surface::new("first", 800, 600);
        let session = registry.create(Some(&first)).unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(20), session.initialize()).await;
        assert!(waited.is_err());
        assert_eq!(session.state(), SessionState::Initializing);

        assert!(registry.destroy(first.id()).await);
        let probe = backend.probe(0);
        assert_eq!(probe.count("create_renderer"), 1);
        assert_eq!(probe.count("release_renderer"), 1);
        assert_eq!(probe.count("shutdown"), 1);
        assert!(first.elements().is_empty());
        assert_eq!(registry.shared().grid().owner(), None);

        let second = Surface::new("second", 800, 600);
        let next = registry.create(Some(&second)).unwrap();
        next.initialize().await.unwrap();
        assert_eq!(backend.probe(1).count("add_grid_visual"), 1);
        assert_eq!(registry.shared().grid().owner(), Some(next.id()));
    }

    #[tokio::test]
    async fn initialize_on_ready_session_is_noop() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        session.initialize().await.unwrap();
        assert_eq!(session.setup_runs(), 1);
        assert_eq!(backend.probe(0).count("create_scene"), 1);
    }

    #[tokio::test]
    async fn operations_before_initialize_are_not_ready() {
        let backend = Arc::new(MockBackend::default());
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();

        let load = session.load_model(ModelSource::bytes(sample_ifc(), "a.ifc"), None).await;
        assert_eq!(load.unwrap_err(), ViewerError::NotReady);
        assert_eq!(session.export_model(ModelId(1)).await.unwrap_err(), ViewerError::NotReady);
        assert_eq!(session.export_first_model().await.unwrap_err(), ViewerError::NotReady);
        assert_eq!(session.unload_model(ModelId(1)).await.unwrap_err(), ViewerError::NotReady);
        assert_eq!(backend.probe(0).count("decode"), 0);
    }

    #[tokio::test]
    async fn operations_after_destroy_fail() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        session.destroy().await;

        assert_eq!(session.state(), SessionState::Destroyed);
        let load = session.load_model(ModelSource::bytes(sample_ifc(), "a.ifc"), None).await;
        assert_eq!(load.unwrap_err(), ViewerError::SessionDestroyed);
        assert_eq!(session.export_model(ModelId(1)).await.unwrap_err(), ViewerError::SessionDestroyed);
        assert_eq!(session.initialize().await.unwrap_err(), ViewerError::SessionDestroyed);
    }

    #[tokio::test]
    async fn load_fires_bridges_once() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        let model = session
            .load_model(ModelSource::bytes(sample_ifc(), "school_str.ifc"), None)
            .await
            .unwrap();

        assert_eq!(model.name, "school_str.ifc");
        assert_eq!(session.models(), vec![model.clone()]);
        let probe = backend.probe(0);
        assert_eq!(probe.count("bind_camera"), 1);
        assert_eq!(probe.count("attach_object"), 1);
        assert_eq!(probe.attached_objects(), vec![model.object]);
        assert_eq!(probe.forced_updates(), 1);
    }

    #[tokio::test]
    async fn load_reports_monotonic_progress() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session
            .load_model(
                ModelSource::bytes(sample_ifc(), "a.ifc"),
                Some(Arc::new(move |p| sink.lock().push(p))),
            )
            .await
            .unwrap();

        let seen = seen.lock().clone();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn decode_failure_keeps_session_ready() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        let err = session
            .load_model(ModelSource::bytes(b"garbage".to_vec(), "broken.ifc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::DecodeFailure { ref name, .. } if name == "broken.ifc"));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.model_count(), 0);
    }

    #[tokio::test]
    async fn failed_url_fetch_keeps_session_ready() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        let err = session
            .load_model(ModelSource::url("mock://missing/model.ifc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::EndpointFetchFailure { .. }));
        assert!(session.is_ready());
        assert!(session.models().is_empty());
    }

    #[tokio::test]
    async fn url_loads_use_the_file_segment_as_name() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        let model = session
            .load_model(ModelSource::url("mock://models/school_str.ifc"), None)
            .await
            .unwrap();
        assert_eq!(model.name, "school_str.ifc");
    }

    #[tokio::test]
    async fn export_without_models_changes_nothing() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;

        assert_eq!(session.export_model(ModelId(1)).await.unwrap_err(), ViewerError::NoModelLoaded);
        assert_eq!(session.export_first_model().await.unwrap_err(), ViewerError::NoModelLoaded);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.model_count(), 0);
        assert_eq!(backend.probe(0).count("serialize_model"), 0);
    }

    #[tokio::test]
    async fn export_derives_file_name() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        let model = session
            .load_model(ModelSource::bytes(sample_ifc(), "school_str.ifc"), None)
            .await
            .unwrap();

        let exported = session.export_model(model.id).await.unwrap();
        assert_eq!(exported.file_name, "school_str.frag");
        assert!(!exported.bytes.is_empty());
        assert_eq!(session.model_count(), 1);

        let missing = session.export_model(ModelId(999)).await.unwrap_err();
        assert_eq!(missing, ViewerError::ModelNotFound(ModelId(999)));
    }

    #[tokio::test]
    async fn unload_detaches_and_releases() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        let model = session
            .load_model(ModelSource::bytes(sample_ifc(), "a.ifc"), None)
            .await
            .unwrap();

        session.unload_model(model.id).await.unwrap();
        assert_eq!(session.model_count(), 0);
        let probe = backend.probe(0);
        assert!(probe.attached_objects().is_empty());
        assert_eq!(probe.count("unload_model"), 1);
        assert_eq!(
            session.unload_model(model.id).await.unwrap_err(),
            ViewerError::ModelNotFound(model.id)
        );
    }

    #[tokio::test]
    async fn destroy_releases_every_attachment() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, session) = ready_session(&backend).await;
        session
            .load_model(ModelSource::bytes(sample_ifc(), "a.ifc"), None)
            .await
            .unwrap();
        assert_eq!(session.surface().elements(), vec!["stats"]);

        session.destroy().await;
        let probe = backend.probe(0);
        assert!(session.surface().elements().is_empty());
        assert_eq!(probe.count("release_renderer"), 1);
        assert_eq!(probe.count("shutdown"), 1);
        assert_eq!(probe.camera_listeners(), 0);
        assert_eq!(probe.model_listeners(), 0);
        assert_eq!(probe.render_listeners(), 0);
        assert!(probe.attached_objects().is_empty());
        assert_eq!(session.model_count(), 0);

        session.destroy().await;
        assert_eq!(probe.count("release_renderer"), 1);
    }

    #[tokio::test]
    async fn failed_worker_fetch_rolls_back_and_is_retryable() {
        let backend = Arc::new(MockBackend::default().failing_worker_fetches(1));
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, ViewerError::EndpointFetchFailure { .. }));
        assert_eq!(session.state(), SessionState::Uninitialized);
        let probe = backend.probe(0);
        assert_eq!(probe.count("release_renderer"), 1);
        assert_eq!(probe.camera_listeners(), 0);
        assert!(surface.elements().is_empty());
        assert_eq!(registry.shared().grid().owner(), None);

        session.initialize().await.unwrap();
        assert!(session.is_ready());
        assert_eq!(session.setup_runs(), 2);
        assert_eq!(probe.count("acquire_worker_endpoint"), 2);
        assert_eq!(probe.count("add_grid_visual"), 2);
        assert_eq!(registry.shared().grid().owner(), Some(session.id()));
    }

    #[tokio::test]
    async fn decoder_setup_failure_names_the_step() {
        let backend = Arc::new(MockBackend::default().failing_configure());
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, ViewerError::SetupFailed { step: SetupStep::ConfigureDecoder, .. }));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn telemetry_can_be_disabled() {
        let backend = Arc::new(MockBackend::default());
        let registry = SessionRegistry::new(
            backend.clone(),
            ViewerConfig::from_env()
                .with_worker_url("mock://worker.mjs")
                .with_telemetry(false),
        );
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();
        session.initialize().await.unwrap();

        assert_eq!(session.subscriptions(), vec!["camera-update", "model-registered"]);
        assert!(surface.elements().is_empty());
        assert_eq!(backend.probe(0).count("mount"), 0);
    }

    #[tokio::test]
    async fn detached_surface_fails_initialize() {
        let backend = Arc::new(MockBackend::default());
        let registry = registry(&backend);
        let surface = Surface::new("viewer", 800, 600);
        let session = registry.create(Some(&surface)).unwrap();
        surface.detach();

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, ViewerError::InvalidSurface(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(backend.probe(0).count("create_scene"), 0);
    }

    #[tokio::test]
    async fn camera_moves_refresh_fragments() {
        let backend = Arc::new(MockBackend::default());
        let (_registry, _session) = ready_session(&backend).await;
        let probe = backend.probe(0);
        probe.move_camera();
        probe.move_camera();
        assert_eq!(probe.count("update"), 2);
    }
}
