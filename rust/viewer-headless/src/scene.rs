// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene graph that records what a renderer would draw.

use async_trait::async_trait;
use ifc_lite_viewer_core::{
    CameraHandle, EventHub, GridHandle, LookAt, ObjectHandle, RenderPhase, RendererHandle,
    SceneHandle, SceneService, ServiceError, Surface, SurfaceId,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct SceneRecord {
    objects: Vec<ObjectHandle>,
    grids: Vec<GridHandle>,
}

#[derive(Debug, Clone, Copy)]
struct RendererRecord {
    surface: SurfaceId,
    frames: u64,
    released: bool,
}

#[derive(Debug, Default)]
struct SceneGraph {
    next_handle: u64,
    scenes: FxHashMap<SceneHandle, SceneRecord>,
    cameras: FxHashMap<CameraHandle, Option<LookAt>>,
    renderers: FxHashMap<RendererHandle, RendererRecord>,
}

impl SceneGraph {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn scene_mut(&mut self, scene: SceneHandle) -> Result<&mut SceneRecord, ServiceError> {
        self.scenes
            .get_mut(&scene)
            .ok_or_else(|| ServiceError::Rejected(format!("unknown scene {scene}")))
    }
}

/// In-memory scene service. Frames are driven explicitly with [`RecordingScene::render_frame`].
#[derive(Debug)]
pub struct RecordingScene {
    graph: Mutex<SceneGraph>,
    camera_updates: EventHub<CameraHandle>,
    render_events: EventHub<RenderPhase>,
    settle: Duration,
}

impl Default for RecordingScene {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RecordingScene {
    /// `settle` is how long camera transitions take to complete.
    pub fn new(settle: Duration) -> Self {
        Self {
            graph: Mutex::new(SceneGraph::default()),
            camera_updates: EventHub::new(),
            render_events: EventHub::new(),
            settle,
        }
    }

    /// Draw one frame with `renderer`.
    pub fn render_frame(&self, renderer: RendererHandle) -> Result<u64, ServiceError> {
        {
            let graph = self.graph.lock();
            match graph.renderers.get(&renderer) {
                Some(record) if !record.released => {}
                Some(_) => return Err(ServiceError::Rejected(format!("{renderer} was released"))),
                None => return Err(ServiceError::Rejected(format!("unknown renderer {renderer}"))),
            }
        }

        self.render_events.emit(&RenderPhase::Before);
        let frames = {
            let mut graph = self.graph.lock();
            match graph.renderers.get_mut(&renderer) {
                Some(record) => {
                    record.frames += 1;
                    record.frames
                }
                None => 0,
            }
        };
        self.render_events.emit(&RenderPhase::After);
        Ok(frames)
    }

    /// Move `camera` the way user navigation would.
    pub fn orbit(&self, camera: CameraHandle, view: LookAt) -> Result<(), ServiceError> {
        {
            let mut graph = self.graph.lock();
            let slot = graph
                .cameras
                .get_mut(&camera)
                .ok_or_else(|| ServiceError::Rejected(format!("unknown camera {camera}")))?;
            *slot = Some(view);
        }
        self.camera_updates.emit(&camera);
        Ok(())
    }

    pub fn look_at(&self, camera: CameraHandle) -> Option<LookAt> {
        self.graph.lock().cameras.get(&camera).copied().flatten()
    }

    pub fn objects(&self, scene: SceneHandle) -> Vec<ObjectHandle> {
        self.graph
            .lock()
            .scenes
            .get(&scene)
            .map(|s| s.objects.clone())
            .unwrap_or_default()
    }

    /// Grids across every scene.
    pub fn grid_count(&self) -> usize {
        self.graph.lock().scenes.values().map(|s| s.grids.len()).sum()
    }

    pub fn scenes(&self) -> Vec<SceneHandle> {
        let mut scenes: Vec<SceneHandle> = self.graph.lock().scenes.keys().copied().collect();
        scenes.sort();
        scenes
    }

    pub fn cameras(&self) -> Vec<CameraHandle> {
        let mut cameras: Vec<CameraHandle> = self.graph.lock().cameras.keys().copied().collect();
        cameras.sort();
        cameras
    }

    /// Renderers still attached to a surface.
    pub fn active_renderers(&self) -> Vec<(RendererHandle, SurfaceId)> {
        let mut active: Vec<_> = self
            .graph
            .lock()
            .renderers
            .iter()
            .filter(|(_, r)| !r.released)
            .map(|(h, r)| (*h, r.surface))
            .collect();
        active.sort();
        active
    }
}

#[async_trait]
impl SceneService for RecordingScene {
    fn create_scene(&self, _surface: &Surface) -> Result<SceneHandle, ServiceError> {
        let mut graph = self.graph.lock();
        let scene = SceneHandle(graph.next());
        graph.scenes.insert(scene, SceneRecord::default());
        Ok(scene)
    }

    fn create_camera(&self, _surface: &Surface) -> Result<CameraHandle, ServiceError> {
        let mut graph = self.graph.lock();
        let camera = CameraHandle(graph.next());
        graph.cameras.insert(camera, None);
        Ok(camera)
    }

    fn create_renderer(&self, surface: &Surface) -> Result<RendererHandle, ServiceError> {
        let (width, height) = surface.size();
        if width == 0 || height == 0 {
            return Err(ServiceError::Rejected(format!("surface {} has no area", surface.id())));
        }
        let mut graph = self.graph.lock();
        let renderer = RendererHandle(graph.next());
        graph.renderers.insert(
            renderer,
            RendererRecord {
                surface: surface.id(),
                frames: 0,
                released: false,
            },
        );
        Ok(renderer)
    }

    async fn set_look_at(&self, camera: CameraHandle, view: LookAt) -> Result<(), ServiceError> {
        if !self.graph.lock().cameras.contains_key(&camera) {
            return Err(ServiceError::Rejected(format!("unknown camera {camera}")));
        }
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        self.orbit(camera, view)
    }

    fn add_grid_visual(&self, scene: SceneHandle) -> Result<GridHandle, ServiceError> {
        let mut graph = self.graph.lock();
        let grid = GridHandle(graph.next());
        graph.scene_mut(scene)?.grids.push(grid);
        Ok(grid)
    }

    fn attach_object(&self, scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError> {
        let mut graph = self.graph.lock();
        let record = graph.scene_mut(scene)?;
        if !record.objects.contains(&object) {
            record.objects.push(object);
        }
        Ok(())
    }

    fn detach_object(&self, scene: SceneHandle, object: ObjectHandle) -> Result<(), ServiceError> {
        let mut graph = self.graph.lock();
        let record = graph.scene_mut(scene)?;
        let before = record.objects.len();
        record.objects.retain(|o| *o != object);
        if record.objects.len() == before {
            return Err(ServiceError::Rejected(format!("{object} is not in {scene}")));
        }
        Ok(())
    }

    fn release_renderer(&self, renderer: RendererHandle) {
        if let Some(record) = self.graph.lock().renderers.get_mut(&renderer) {
            record.released = true;
        }
    }

    fn camera_updates(&self) -> EventHub<CameraHandle> {
        self.camera_updates.clone()
    }

    fn render_events(&self) -> EventHub<RenderPhase> {
        self.render_events.clone()
    }
}
