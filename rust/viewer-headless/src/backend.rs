// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Backend wiring the headless services into viewer sessions.

use crate::config::HeadlessConfig;
use crate::decoder::StepDecoder;
use crate::fetch::HttpFetcher;
use crate::fragments::FragmentsWorker;
use crate::scene::RecordingScene;
use crate::store::WorkerStore;
use crate::telemetry::FrameStats;
use ifc_lite_viewer_core::{ByteFetcher, FetchError, ServiceError, ServiceSet, Surface, SurfaceId, ViewerBackend};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;

/// Concrete services handed to one surface's session.
#[derive(Debug, Clone)]
pub struct HeadlessServices {
    pub scene: Arc<RecordingScene>,
    pub decoder: Arc<StepDecoder>,
    pub fragments: Arc<FragmentsWorker>,
    pub stats: Arc<FrameStats>,
}

/// Headless [`ViewerBackend`]. The fetcher and worker store are shared by all surfaces.
pub struct HeadlessBackend {
    fetcher: Arc<dyn ByteFetcher>,
    store: WorkerStore,
    camera_settle: Duration,
    services: Mutex<FxHashMap<SurfaceId, HeadlessServices>>,
}

impl std::fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessBackend")
            .field("store", &self.store)
            .field("surfaces", &self.services.lock().len())
            .finish()
    }
}

impl HeadlessBackend {
    pub fn new(config: &HeadlessConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(config.fetch_timeout())?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    /// Backend using `fetcher` for worker code and remote models.
    pub fn with_fetcher(fetcher: Arc<dyn ByteFetcher>, config: &HeadlessConfig) -> Self {
        Self {
            fetcher,
            store: WorkerStore::new(&config.cache_dir),
            camera_settle: config.camera_settle(),
            services: Mutex::new(FxHashMap::default()),
        }
    }

    /// Services most recently built for `surface`, until its session is
    /// destroyed through the registry.
    pub fn services_for(&self, surface: SurfaceId) -> Option<HeadlessServices> {
        self.services.lock().get(&surface).cloned()
    }

    pub fn store(&self) -> &WorkerStore {
        &self.store
    }
}

impl ViewerBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn services(&self, surface: &Surface) -> Result<ServiceSet, ServiceError> {
        let built = HeadlessServices {
            scene: Arc::new(RecordingScene::new(self.camera_settle)),
            decoder: Arc::new(StepDecoder::new()),
            fragments: Arc::new(FragmentsWorker::new(Arc::clone(&self.fetcher), self.store.clone())),
            stats: Arc::new(FrameStats::new()),
        };
        self.services.lock().insert(surface.id(), built.clone());
        tracing::debug!(surface = %surface.id(), label = surface.label(), "Built headless services");

        Ok(ServiceSet {
            scene: built.scene,
            decoder: built.decoder,
            fragments: built.fragments,
            telemetry: built.stats,
            fetcher: Arc::clone(&self.fetcher),
        })
    }

    fn release(&self, surface: SurfaceId) {
        if self.services.lock().remove(&surface).is_some() {
            tracing::debug!(surface = %surface, "Dropped headless services");
        }
    }
}
