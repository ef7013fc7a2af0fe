// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session registry and the state shared by every session it creates.

use crate::config::ViewerConfig;
use crate::error::{Result, ServiceError, ViewerError};
use crate::services::ViewerBackend;
use crate::session::ViewerSession;
use crate::surface::Surface;
use crate::types::{SessionId, SurfaceId, WorkerEndpoint};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Ownership of the single navigational grid.
///
/// The first session to claim the slot creates the grid. A claim is only
/// given back by a setup attempt that failed, since its scene is discarded.
#[derive(Debug, Default)]
pub struct GridSlot {
    owner: Mutex<Option<SessionId>>,
}

impl GridSlot {
    /// Claim the slot for `session`. Returns true if the caller must create the grid.
    pub fn claim(&self, session: SessionId) -> bool {
        let mut owner = self.owner.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(session);
        true
    }

    /// Give the slot back if `session` holds it.
    pub fn release(&self, session: SessionId) {
        let mut owner = self.owner.lock();
        if *owner == Some(session) {
            *owner = None;
        }
    }

    pub fn owner(&self) -> Option<SessionId> {
        *self.owner.lock()
    }
}

/// Write-once state shared across sessions.
#[derive(Debug, Default)]
pub struct SharedState {
    grid: GridSlot,
    worker: OnceCell<WorkerEndpoint>,
}

impl SharedState {
    pub fn grid(&self) -> &GridSlot {
        &self.grid
    }

    /// Worker endpoint, acquiring it with `acquire` on first use.
    ///
    /// Concurrent callers wait for one acquisition. A failed acquisition
    /// leaves the cell empty so the next caller fetches again.
    pub async fn worker_endpoint<F, Fut>(&self, acquire: F) -> std::result::Result<WorkerEndpoint, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<WorkerEndpoint, ServiceError>>,
    {
        self.worker.get_or_try_init(acquire).await.cloned()
    }

    pub fn cached_worker_endpoint(&self) -> Option<WorkerEndpoint> {
        self.worker.get().cloned()
    }
}

/// Creates sessions, one per surface.
pub struct SessionRegistry {
    backend: Arc<dyn ViewerBackend>,
    config: Arc<ViewerConfig>,
    shared: Arc<SharedState>,
    sessions: Mutex<HashMap<SurfaceId, Arc<ViewerSession>>>,
    next_session: AtomicU64,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("backend", &self.backend.name())
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn ViewerBackend>, config: ViewerConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            shared: Arc::new(SharedState::default()),
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Session for `container`, constructing it on first use.
    ///
    /// `None` stands for a container that is not mounted yet.
    pub fn create(&self, container: Option<&Surface>) -> Result<Arc<ViewerSession>> {
        let surface = container
            .ok_or_else(|| ViewerError::InvalidSurface("no container".into()))?;
        surface.validate().map_err(ViewerError::InvalidSurface)?;

        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&surface.id()) {
            if !existing.is_destroyed() {
                tracing::debug!(surface = %surface.id(), session = %existing.id(), "Reusing viewer session");
                return Ok(Arc::clone(existing));
            }
        }

        let services = self.backend.services(surface).map_err(|e| {
            ViewerError::InvalidSurface(format!("backend '{}' rejected surface: {e}", self.backend.name()))
        })?;
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(ViewerSession::new(
            id,
            surface.clone(),
            services,
            Arc::clone(&self.config),
            Arc::clone(&self.shared),
        ));
        sessions.insert(surface.id(), Arc::clone(&session));

        tracing::info!(
            surface = %surface.id(),
            label = surface.label(),
            session = %id,
            backend = self.backend.name(),
            "Created viewer session"
        );
        Ok(session)
    }

    pub fn get(&self, surface: SurfaceId) -> Option<Arc<ViewerSession>> {
        self.sessions.lock().get(&surface).cloned()
    }

    /// Number of sessions constructed so far.
    pub fn sessions_constructed(&self) -> u64 {
        self.next_session.load(Ordering::Relaxed) - 1
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy and forget the session bound to `surface`.
    pub async fn destroy(&self, surface: SurfaceId) -> bool {
        let session = self.sessions.lock().remove(&surface);
        match session {
            Some(session) => {
                session.destroy().await;
                self.backend.release(surface);
                true
            }
            None => false,
        }
    }

    /// Destroy every session.
    pub async fn destroy_all(&self) {
        let sessions: Vec<Arc<ViewerSession>> =
            self.sessions.lock().drain().map(|(_, session)| session).collect();
        for session in sessions {
            session.destroy().await;
            self.backend.release(session.surface().id());
        }
    }
}
