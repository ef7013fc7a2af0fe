// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragments service running on a background task.
//!
//! Models live inside the worker task; callers talk to it over a command
//! channel and get replies on oneshot channels. Exported fragments are the
//! stored payload, gzip-compressed.

use crate::store::WorkerStore;
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use ifc_lite_viewer_core::{
    ByteFetcher, CameraHandle, DecodedModel, EventHub, FetchError, FragmentsService, ModelId,
    ObjectHandle, RegisteredModel, ServiceError, WorkerEndpoint,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const COMMAND_QUEUE: usize = 64;

/// Polygon offset applied to a model's materials so coplanar faces do not z-fight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolygonOffset {
    pub units: f32,
    /// In `[0, 1)`, distinct per model.
    pub factor: f32,
}

impl PolygonOffset {
    fn for_model(id: ModelId, name: &str) -> Self {
        let mut hasher = FxHasher::default();
        id.hash(&mut hasher);
        name.hash(&mut hasher);
        let bits = hasher.finish() >> 40;
        Self {
            units: 1.0,
            factor: bits as f32 / (1u64 << 24) as f32,
        }
    }
}

/// Worker-side view of one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub id: ModelId,
    pub name: String,
    pub object: ObjectHandle,
    pub payload_size: usize,
    pub offset: PolygonOffset,
}

/// Snapshot of the worker's state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSnapshot {
    pub models: Vec<ModelSummary>,
    pub updates: u64,
    pub forced_updates: u64,
}

enum Command {
    Register {
        model: DecodedModel,
        reply: oneshot::Sender<RegisteredModel>,
    },
    Serialize {
        model: ModelId,
        reply: oneshot::Sender<Result<Bytes, ServiceError>>,
    },
    Unload {
        model: ModelId,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
    Update {
        force: bool,
    },
    Snapshot {
        reply: oneshot::Sender<WorkerSnapshot>,
    },
}

struct StoredModel {
    summary: ModelSummary,
    payload: Bytes,
}

#[derive(Default)]
struct WorkerState {
    models: Vec<StoredModel>,
    next_model: u64,
    updates: u64,
    forced_updates: u64,
}

impl WorkerState {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { model, reply } => {
                self.next_model += 1;
                let id = ModelId(self.next_model);
                let summary = ModelSummary {
                    id,
                    object: ObjectHandle(id.0),
                    offset: PolygonOffset::for_model(id, &model.name),
                    payload_size: model.payload.len(),
                    name: model.name,
                };
                let registered = RegisteredModel {
                    id,
                    name: summary.name.clone(),
                    object: summary.object,
                };
                self.models.push(StoredModel {
                    summary,
                    payload: model.payload,
                });
                let _ = reply.send(registered);
            }
            Command::Serialize { model, reply } => {
                let result = match self.models.iter().find(|m| m.summary.id == model) {
                    Some(stored) => gzip(&stored.payload),
                    None => Err(ServiceError::UnknownModel(model)),
                };
                let _ = reply.send(result);
            }
            Command::Unload { model, reply } => {
                let before = self.models.len();
                self.models.retain(|m| m.summary.id != model);
                let result = if self.models.len() < before {
                    Ok(())
                } else {
                    Err(ServiceError::UnknownModel(model))
                };
                let _ = reply.send(result);
            }
            Command::Update { force } => {
                if force {
                    self.forced_updates += 1;
                } else {
                    self.updates += 1;
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(WorkerSnapshot {
                    models: self.models.iter().map(|m| m.summary.clone()).collect(),
                    updates: self.updates,
                    forced_updates: self.forced_updates,
                });
            }
        }
    }
}

fn gzip(payload: &[u8]) -> Result<Bytes, ServiceError> {
    let compression_error = |e: std::io::Error| ServiceError::Rejected(format!("compression failed: {e}"));
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(compression_error)?;
    encoder.finish().map(Bytes::from).map_err(compression_error)
}

/// Fragments service whose models live on a tokio task.
pub struct FragmentsWorker {
    fetcher: Arc<dyn ByteFetcher>,
    store: WorkerStore,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    cameras: Mutex<FxHashMap<ModelId, Option<CameraHandle>>>,
    registered: EventHub<RegisteredModel>,
}

impl std::fmt::Debug for FragmentsWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentsWorker")
            .field("store", &self.store)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FragmentsWorker {
    pub fn new(fetcher: Arc<dyn ByteFetcher>, store: WorkerStore) -> Self {
        Self {
            fetcher,
            store,
            commands: Mutex::new(None),
            cameras: Mutex::new(FxHashMap::default()),
            registered: EventHub::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.commands.lock().is_some()
    }

    /// Camera bound to `model`, if any.
    pub fn camera_of(&self, model: ModelId) -> Option<CameraHandle> {
        self.cameras.lock().get(&model).copied().flatten()
    }

    pub async fn snapshot(&self) -> Result<WorkerSnapshot, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>, ServiceError> {
        self.commands
            .lock()
            .clone()
            .ok_or_else(|| ServiceError::NotConfigured("fragments worker not started".into()))
    }

    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.sender()?.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> ServiceError {
    ServiceError::Unavailable("fragments worker stopped".into())
}

#[async_trait]
impl FragmentsService for FragmentsWorker {
    async fn acquire_worker_endpoint(&self, url: &str) -> Result<WorkerEndpoint, ServiceError> {
        let fetch_error = |source: FetchError| ServiceError::Fetch {
            url: url.to_string(),
            source,
        };
        let code = self.fetcher.fetch(url).await.map_err(fetch_error)?;
        if code.is_empty() {
            return Err(fetch_error(FetchError::EmptyBody));
        }
        let endpoint = self.store.put(url, &code).await?;
        tracing::debug!(url = %url, uri = %endpoint.local_uri, size = endpoint.size, "Worker endpoint ready");
        Ok(endpoint)
    }

    async fn init(&self, endpoint: &WorkerEndpoint) -> Result<(), ServiceError> {
        let code = self.store.load(&endpoint.local_uri).await?;

        let mut commands = self.commands.lock();
        if commands.is_some() {
            return Err(ServiceError::Rejected("fragments worker already running".into()));
        }
        let (tx, mut rx) = mpsc::channel::<Command>(COMMAND_QUEUE);
        tokio::spawn(async move {
            let mut state = WorkerState::default();
            while let Some(command) = rx.recv().await {
                state.handle(command);
            }
            tracing::debug!(models = state.models.len(), "Fragments worker stopped");
        });
        *commands = Some(tx);

        tracing::debug!(uri = %endpoint.local_uri, size = code.len(), "Fragments worker started");
        Ok(())
    }

    async fn register_model(&self, model: DecodedModel) -> Result<RegisteredModel, ServiceError> {
        if model.payload.is_empty() {
            return Err(ServiceError::Rejected(format!("model '{}' has no geometry payload", model.name)));
        }
        let (reply, rx) = oneshot::channel();
        self.send(Command::Register { model, reply }).await?;
        let registered = rx.await.map_err(|_| stopped())?;

        self.cameras.lock().insert(registered.id, None);
        self.registered.emit(&registered);
        Ok(registered)
    }

    fn model_registered(&self) -> EventHub<RegisteredModel> {
        self.registered.clone()
    }

    fn bind_camera(&self, model: ModelId, camera: CameraHandle) -> Result<(), ServiceError> {
        match self.cameras.lock().get_mut(&model) {
            Some(slot) => {
                *slot = Some(camera);
                Ok(())
            }
            None => Err(ServiceError::UnknownModel(model)),
        }
    }

    fn update(&self, force: bool) {
        let Ok(sender) = self.sender() else {
            return;
        };
        // Unforced updates may be dropped when the worker is saturated.
        if let Err(mpsc::error::TrySendError::Full(command)) = sender.try_send(Command::Update { force }) {
            if force {
                tokio::spawn(async move {
                    let _ = sender.send(command).await;
                });
            }
        }
    }

    async fn serialize_model(&self, model: ModelId) -> Result<Bytes, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Serialize { model, reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    async fn unload_model(&self, model: ModelId) -> Result<(), ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unload { model, reply }).await?;
        rx.await.map_err(|_| stopped())??;
        self.cameras.lock().remove(&model);
        Ok(())
    }

    async fn shutdown(&self) {
        let sender = self.commands.lock().take();
        self.cameras.lock().clear();
        if sender.is_some() {
            tracing::debug!("Stopping fragments worker");
        }
    }
}
