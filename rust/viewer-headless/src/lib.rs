// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Lite Viewer Headless
//!
//! Service implementations for running viewer sessions without a GPU or a
//! browser: an HTTP fetcher, a disk-backed worker code store, a STEP
//! decoder, a fragments worker on a tokio task, a recording scene graph and a
//! frame timing overlay.
//!
//! ```rust,ignore
//! use ifc_lite_viewer_core::{SessionRegistry, Surface, ViewerConfig};
//! use ifc_lite_viewer_headless::{HeadlessBackend, HeadlessConfig};
//!
//! let backend = Arc::new(HeadlessBackend::new(&HeadlessConfig::from_env())?);
//! let registry = SessionRegistry::new(backend.clone(), ViewerConfig::from_env());
//! let surface = Surface::new("viewer", 1280, 720);
//! registry.create(Some(&surface))?.initialize().await?;
//! ```

pub mod backend;
pub mod config;
pub mod decoder;
pub mod fetch;
pub mod fragments;
pub mod scene;
pub mod step;
pub mod store;
pub mod telemetry;

pub use backend::{HeadlessBackend, HeadlessServices};
pub use config::HeadlessConfig;
pub use decoder::{FragmentsPayload, StepDecoder};
pub use fetch::HttpFetcher;
pub use fragments::{FragmentsWorker, ModelSummary, PolygonOffset, WorkerSnapshot};
pub use scene::RecordingScene;
pub use step::{EntityRecord, EntityScanner, ScanError, StepSummary};
pub use store::{StoreError, WorkerStore};
pub use telemetry::{FrameReport, FrameStats};
