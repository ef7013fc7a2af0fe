// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control panel actions: load a model, download its fragments.

use ifc_lite_viewer_core::{LoadedModel, ModelSource, ProgressCallback, ViewerError, ViewerSession};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const LOAD_LABEL: &str = "Load IFC";
pub const LOADING_LABEL: &str = "Conversion in progress...";
pub const DOWNLOAD_LABEL: &str = "Download Fragments";

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("A model is already being loaded")]
    Busy,

    #[error(transparent)]
    Viewer(#[from] ViewerError),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PanelError {
    let path = path.to_path_buf();
    move |source| PanelError::Io { path, source }
}

/// Clears the loading flag when the load finishes, however it finishes.
struct LoadGuard<'a>(&'a AtomicBool);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Buttons of the viewer's control panel.
pub struct ControlPanel {
    session: Arc<ViewerSession>,
    sample_url: String,
    export_dir: PathBuf,
    loading: AtomicBool,
}

impl ControlPanel {
    pub fn new(session: Arc<ViewerSession>, sample_url: impl Into<String>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            sample_url: sample_url.into(),
            export_dir: export_dir.into(),
            loading: AtomicBool::new(false),
        }
    }

    /// Label of the load button.
    pub fn load_label(&self) -> &'static str {
        if self.is_loading() {
            LOADING_LABEL
        } else {
            LOAD_LABEL
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// The download button is only shown once a model is loaded.
    pub fn download_visible(&self) -> bool {
        self.session.model_count() > 0
    }

    pub async fn load_sample(&self) -> Result<LoadedModel, PanelError> {
        let url = self.sample_url.clone();
        self.load(ModelSource::url(url)).await
    }

    pub async fn load_url(&self, url: &str) -> Result<LoadedModel, PanelError> {
        self.load(ModelSource::url(url)).await
    }

    /// Read a local IFC file and load it.
    pub async fn load_file(&self, path: &Path) -> Result<LoadedModel, PanelError> {
        let data = tokio::fs::read(path).await.map_err(io_error(path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.ifc".into());
        self.load(ModelSource::bytes(data, name)).await
    }

    async fn load(&self, source: ModelSource) -> Result<LoadedModel, PanelError> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PanelError::Busy);
        }
        let _guard = LoadGuard(&self.loading);

        let name = source.display_name();
        let progress_name = name.clone();
        let on_progress: ProgressCallback = Arc::new(move |percent| {
            tracing::debug!(model = %progress_name, percent, "Conversion progress");
        });
        let model = self.session.load_model(source, Some(on_progress)).await?;
        tracing::info!(model = %model.id, name = %name, geometry = model.geometry_count, "Conversion finished");
        Ok(model)
    }

    /// Export the first loaded model into the export directory.
    pub async fn download(&self) -> Result<PathBuf, PanelError> {
        let exported = self.session.export_first_model().await?;
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(io_error(&self.export_dir))?;
        let target = self.export_dir.join(&exported.file_name);
        tokio::fs::write(&target, &exported.bytes)
            .await
            .map_err(io_error(&target))?;

        tracing::info!(path = %target.display(), size = exported.bytes.len(), "Fragments written");
        Ok(target)
    }
}
