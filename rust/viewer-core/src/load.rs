// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request state for one in-flight model load.

use crate::services::ProgressCallback;
use crate::types::ModelSource;
use parking_lot::Mutex;
use std::sync::Arc;

/// Progress of a single `load_model` call.
///
/// Progress is clamped to `[0, 100]` and never moves backwards; regressions
/// and non-finite values reported by the decoder are dropped before they
/// reach the caller's callback.
pub struct PendingLoad {
    origin: String,
    progress: Arc<Mutex<Option<f64>>>,
    forward: Option<ProgressCallback>,
}

impl PendingLoad {
    pub fn new(source: &ModelSource, forward: Option<ProgressCallback>) -> Self {
        let origin = match source {
            ModelSource::Bytes { name, data } => format!("{name} ({} bytes)", data.len()),
            ModelSource::Url(url) => url.clone(),
        };
        Self {
            origin,
            progress: Arc::new(Mutex::new(None)),
            forward,
        }
    }

    /// Human-readable description of where the bytes come from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Last accepted percentage, or `None` while unknown.
    pub fn progress(&self) -> Option<f64> {
        *self.progress.lock()
    }

    /// Record a progress report.
    pub fn report(&self, percent: f64) {
        record(&self.progress, self.forward.as_ref(), percent);
    }

    /// Callback to hand to the decoder.
    pub fn callback(&self) -> ProgressCallback {
        let progress = Arc::clone(&self.progress);
        let forward = self.forward.clone();
        Arc::new(move |percent| record(&progress, forward.as_ref(), percent))
    }

    pub fn finish(&self) {
        self.report(100.0);
    }
}

fn record(progress: &Mutex<Option<f64>>, forward: Option<&ProgressCallback>, percent: f64) {
    if !percent.is_finite() {
        return;
    }
    let percent = percent.clamp(0.0, 100.0);
    {
        let mut current = progress.lock();
        if matches!(*current, Some(last) if percent <= last) {
            return;
        }
        *current = Some(percent);
    }
    if let Some(forward) = forward {
        forward(percent);
    }
}
