// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC decoder producing fragments payloads from STEP files.

use crate::step::{self, ScanError, StepSummary};
use async_trait::async_trait;
use bytes::Bytes;
use ifc_lite_viewer_core::{DecodedModel, DecoderSettings, IfcDecoder, ProgressCallback, ServiceError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress is reported in steps of this many percent.
const PROGRESS_STEP: f64 = 5.0;

/// Geometry description handed to the fragments worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentsPayload {
    pub name: String,
    pub schema: String,
    pub entity_count: usize,
    pub geometry: Vec<u32>,
    pub types: BTreeMap<String, usize>,
}

impl FragmentsPayload {
    fn from_summary(name: &str, summary: StepSummary) -> Self {
        Self {
            name: name.to_string(),
            schema: summary.schema,
            entity_count: summary.entity_count,
            geometry: summary.geometry_ids,
            types: summary.type_counts.into_iter().collect(),
        }
    }
}

impl From<ScanError> for ServiceError {
    fn from(e: ScanError) -> Self {
        ServiceError::Decode(e.to_string())
    }
}

/// Decoder backed by the STEP scanner.
#[derive(Debug, Default)]
pub struct StepDecoder {
    settings: RwLock<Option<DecoderSettings>>,
}

impl StepDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings given to the last successful `configure`.
    pub fn settings(&self) -> Option<DecoderSettings> {
        self.settings.read().clone()
    }
}

#[async_trait]
impl IfcDecoder for StepDecoder {
    async fn configure(&self, settings: DecoderSettings) -> Result<(), ServiceError> {
        let path = settings.wasm_path.trim();
        if path.is_empty() {
            return Err(ServiceError::NotConfigured("empty wasm path".into()));
        }
        if settings.absolute && !(path.starts_with("http://") || path.starts_with("https://") || path.starts_with('/')) {
            return Err(ServiceError::NotConfigured(format!(
                "absolute wasm path expected, got '{path}'"
            )));
        }

        let mut wasm_path = path.to_string();
        if !wasm_path.ends_with('/') {
            wasm_path.push('/');
        }
        tracing::debug!(wasm_path = %wasm_path, absolute = settings.absolute, "Decoder configured");
        *self.settings.write() = Some(DecoderSettings {
            wasm_path,
            absolute: settings.absolute,
        });
        Ok(())
    }

    async fn decode(
        &self,
        bytes: Bytes,
        name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DecodedModel, ServiceError> {
        if self.settings.read().is_none() {
            return Err(ServiceError::NotConfigured("decoder used before configure".into()));
        }

        let owned_name = name.to_string();
        let size = bytes.len();
        let summary = tokio::task::spawn_blocking(move || {
            let mut reported = 0.0;
            step::summarize(&bytes, |at, total| {
                let Some(progress) = on_progress.as_ref() else {
                    return;
                };
                let percent = (at as f64 / total.max(1) as f64 * 100.0).min(100.0);
                if percent - reported >= PROGRESS_STEP {
                    reported = percent;
                    progress(percent);
                }
            })
        })
        .await
        .map_err(|e| ServiceError::Unavailable(format!("decode task failed: {e}")))??;

        let schema = summary.schema.clone();
        let entity_count = summary.entity_count;
        let geometry_count = summary.geometry_ids.len();
        let payload = FragmentsPayload::from_summary(&owned_name, summary);
        let payload = serde_json::to_vec(&payload).map_err(|e| ServiceError::Decode(e.to_string()))?;

        tracing::debug!(
            name = %owned_name,
            schema = %schema,
            entities = entity_count,
            geometry = geometry_count,
            size,
            "Decoded IFC model"
        );
        Ok(DecodedModel {
            name: owned_name,
            schema,
            entity_count,
            geometry_count,
            payload: Bytes::from(payload),
        })
    }
}
