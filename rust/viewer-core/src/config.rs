// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Viewer configuration loaded from environment variables.

use crate::types::DecoderSettings;
use serde::{Deserialize, Serialize};

/// Fragments worker published alongside the fragments engine.
pub const DEFAULT_WORKER_URL: &str = "https://thatopen.github.io/engine_fragment/resources/worker.mjs";

/// Viewer lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Location of the decoder's WebAssembly payload.
    pub wasm_path: String,
    /// Whether `wasm_path` is absolute rather than relative to the host.
    pub wasm_absolute: bool,
    /// URL of the fragments worker code.
    pub worker_url: String,
    /// Attach the frame telemetry overlay during setup.
    pub telemetry: bool,
}

impl ViewerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            wasm_path: std::env::var("VIEWER_WASM_PATH").unwrap_or_else(|_| "/wasm/".into()),
            wasm_absolute: parse_flag(std::env::var("VIEWER_WASM_ABSOLUTE").ok(), false),
            worker_url: std::env::var("VIEWER_WORKER_URL")
                .unwrap_or_else(|_| DEFAULT_WORKER_URL.into()),
            telemetry: parse_flag(std::env::var("VIEWER_TELEMETRY").ok(), true),
        }
    }

    /// Decoder settings derived from this configuration.
    pub fn decoder_settings(&self) -> DecoderSettings {
        DecoderSettings {
            wasm_path: self.wasm_path.clone(),
            absolute: self.wasm_absolute,
        }
    }

    pub fn with_worker_url(mut self, url: impl Into<String>) -> Self {
        self.worker_url = url.into();
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry = enabled;
        self
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse a boolean environment value, falling back to `default` when unset or unrecognized.
pub fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
