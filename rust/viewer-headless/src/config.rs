// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headless backend configuration loaded from environment variables.

use std::time::Duration;

/// Headless backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessConfig {
    /// Directory for fetched worker code.
    pub cache_dir: String,
    /// HTTP timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// How long camera transitions take, in milliseconds.
    pub camera_settle_ms: u64,
}

impl HeadlessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            cache_dir: std::env::var("VIEWER_CACHE_DIR").unwrap_or_else(|_| {
                std::env::current_dir()
                    .ok()
                    .and_then(|dir| dir.join(".cache").join("worker").to_str().map(|s| s.to_string()))
                    .unwrap_or_else(|| "./.cache/worker".into())
            }),
            fetch_timeout_secs: std::env::var("VIEWER_FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
            camera_settle_ms: std::env::var("VIEWER_CAMERA_SETTLE_MS")
                .unwrap_or_else(|_| "0".into())
                .parse()
                .unwrap_or(0),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn camera_settle(&self) -> Duration {
        Duration::from_millis(self.camera_settle_ms)
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
