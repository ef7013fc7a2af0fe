// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host configuration loaded from environment variables.

/// Sample model offered by the "load from URL" action.
pub const DEFAULT_SAMPLE_URL: &str =
    "https://thatopen.github.io/engine_components/resources/ifc/school_str.ifc";

/// Host configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model loaded by `--sample`.
    pub sample_url: String,
    /// Directory downloaded fragments are written to.
    pub export_dir: String,
    /// Surface width in pixels.
    pub surface_width: u32,
    /// Surface height in pixels.
    pub surface_height: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            sample_url: std::env::var("VIEWER_SAMPLE_URL").unwrap_or_else(|_| DEFAULT_SAMPLE_URL.into()),
            export_dir: std::env::var("VIEWER_EXPORT_DIR").unwrap_or_else(|_| ".".into()),
            surface_width: std::env::var("VIEWER_SURFACE_WIDTH")
                .unwrap_or_else(|_| "1280".into())
                .parse()
                .unwrap_or(1280),
            surface_height: std::env::var("VIEWER_SURFACE_HEIGHT")
                .unwrap_or_else(|_| "720".into())
                .parse()
                .unwrap_or(720),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
