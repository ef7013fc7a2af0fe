// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC-Lite Viewer Host - headless viewer driven from the command line.
//!
//! Creates one viewer session on a virtual surface, then runs the control
//! panel actions given as arguments:
//!
//! - `<file.ifc>` / `--url <URL>` / `--sample` - load a model
//! - `--download` - export the first model as a `.frag` file
//! - `--frames <n>` - render frames (feeds the stats overlay)

use anyhow::Context;
use ifc_lite_viewer_core::{SessionRegistry, Surface, ViewerConfig};
use ifc_lite_viewer_headless::{HeadlessBackend, HeadlessConfig};
use std::sync::Arc;

mod args;
mod config;
mod panel;

use args::{Action, Command};
use config::Config;
use panel::ControlPanel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,ifc_lite_viewer_core=debug,ifc_lite_viewer_host=debug".into()),
        )
        .pretty()
        .init();

    let actions = match args::parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{}", args::usage());
            return Ok(());
        }
        Ok(Command::Run(actions)) => actions,
        Err(message) => {
            eprintln!("{message}\n\n{}", args::usage());
            std::process::exit(2);
        }
    };

    let config = Config::from_env();
    let viewer_config = ViewerConfig::from_env();
    let headless_config = HeadlessConfig::from_env();

    tracing::info!(
        worker_url = %viewer_config.worker_url,
        wasm_path = %viewer_config.wasm_path,
        cache_dir = %headless_config.cache_dir,
        export_dir = %config.export_dir,
        "Starting IFC-Lite viewer"
    );

    let backend = Arc::new(HeadlessBackend::new(&headless_config).context("Failed to build HTTP client")?);
    let registry = SessionRegistry::new(backend.clone(), viewer_config);
    let surface = Surface::new("viewer", config.surface_width, config.surface_height);

    let session = registry.create(Some(&surface))?;
    session.initialize().await.context("Viewer setup failed")?;

    let panel = ControlPanel::new(Arc::clone(&session), config.sample_url.clone(), &config.export_dir);
    let result = run(&panel, &backend, &surface, actions).await;

    if let Ok(models) = serde_json::to_string_pretty(&session.models()) {
        println!("{models}");
    }
    registry.destroy_all().await;
    result
}

async fn run(
    panel: &ControlPanel,
    backend: &HeadlessBackend,
    surface: &Surface,
    actions: Vec<Action>,
) -> anyhow::Result<()> {
    for action in actions {
        tracing::debug!(?action, label = panel.load_label(), "Control panel action");
        match action {
            Action::LoadSample => {
                panel.load_sample().await?;
            }
            Action::LoadUrl(url) => {
                panel.load_url(&url).await?;
            }
            Action::LoadFile(path) => {
                panel.load_file(&path).await?;
            }
            Action::Download => {
                if !panel.download_visible() {
                    tracing::warn!(button = panel::DOWNLOAD_LABEL, "Nothing to download yet");
                    continue;
                }
                let written = panel.download().await?;
                println!("{}", written.display());
            }
            Action::RenderFrames(count) => {
                let services = backend
                    .services_for(surface.id())
                    .context("No services bound to the viewer surface")?;
                let (renderer, _) = *services
                    .scene
                    .active_renderers()
                    .first()
                    .context("Viewer has no active renderer")?;
                for _ in 0..count {
                    services.scene.render_frame(renderer)?;
                }
                let report = services.stats.report();
                tracing::info!(
                    frames = report.frames,
                    average_us = report.average().as_micros() as u64,
                    slowest_us = report.slowest_frame.as_micros() as u64,
                    "Rendered frames"
                );
            }
        }
    }
    Ok(())
}
