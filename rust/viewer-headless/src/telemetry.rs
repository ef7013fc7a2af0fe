// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame timing overlay.

use ifc_lite_viewer_core::{ElementId, ServiceError, Surface, TelemetryOverlay};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Element kind appended to the surface.
pub const STATS_ELEMENT: &str = "stats";

/// Aggregate frame timings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frames: u64,
    pub last_frame: Duration,
    pub slowest_frame: Duration,
    pub total: Duration,
}

impl FrameReport {
    pub fn average(&self) -> Duration {
        if self.frames == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total.as_nanos() / u128::from(self.frames);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

#[derive(Debug, Default)]
struct StatsState {
    element: Option<ElementId>,
    frame_start: Option<Instant>,
    report: FrameReport,
}

/// Overlay that times frames bracketed by `begin`/`end`.
#[derive(Debug, Default)]
pub struct FrameStats {
    state: Mutex<StatsState>,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> FrameReport {
        self.state.lock().report
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().element.is_some()
    }
}

impl TelemetryOverlay for FrameStats {
    fn mount(&self, surface: &Surface) -> Result<ElementId, ServiceError> {
        let mut state = self.state.lock();
        if let Some(element) = state.element {
            return Err(ServiceError::Rejected(format!("stats already mounted as {element}")));
        }
        let element = surface.append_element(STATS_ELEMENT);
        state.element = Some(element);
        Ok(element)
    }

    fn begin(&self) {
        self.state.lock().frame_start = Some(Instant::now());
    }

    fn end(&self) {
        let mut state = self.state.lock();
        let Some(started) = state.frame_start.take() else {
            return;
        };
        let elapsed = started.elapsed();
        let report = &mut state.report;
        report.frames += 1;
        report.last_frame = elapsed;
        report.total += elapsed;
        report.slowest_frame = report.slowest_frame.max(elapsed);
    }

    fn unmount(&self, surface: &Surface, element: ElementId) {
        let mut state = self.state.lock();
        if state.element == Some(element) {
            state.element = None;
            state.frame_start = None;
        }
        surface.remove_element(element);
    }
}
