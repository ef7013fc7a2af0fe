// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host display surface: the container a viewer renders into.

use crate::types::{ElementId, SurfaceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SurfaceInner {
    id: SurfaceId,
    label: String,
    width: u32,
    height: u32,
    attached: AtomicBool,
    next_element: AtomicU64,
    elements: Mutex<Vec<(ElementId, String)>>,
}

/// Handle to a host container.
///
/// Clones share the same container. Identity is the [`SurfaceId`], so two
/// handles to one container map to one session in the registry.
#[derive(Debug, Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    /// Create an attached surface.
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)),
                label: label.into(),
                width,
                height,
                attached: AtomicBool::new(true),
                next_element: AtomicU64::new(1),
                elements: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Remove the container from the host; viewers can no longer bind to it.
    pub fn detach(&self) {
        self.inner.attached.store(false, Ordering::Release);
    }

    /// Append a child element of the given kind.
    pub fn append_element(&self, kind: impl Into<String>) -> ElementId {
        let id = ElementId(self.inner.next_element.fetch_add(1, Ordering::Relaxed));
        self.inner.elements.lock().push((id, kind.into()));
        id
    }

    /// Remove a child element. Returns false if it was not present.
    pub fn remove_element(&self, id: ElementId) -> bool {
        let mut elements = self.inner.elements.lock();
        let before = elements.len();
        elements.retain(|(element, _)| *element != id);
        elements.len() != before
    }

    /// Kinds of the child elements currently appended, in order.
    pub fn elements(&self) -> Vec<String> {
        self.inner
            .elements
            .lock()
            .iter()
            .map(|(_, kind)| kind.clone())
            .collect()
    }

    /// Reason this surface cannot host a viewer, if any.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.is_attached() {
            return Err(format!("{} ('{}') is detached", self.id(), self.label()));
        }
        if self.inner.width == 0 || self.inner.height == 0 {
            return Err(format!("{} ('{}') has zero size", self.id(), self.label()));
        }
        Ok(())
    }
}
