//! Canvas-side state that is independent of any particular drawing
//! engine: the zoom viewport, drag bookkeeping, and the [`Surface`] seam
//! the session talks to when nodes and connectors need to appear,
//! move, or vanish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::graph::Node;
use crate::ids::EntityId;

pub const ZOOM_MIN: f32 = 0.3;
pub const ZOOM_STEP: f32 = 0.1;

/// Uniform scale transform anchored at the canvas origin. Zoom affects
/// rendering only; node positions are stored in unscaled canvas units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { zoom: 1.0 }
    }
}

impl Viewport {
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.zoom += ZOOM_STEP;
        self.zoom
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.zoom = (self.zoom - ZOOM_STEP).max(ZOOM_MIN);
        self.zoom
    }

    pub fn reset(&mut self) -> f32 {
        self.zoom = 1.0;
        self.zoom
    }

    /// Map screen-space coordinates (relative to the canvas origin) into
    /// unscaled canvas units.
    pub fn to_canvas(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.zoom).round() as i32,
            (y / self.zoom).round() as i32,
        )
    }
}

/// In-progress node relocation. The grab offset keeps the pointer
/// anchored where the drag started instead of snapping the node's
/// corner under the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub node: EntityId,
    pub grab_x: i32,
    pub grab_y: i32,
}

/// What the session needs from a drawing engine. The GUI binary binds
/// this to an iced canvas; tests bind it to a recorder.
///
/// `is_ready` exists because engines come up asynchronously: the session
/// polls it (bounded) before loading a workflow, since node and edge
/// creation immediately registers visual endpoints.
pub trait Surface: Send {
    fn is_ready(&self) -> bool;
    fn mount_node(&mut self, node: &Node);
    fn unmount_node(&mut self, id: &EntityId);
    /// The backend acknowledged a create and handed out a durable id;
    /// re-key whatever visual element was registered under the old one.
    fn rebind_node(&mut self, old: &EntityId, new: &EntityId);
    fn draw_connector(&mut self, source: &EntityId, target: &EntityId);
    fn erase_connector(&mut self, source: &EntityId, target: &EntityId);
    fn repaint(&mut self, id: &EntityId);
    fn set_zoom(&mut self, zoom: f32);
}

/// Surface that draws nothing. Headless sessions (demos, scripted runs)
/// use this.
#[derive(Debug, Default)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn is_ready(&self) -> bool {
        true
    }
    fn mount_node(&mut self, _node: &Node) {}
    fn unmount_node(&mut self, _id: &EntityId) {}
    fn rebind_node(&mut self, _old: &EntityId, _new: &EntityId) {}
    fn draw_connector(&mut self, _source: &EntityId, _target: &EntityId) {}
    fn erase_connector(&mut self, _source: &EntityId, _target: &EntityId) {}
    fn repaint(&mut self, _id: &EntityId) {}
    fn set_zoom(&mut self, _zoom: f32) {}
}

/// One recorded surface interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Mount(EntityId),
    Unmount(EntityId),
    Rebind { old: EntityId, new: EntityId },
    Connect { source: EntityId, target: EntityId },
    Disconnect { source: EntityId, target: EntityId },
    Repaint(EntityId),
    Zoom(f32),
}

/// Surface double that records every call, optionally reporting
/// not-ready for the first few polls to exercise the readiness wait.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
    ready_after: usize,
    polls: AtomicUsize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        RecordingSurface::default()
    }

    /// Report not-ready for the first `polls` readiness checks.
    pub fn ready_after(polls: usize) -> Self {
        RecordingSurface {
            ready_after: polls,
            ..RecordingSurface::default()
        }
    }

    pub fn handle(&self) -> RecordingHandle {
        RecordingHandle(Arc::clone(&self.ops))
    }

    fn push(&self, op: SurfaceOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

/// Shared view into a [`RecordingSurface`]'s log, usable after the
/// surface itself has been moved into a session.
#[derive(Debug, Clone)]
pub struct RecordingHandle(Arc<Mutex<Vec<SurfaceOp>>>);

impl RecordingHandle {
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.0.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn count(&self, filter: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops().iter().filter(|op| filter(op)).count()
    }
}

impl Surface for RecordingSurface {
    fn is_ready(&self) -> bool {
        self.polls.fetch_add(1, Ordering::Relaxed) >= self.ready_after
    }

    fn mount_node(&mut self, node: &Node) {
        self.push(SurfaceOp::Mount(node.id.clone()));
    }

    fn unmount_node(&mut self, id: &EntityId) {
        self.push(SurfaceOp::Unmount(id.clone()));
    }

    fn rebind_node(&mut self, old: &EntityId, new: &EntityId) {
        self.push(SurfaceOp::Rebind {
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn draw_connector(&mut self, source: &EntityId, target: &EntityId) {
        self.push(SurfaceOp::Connect {
            source: source.clone(),
            target: target.clone(),
        });
    }

    fn erase_connector(&mut self, source: &EntityId, target: &EntityId) {
        self.push(SurfaceOp::Disconnect {
            source: source.clone(),
            target: target.clone(),
        });
    }

    fn repaint(&mut self, id: &EntityId) {
        self.push(SurfaceOp::Repaint(id.clone()));
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.push(SurfaceOp::Zoom(zoom));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_floors_at_minimum_and_resets() {
        let mut viewport = Viewport::default();
        for _ in 0..20 {
            viewport.zoom_out();
        }
        assert!((viewport.zoom() - ZOOM_MIN).abs() < f32::EPSILON);
        viewport.zoom_in();
        assert!((viewport.zoom() - (ZOOM_MIN + ZOOM_STEP)).abs() < 1e-6);
        viewport.reset();
        assert!((viewport.zoom() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn screen_coordinates_unscale_by_zoom() {
        let mut viewport = Viewport::default();
        viewport.zoom_out(); // 0.9
        let (x, y) = viewport.to_canvas(90.0, 45.0);
        assert_eq!((x, y), (100, 50));
    }
}
