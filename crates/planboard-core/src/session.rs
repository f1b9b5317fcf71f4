//! Lifecycle of one pointer drag: start, move, end, cancel.

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::backend::{TaskBackend, commit_drop};
use crate::config::Settings;
use crate::geometry::Point;
use crate::preview::{DragOrigin, DragPreview, PreviewBroadcast, PreviewSink, PreviewVariant};
use crate::schedule::Commit;
use crate::target::{DropTarget, resolve};
use crate::task::Task;
use crate::zone::ZoneQuery;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    pub id: Uuid,
    pub task: Task,
    pub origin: DragOrigin,
    pub pointer: Point,
    pub hover_target: Option<DropTarget>,
}

/// Drives drags of tasks over the zones in `Z` and commits drops to `B`.
///
/// All calls are synchronous and expected on one event thread. At most one
/// drag is active at a time.
#[derive(Debug)]
pub struct DragEngine<Z, B> {
    zones: Z,
    backend: B,
    broadcast: PreviewBroadcast,
    settings: Settings,
    active: Option<ActiveDrag>,
}

impl<Z, B> DragEngine<Z, B>
where
    Z: ZoneQuery,
    B: TaskBackend,
{
    pub fn new(zones: Z, backend: B, settings: Settings) -> Self {
        debug!(
            geometric_targets = settings.supports_geometric_targets,
            timezone = %settings.timezone,
            "created drag engine"
        );
        Self {
            zones,
            backend,
            broadcast: PreviewBroadcast::new(),
            settings,
            active: None,
        }
    }

    /// Registers a view region for preview notifications.
    pub fn subscribe(&mut self, sink: Box<dyn PreviewSink>) {
        self.broadcast.subscribe(sink);
    }

    pub fn zones(&self) -> &Z {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut Z {
        &mut self.zones
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn into_parts(self) -> (Z, B) {
        (self.zones, self.backend)
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn start(&mut self, task: Task, origin: DragOrigin, x: f64, y: f64) {
        if let Some(stale) = &self.active {
            warn!(stale_task = %stale.task.id, "drag started while another was active; cancelling it");
            self.cancel();
        }

        let drag = ActiveDrag {
            id: Uuid::new_v4(),
            task,
            origin,
            pointer: Point::new(x, y),
            hover_target: None,
        };
        info!(drag_id = %drag.id, ?origin, "drag started");

        self.broadcast.clear_hover();
        self.broadcast.show_drag(&DragPreview {
            task: drag.task.clone(),
            pointer: drag.pointer,
            variant: origin.variant(),
        });
        self.active = Some(drag);
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn move_to(&mut self, x: f64, y: f64) {
        let Some(drag) = self.active.as_mut() else {
            trace!("pointer move without an active drag; ignoring");
            return;
        };
        drag.pointer = Point::new(x, y);

        if self.settings.supports_geometric_targets {
            let target = resolve(&self.zones, drag.pointer, Some(&drag.task.id), &self.settings);
            if target != drag.hover_target {
                debug!(
                    drag_id = %drag.id,
                    from = drag.hover_target.as_ref().map(DropTarget::kind_name),
                    to = target.as_ref().map(DropTarget::kind_name),
                    "hover target changed"
                );
                self.broadcast.show_target(&drag.task, target.as_ref(), &self.settings);
                drag.hover_target = target;
            }
        }

        let variant = if self.settings.supports_geometric_targets {
            PreviewVariant::for_target(drag.hover_target.as_ref(), drag.origin)
        } else {
            drag.origin.variant()
        };
        self.broadcast.show_drag(&DragPreview {
            task: drag.task.clone(),
            pointer: drag.pointer,
            variant,
        });
    }

    /// Finishes the drag at the release point. Previews are cleared whether
    /// or not anything is committed; the committed drop is returned.
    #[tracing::instrument(skip(self))]
    pub fn end(&mut self, x: f64, y: f64) -> Option<Commit> {
        let Some(drag) = self.active.take() else {
            debug!("drag end without an active drag; ignoring");
            return None;
        };
        self.broadcast.clear_all();

        if !self.settings.supports_geometric_targets {
            debug!(drag_id = %drag.id, "no geometric targets on this host; nothing to commit");
            return None;
        }

        let release = Point::new(x, y);
        let Some(target) = resolve(&self.zones, release, Some(&drag.task.id), &self.settings) else {
            info!(drag_id = %drag.id, "dropped over empty space");
            return None;
        };

        let commit = commit_drop(&mut self.backend, &drag.task, &target, &self.settings);
        info!(
            drag_id = %drag.id,
            task_id = %commit.task_id,
            target = commit.target.kind_name(),
            "drop committed"
        );
        Some(commit)
    }

    /// Abandons the active drag without committing. Safe to call at any
    /// time, including right after [`DragEngine::end`].
    #[tracing::instrument(skip(self))]
    pub fn cancel(&mut self) {
        let Some(drag) = self.active.take() else {
            trace!("cancel without an active drag; nothing to do");
            return;
        };
        info!(drag_id = %drag.id, "drag cancelled");
        self.broadcast.clear_all();
    }
}
