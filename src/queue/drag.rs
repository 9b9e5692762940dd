//! Interactive drag-to-reorder.
//!
//! While a drag is in progress only the session's ghost position moves; the
//! queue itself is untouched until [`DragReorderSession::commit`], which
//! issues exactly one `move_item`.

use super::controller::QueueController;
use crate::config::DragConfig;
use crate::error::{Error, Result};

/// Where a drag session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        from: usize,
        ghost: usize,
    },
    Committed {
        from: usize,
        to: usize,
    },
    Cancelled,
}

/// Transient reorder state for one list view.
#[derive(Debug, Clone)]
pub struct DragReorderSession {
    state: DragState,
    /// Queue length captured when the drag began
    len: usize,
    config: DragConfig,
}

impl DragReorderSession {
    pub fn new(config: DragConfig) -> Self {
        Self {
            state: DragState::Idle,
            len: 0,
            config: config.validated(),
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Start dragging the item at `index` of a queue of `len` entries.
    ///
    /// A finished session (committed or cancelled) can be reused.
    pub fn begin(&mut self, index: usize, len: usize) -> Result<()> {
        if self.is_dragging() {
            return Err(Error::invalid_argument("a drag is already in progress"));
        }
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        self.len = len;
        self.state = DragState::Dragging {
            from: index,
            ghost: index,
        };
        tracing::debug!(from = index, len, "Drag started");
        Ok(())
    }

    /// Pointer is over `index`; returns the (clamped) ghost position.
    ///
    /// Ignored outside a drag.
    pub fn hover(&mut self, index: usize) -> Option<usize> {
        let DragState::Dragging { from, .. } = self.state else {
            return None;
        };
        let ghost = index.min(self.len.saturating_sub(1));
        self.state = DragState::Dragging { from, ghost };
        Some(ghost)
    }

    /// Indices into the real queue, in the order the list should draw them.
    pub fn visual_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len).collect();
        if let DragState::Dragging { from, ghost } = self.state {
            let item = order.remove(from);
            order.insert(ghost, item);
        }
        order
    }

    /// Release: issue one `move_item(from, ghost)`, even if nothing moved.
    ///
    /// If the controller rejects the move the session ends cancelled and the
    /// error is returned; the list should redraw from the queue.
    pub async fn commit(&mut self, controller: &QueueController) -> Result<()> {
        let DragState::Dragging { from, ghost } = self.state else {
            return Err(Error::invalid_argument("no drag in progress"));
        };

        match controller.move_item(from, ghost).await {
            Ok(()) => {
                self.state = DragState::Committed { from, to: ghost };
                tracing::debug!(from, to = ghost, "Drag committed");
                Ok(())
            }
            Err(e) => {
                self.state = DragState::Cancelled;
                tracing::warn!(from, to = ghost, error = %e, "Drag commit rejected");
                Err(e)
            }
        }
    }

    /// Abort the drag; no mutation is issued.
    pub fn cancel(&mut self) {
        if self.is_dragging() {
            tracing::debug!("Drag cancelled");
            self.state = DragState::Cancelled;
        }
    }

    /// Signed auto-scroll speed for a pointer at `pointer_y` in a view of
    /// `view_height`. Negative scrolls up, positive down, zero outside the
    /// edge zones.
    pub fn scroll_velocity(&self, pointer_y: f32, view_height: f32) -> f32 {
        if !self.is_dragging() {
            return 0.0;
        }
        scroll_velocity(&self.config, pointer_y, view_height)
    }
}

/// `max_scroll_speed * weight`, with `weight` clamped to `[0, 1]`.
pub fn speed_for_weight(config: &DragConfig, weight: f32) -> f32 {
    let weight = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
    config.max_scroll_speed * weight
}

/// Edge-scroll velocity for a pointer position inside a view.
///
/// The edge zone is `edge_threshold * view_height` tall at both ends. The
/// weight grows linearly from 0 at the inner boundary to 1 at the edge.
pub fn scroll_velocity(config: &DragConfig, pointer_y: f32, view_height: f32) -> f32 {
    if view_height.is_nan() || view_height <= 0.0 || !pointer_y.is_finite() {
        return 0.0;
    }
    let zone = config.edge_threshold * view_height;
    let y = pointer_y.clamp(0.0, view_height);

    if y < zone {
        -speed_for_weight(config, 1.0 - y / zone)
    } else if y > view_height - zone {
        speed_for_weight(config, 1.0 - (view_height - y) / zone)
    } else {
        0.0
    }
}
