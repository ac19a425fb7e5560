//! Presentation surface boundary
//!
//! The video view and the overlay container. The coordinator calls these
//! as effects of state transitions and never renders anything itself.

use crate::types::{SessionId, SessionRole};
use serde::Serialize;
use tracing::info;

/// Video view plus overlay container, addressed by session role
pub trait PresentationSurface: Send {
    /// Route a session's output into the slot
    fn attach(&mut self, slot: SessionRole, session: SessionId);

    fn detach(&mut self, slot: SessionRole);

    fn set_visible(&mut self, slot: SessionRole, visible: bool);

    fn set_offset(&mut self, slot: SessionRole, x: f32, y: f32);

    fn set_opacity(&mut self, slot: SessionRole, opacity: f32);
}

/// Last applied properties of one slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotState {
    pub attached: Option<SessionId>,
    pub visible: bool,
    pub offset: (f32, f32),
    pub opacity: f32,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            attached: None,
            visible: true,
            offset: (0.0, 0.0),
            opacity: 1.0,
        }
    }
}

/// Headless surface that logs every call and remembers slot state
#[derive(Debug, Default, Clone)]
pub struct TracingSurface {
    primary: SlotState,
    overlay: SlotState,
}

impl TracingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, slot: SessionRole) -> SlotState {
        match slot {
            SessionRole::Primary => self.primary,
            SessionRole::Overlay => self.overlay,
        }
    }

    fn slot_mut(&mut self, slot: SessionRole) -> &mut SlotState {
        match slot {
            SessionRole::Primary => &mut self.primary,
            SessionRole::Overlay => &mut self.overlay,
        }
    }
}

impl PresentationSurface for TracingSurface {
    fn attach(&mut self, slot: SessionRole, session: SessionId) {
        info!(%slot, session_id = %session, "Surface attached");
        self.slot_mut(slot).attached = Some(session);
    }

    fn detach(&mut self, slot: SessionRole) {
        info!(%slot, "Surface detached");
        self.slot_mut(slot).attached = None;
    }

    fn set_visible(&mut self, slot: SessionRole, visible: bool) {
        info!(%slot, visible, "Surface visibility");
        self.slot_mut(slot).visible = visible;
    }

    fn set_offset(&mut self, slot: SessionRole, x: f32, y: f32) {
        self.slot_mut(slot).offset = (x, y);
    }

    fn set_opacity(&mut self, slot: SessionRole, opacity: f32) {
        self.slot_mut(slot).opacity = opacity;
    }
}
