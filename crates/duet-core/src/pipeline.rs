//! Pipeline engine boundary
//!
//! Decoding, rendering, segment fetching and demuxing live behind these
//! traits. A session only issues commands and listens for state reports.

use crate::drm::DrmHandle;
use crate::error::Result;
use crate::lifecycle::{LoopEvent, LoopEventKind};
use crate::resolver::SourceConfig;
use crate::types::{PipelineEvent, RepeatPolicy, SessionRole};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Listener installed at `prepare` time; the only channel for state reports
#[derive(Debug, Clone)]
pub struct EventSink {
    role: SessionRole,
    generation: u64,
    tx: mpsc::UnboundedSender<LoopEvent>,
}

impl EventSink {
    pub(crate) fn new(role: SessionRole, generation: u64, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { role, generation, tx }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Deliver a state report; returns false once the event loop is gone
    pub fn emit(&self, event: PipelineEvent) -> bool {
        trace!(role = %self.role, %event, "Pipeline report");
        self.tx
            .send(LoopEvent {
                generation: self.generation,
                kind: LoopEventKind::Pipeline {
                    role: self.role,
                    event,
                },
            })
            .is_ok()
    }
}

/// Opaque capability set of one player pipeline
pub trait Pipeline: Send {
    /// Begin asynchronous loading; reports flow to `events`.
    /// Calling it again after a stall re-issues loading.
    fn prepare(&mut self, events: EventSink);

    /// Start or resume output once ready
    fn play(&mut self);

    fn pause(&mut self);

    fn seek_to(&mut self, position: Duration);

    /// Tell the engine how the owning session loops, so it can preload
    /// the next iteration. End of content is still reported as `Ended`.
    fn set_repeat(&mut self, policy: RepeatPolicy);

    fn current_position(&self) -> Duration;

    /// Detach and free the underlying resources
    fn release(&mut self);
}

/// Allocates pipelines for resolved sources
pub trait PipelineFactory: Send + Sync {
    /// Fails with `PipelineCreation` when the engine cannot allocate one
    fn create(
        &self,
        role: SessionRole,
        config: &SourceConfig,
        drm: Option<&DrmHandle>,
    ) -> Result<Box<dyn Pipeline>>;
}
