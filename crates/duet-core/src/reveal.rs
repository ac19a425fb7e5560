//! Overlay reveal gating
//!
//! The overlay becomes visible and audible exactly once: on the first
//! primary position sample at or past the threshold that arrives while the
//! overlay is playable. Readiness and threshold crossing combine with a
//! logical AND, so their arrival order does not matter. A stall after the
//! first ready report keeps the state at Armed but holds the reveal until
//! the overlay reports ready again.
//!
//! ```text
//!            OverlayReady                sample >= threshold
//!  Waiting ───────────────► Armed ─────────────────────────► Revealed
//!     │                                                          ▲
//!     └── sample >= threshold: keep sampling ────────────────────┘ (after OverlayReady)
//! ```
//!
//! The coordinator is a pure state-transition function: inputs arrive as
//! messages and side effects are returned for the caller to perform.

use crate::types::RevealState;
use std::time::Duration;
use tracing::{debug, info};

/// Message consumed by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealInput {
    /// Overlay session finished buffering
    OverlayReady,
    /// Overlay session went back to buffering; no retry needed
    OverlayBuffering,
    /// Overlay session lost readiness
    OverlayStalled,
    /// Periodic primary position read; `None` when unavailable
    PrimarySample(Option<Duration>),
}

/// Side effect requested by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealEffect {
    /// Make the overlay container visible
    ShowOverlay,
    /// Set the overlay session to play when ready
    PlayOverlay,
    /// Re-issue prepare on the overlay session
    RetryOverlay,
    /// Cancel the position sampler
    StopSampler,
}

/// Decides the single moment the overlay is revealed
#[derive(Debug, Clone)]
pub struct OverlayRevealCoordinator {
    threshold: Duration,
    state: RevealState,
    /// Overlay has reported ready at least once
    overlay_ready: bool,
    /// Overlay is ready right now; cleared by a stall
    overlay_playable: bool,
    /// Set the first time a sample crosses the threshold
    threshold_crossed_at: Option<Duration>,
    samples: u64,
}

impl OverlayRevealCoordinator {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: RevealState::Waiting,
            overlay_ready: false,
            overlay_playable: false,
            threshold_crossed_at: None,
            samples: 0,
        }
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_overlay_ready(&self) -> bool {
        self.overlay_ready
    }

    /// Whether the overlay could start playing immediately
    pub fn is_overlay_playable(&self) -> bool {
        self.overlay_playable
    }

    /// Number of position samples consumed
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Apply one input and return the effects to perform, in order
    pub fn handle(&mut self, input: RevealInput) -> Vec<RevealEffect> {
        match input {
            RevealInput::OverlayReady => {
                self.overlay_ready = true;
                self.overlay_playable = true;
                if self.state == RevealState::Waiting {
                    self.state = RevealState::Armed;
                    info!(threshold_ms = self.threshold.as_millis() as u64, "Overlay armed");
                }
                Vec::new()
            }
            // Armed never falls back to Waiting
            RevealInput::OverlayBuffering => {
                self.overlay_playable = false;
                Vec::new()
            }
            RevealInput::OverlayStalled => {
                self.overlay_playable = false;
                vec![RevealEffect::RetryOverlay]
            }
            RevealInput::PrimarySample(position) => self.on_sample(position),
        }
    }

    fn on_sample(&mut self, position: Option<Duration>) -> Vec<RevealEffect> {
        if self.state == RevealState::Revealed {
            return Vec::new();
        }
        self.samples += 1;

        let Some(position) = position else {
            return Vec::new();
        };
        if position < self.threshold {
            return Vec::new();
        }

        if self.threshold_crossed_at.is_none() {
            self.threshold_crossed_at = Some(position);
            debug!(position_ms = position.as_millis() as u64, "Reveal threshold crossed");
        }
        if !self.overlay_playable {
            return Vec::new();
        }

        self.state = RevealState::Revealed;
        info!(
            position_ms = position.as_millis() as u64,
            samples = self.samples,
            "Overlay revealed"
        );
        vec![
            RevealEffect::ShowOverlay,
            RevealEffect::PlayOverlay,
            RevealEffect::StopSampler,
        ]
    }
}
