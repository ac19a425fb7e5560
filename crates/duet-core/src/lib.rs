//! Duet Core - Dual-session playback coordinator
//!
//! This crate coordinates a primary media stream with a looping overlay
//! clip that is revealed once the primary passes a fixed position:
//! - Media source resolution (segmented vs progressive, DRM)
//! - Playback session state machines with looping and stall retry
//! - Overlay reveal gating on primary position and overlay readiness
//! - Foreground/background lifecycle binding with leak-free teardown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Duet Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │ MediaSource  │  │     DRM      │  │   Pipeline   │          │
//! │  │  Resolver    │  │   Sessions   │  │   Factory    │          │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘          │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                 ┌─────────┴─────────┐                           │
//! │                 │ Activity Lifecycle│                           │
//! │                 │      Binder       │                           │
//! │                 └─────────┬─────────┘                           │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐           │
//! │  │   Primary    │  │   Reveal    │  │   Overlay    │           │
//! │  │   Session    │  │ Coordinator │  │   Session    │           │
//! │  └──────────────┘  └─────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod drm;
pub mod resolver;
pub mod pipeline;
pub mod session;
pub mod reveal;
pub mod timer;
pub mod surface;
pub mod lifecycle;
#[cfg(feature = "sim")]
pub mod sim;

pub use error::{Error, Result};
pub use types::*;
pub use config::{CoordinatorConfig, OverlayStyle, RetryPolicy, SecureSurfacePolicy};
pub use drm::{DrmConfig, DrmHandle, DrmParams, DrmScheme, DrmSessionManager, HttpDrmSessionManager};
pub use resolver::{MediaSourceResolver, PlatformCapabilities, ResolveWarning, ResolvedSource, SourceConfig};
pub use pipeline::{EventSink, Pipeline, PipelineFactory};
pub use session::{PlaybackSession, SessionNotice};
pub use reveal::{OverlayRevealCoordinator, RevealEffect, RevealInput};
pub use timer::RepeatingTimer;
pub use surface::{PresentationSurface, SlotState, TracingSurface};
pub use lifecycle::{ActivityLifecycleBinder, LifecycleBoundary, LifecycleSignal, PlaybackRequest, Transition};
#[cfg(feature = "sim")]
pub use sim::{SimProfile, SimulatedPipeline, SimulatedPipelineFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialization
pub fn init() {
    tracing::info!(version = VERSION, "Duet Core initialized");
}
