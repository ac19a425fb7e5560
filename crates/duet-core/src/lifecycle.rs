//! Activity lifecycle binding
//!
//! Owns the session pair for one foreground interval and runs the event
//! loop that feeds pipeline reports and sampler ticks into the sessions and
//! the reveal coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   ActivityLifecycleBinder                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  enter ──► resolve ──► DRM ──► create/prepare sessions ──► sampler │
//! │                                                                  │
//! │  ┌─────────────┐  reports   ┌────────────┐  reports  ┌──────────┐ │
//! │  │  Primary    │──────────► │ event loop │ ◄─────────│ Overlay  │ │
//! │  │  session    │            │ (mpsc)     │           │ session  │ │
//! │  └─────────────┘            └─────┬──────┘           └──────────┘ │
//! │         ▲ position snapshot       │ ticks ▲                       │
//! │         └─────────────────────────┤       │                       │
//! │                          ┌────────┴─────┐ ┌┴───────────────┐      │
//! │                          │   Reveal     │ │ RepeatingTimer │      │
//! │                          │ coordinator  │ │ (cancellable)  │      │
//! │                          └──────────────┘ └────────────────┘      │
//! │  exit ──► cancel scope token ──► detach surfaces ──► release      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every loop event carries the generation of the foreground interval that
//! produced it; events from an interval that has already been torn down
//! are dropped without touching any session.

use crate::{
    config::CoordinatorConfig,
    drm::{DrmHandle, DrmParams, DrmSessionManager},
    pipeline::{EventSink, PipelineFactory},
    resolver::{MediaSourceResolver, PlatformCapabilities, ResolveWarning},
    reveal::{OverlayRevealCoordinator, RevealEffect, RevealInput},
    session::{PlaybackSession, SessionNotice},
    surface::PresentationSurface,
    timer::RepeatingTimer,
    types::*,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use url::Url;

/// Which pair of host signals delimits a foreground interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleBoundary {
    /// Start / stop: sessions survive while visible but not interactive
    Visibility,
    /// Resume / pause
    Interactivity,
}

/// Physical lifecycle signal delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleSignal {
    Start,
    Resume,
    Pause,
    Stop,
}

/// Logical foreground transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

impl LifecycleBoundary {
    /// Map a physical signal to a logical transition
    pub fn transition_for(&self, signal: LifecycleSignal) -> Option<Transition> {
        match (self, signal) {
            (LifecycleBoundary::Visibility, LifecycleSignal::Start) => Some(Transition::Enter),
            // Resume re-enters only if nothing is live; enter is idempotent.
            (LifecycleBoundary::Visibility, LifecycleSignal::Resume) => Some(Transition::Enter),
            (LifecycleBoundary::Visibility, LifecycleSignal::Stop) => Some(Transition::Exit),
            (LifecycleBoundary::Interactivity, LifecycleSignal::Resume) => Some(Transition::Enter),
            (LifecycleBoundary::Interactivity, LifecycleSignal::Pause) => Some(Transition::Exit),
            _ => None,
        }
    }
}

/// Primary content request from the launch parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    /// `None` plays the configured default asset
    pub locator: Option<Url>,
    /// Explicit extension / content-type hint
    pub type_hint: Option<String>,
    pub drm: Option<DrmParams>,
}

/// Message processed by the event loop
#[derive(Debug)]
pub(crate) struct LoopEvent {
    pub(crate) generation: u64,
    pub(crate) kind: LoopEventKind,
}

#[derive(Debug)]
pub(crate) enum LoopEventKind {
    Pipeline { role: SessionRole, event: PipelineEvent },
    Sample,
    RetryDue { role: SessionRole },
}

/// Everything allocated for one foreground interval
struct ForegroundScope {
    generation: u64,
    token: CancellationToken,
    primary: PlaybackSession,
    overlay: Option<PlaybackSession>,
    coordinator: Option<OverlayRevealCoordinator>,
    sampler: Option<RepeatingTimer>,
    /// Set while a sample is queued; the sampler skips ticks until it is consumed
    sample_pending: Arc<AtomicBool>,
    _drm: Option<DrmHandle>,
}

impl ForegroundScope {
    fn session_mut(&mut self, role: SessionRole) -> Option<&mut PlaybackSession> {
        match role {
            SessionRole::Primary => Some(&mut self.primary),
            SessionRole::Overlay => self.overlay.as_mut(),
        }
    }

    fn stop_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
            debug!(generation = self.generation, "Position sampler stopped");
        }
    }

    /// Drop the overlay half without touching the primary
    fn drop_overlay(&mut self, surface: &mut dyn PresentationSurface) {
        self.stop_sampler();
        self.coordinator = None;
        if let Some(mut overlay) = self.overlay.take() {
            surface.set_visible(SessionRole::Overlay, false);
            surface.detach(SessionRole::Overlay);
            overlay.release();
        }
    }

    fn teardown(mut self, surface: &mut dyn PresentationSurface) {
        self.token.cancel();
        self.drop_overlay(surface);
        surface.detach(SessionRole::Primary);
        self.primary.release();
    }
}

/// Maps host foreground/background signals onto session creation and teardown
pub struct ActivityLifecycleBinder {
    config: CoordinatorConfig,
    resolver: MediaSourceResolver,
    boundary: LifecycleBoundary,
    factory: Arc<dyn PipelineFactory>,
    drm: Arc<dyn DrmSessionManager>,
    surface: Box<dyn PresentationSurface>,
    request: PlaybackRequest,
    scope: Option<ForegroundScope>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
    reveal_tx: watch::Sender<RevealState>,
}

impl ActivityLifecycleBinder {
    /// Create a binder; the lifecycle boundary follows the platform capabilities
    pub fn new(
        config: CoordinatorConfig,
        capabilities: PlatformCapabilities,
        factory: Arc<dyn PipelineFactory>,
        drm: Arc<dyn DrmSessionManager>,
        surface: Box<dyn PresentationSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reveal_tx, _) = watch::channel(RevealState::Waiting);

        Ok(Self {
            resolver: MediaSourceResolver::new(capabilities, config.secure_surface_policy),
            boundary: capabilities.lifecycle_boundary(),
            config,
            factory,
            drm,
            surface,
            request: PlaybackRequest::default(),
            scope: None,
            generation: 0,
            events_tx,
            events_rx,
            reveal_tx,
        })
    }

    /// Set the primary content used from the next foreground entry on
    pub fn with_request(mut self, request: PlaybackRequest) -> Self {
        self.request = request;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn boundary(&self) -> LifecycleBoundary {
        self.boundary
    }

    pub fn is_foreground(&self) -> bool {
        self.scope.is_some()
    }

    /// Foreground intervals started so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reveal state of the current interval, `None` without an overlay
    pub fn reveal_state(&self) -> Option<RevealState> {
        self.scope
            .as_ref()
            .and_then(|scope| scope.coordinator.as_ref())
            .map(|c| c.state())
    }

    /// Subscribe to reveal state changes
    pub fn subscribe_reveal(&self) -> watch::Receiver<RevealState> {
        self.reveal_tx.subscribe()
    }

    pub fn snapshot(&self, role: SessionRole) -> Option<SessionSnapshot> {
        let scope = self.scope.as_ref()?;
        match role {
            SessionRole::Primary => Some(scope.primary.snapshot()),
            SessionRole::Overlay => scope.overlay.as_ref().map(|s| s.snapshot()),
        }
    }

    /// Whether the position sampler of the current interval is running
    pub fn is_sampling(&self) -> bool {
        self.scope
            .as_ref()
            .and_then(|scope| scope.sampler.as_ref())
            .is_some_and(|sampler| !sampler.is_cancelled())
    }

    /// Loop events waiting to be processed
    pub fn queued_events(&self) -> usize {
        self.events_rx.len()
    }

    /// Apply a physical lifecycle signal
    pub async fn on_lifecycle(&mut self, signal: LifecycleSignal) -> Result<Vec<ResolveWarning>> {
        match self.boundary.transition_for(signal) {
            Some(Transition::Enter) => self.enter_foreground().await,
            Some(Transition::Exit) => {
                self.exit_foreground();
                Ok(Vec::new())
            }
            None => {
                debug!(?signal, boundary = ?self.boundary, "Lifecycle signal ignored");
                Ok(Vec::new())
            }
        }
    }

    /// Create and prepare the session pair; a no-op while already in foreground
    #[instrument(skip(self), fields(generation = self.generation + 1))]
    pub async fn enter_foreground(&mut self) -> Result<Vec<ResolveWarning>> {
        if self.scope.is_some() {
            debug!("Already in foreground, keeping current sessions");
            return Ok(Vec::new());
        }

        let generation = self.generation + 1;
        let locator = self
            .request
            .locator
            .clone()
            .unwrap_or_else(|| self.config.default_primary_locator.clone());

        let resolved = self.resolver.resolve(
            &locator,
            self.request.type_hint.as_deref(),
            self.request.drm.as_ref(),
        )?;

        let drm = match &resolved.config.drm {
            Some(drm_config) => Some(self.drm.acquire(drm_config).await?),
            None => None,
        };

        let mut primary = PlaybackSession::create(
            SessionRole::Primary,
            resolved.config,
            self.config.primary_repeat,
            self.config.retry.clone(),
            self.factory.as_ref(),
            drm.as_ref(),
        )?;
        primary.set_play_when_ready(true)?;
        primary.prepare(EventSink::new(SessionRole::Primary, generation, self.events_tx.clone()))?;

        // Nothing is allocated on the error paths above; the generation is
        // only consumed once the primary exists.
        self.generation = generation;
        self.surface.attach(SessionRole::Primary, primary.id());

        let overlay = match self.create_overlay(generation) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Overlay setup failed, continuing without overlay");
                None
            }
        };

        let token = CancellationToken::new();
        let sample_pending = Arc::new(AtomicBool::new(false));
        let (coordinator, sampler) = match &overlay {
            Some(overlay) => {
                let style = self.config.overlay_style;
                self.surface.set_visible(SessionRole::Overlay, false);
                self.surface.set_opacity(SessionRole::Overlay, style.opacity);
                self.surface
                    .set_offset(SessionRole::Overlay, style.offset_x, style.offset_y);
                self.surface.attach(SessionRole::Overlay, overlay.id());

                let tx = self.events_tx.clone();
                let pending = sample_pending.clone();
                let sampler = RepeatingTimer::start(self.config.sample_interval(), &token, move || {
                    if pending.swap(true, Ordering::AcqRel) {
                        return true;
                    }
                    tx.send(LoopEvent {
                        generation,
                        kind: LoopEventKind::Sample,
                    })
                    .is_ok()
                });
                (
                    Some(OverlayRevealCoordinator::new(self.config.reveal_threshold())),
                    Some(sampler),
                )
            }
            None => (None, None),
        };

        self.reveal_tx.send_replace(RevealState::Waiting);
        info!(
            generation,
            primary = %primary.id(),
            overlay = overlay.as_ref().map(|o| o.id().to_string()),
            warnings = resolved.warnings.len(),
            "Entered foreground"
        );

        self.scope = Some(ForegroundScope {
            generation,
            token,
            primary,
            overlay,
            coordinator,
            sampler,
            sample_pending,
            _drm: drm,
        });

        Ok(resolved.warnings)
    }

    fn create_overlay(&self, generation: u64) -> Result<PlaybackSession> {
        let resolved = self
            .resolver
            .resolve(&self.config.overlay_locator, None, None)?;
        let mut overlay = PlaybackSession::create(
            SessionRole::Overlay,
            resolved.config,
            self.config.overlay_repeat(),
            self.config.retry.clone(),
            self.factory.as_ref(),
            None,
        )?;
        overlay.prepare(EventSink::new(SessionRole::Overlay, generation, self.events_tx.clone()))?;
        Ok(overlay)
    }

    /// Tear down the session pair; a no-op when nothing is live
    #[instrument(skip(self))]
    pub fn exit_foreground(&mut self) {
        let Some(scope) = self.scope.take() else {
            debug!("No live sessions, ignoring exit");
            return;
        };

        let generation = scope.generation;
        scope.teardown(self.surface.as_mut());
        info!(generation, "Exited foreground");
    }

    /// Process one loop event
    pub(crate) fn dispatch(&mut self, event: LoopEvent) -> Result<()> {
        let Some(scope) = self.scope.as_mut() else {
            debug!(generation = event.generation, "Dropping event, no live sessions");
            return Ok(());
        };
        if event.generation != scope.generation {
            debug!(
                generation = event.generation,
                live = scope.generation,
                "Dropping event from torn-down interval"
            );
            return Ok(());
        }

        let result = match event.kind {
            LoopEventKind::Pipeline { role, event } => self.on_pipeline_event(role, event),
            LoopEventKind::Sample => {
                scope.sample_pending.store(false, Ordering::Release);
                self.on_sample()
            }
            LoopEventKind::RetryDue { role } => self.retry_now(role),
        };

        if let Some(state) = self.reveal_state() {
            self.reveal_tx.send_if_modified(|current| {
                let changed = *current != state;
                *current = state;
                changed
            });
        }
        result
    }

    fn on_pipeline_event(&mut self, role: SessionRole, event: PipelineEvent) -> Result<()> {
        let Some(scope) = self.scope.as_mut() else {
            return Ok(());
        };
        let Some(session) = scope.session_mut(role) else {
            debug!(%role, %event, "Report for a session that no longer exists");
            return Ok(());
        };
        info!(%role, session_id = %session.id(), %event, "Pipeline state report");

        let notice = match session.handle_event(event) {
            Ok(notice) => notice,
            Err(Error::ReleasedSessionAccess { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Some(SessionNotice::Stalled { detail }) = &notice {
            let stall = Error::PipelineStall {
                role,
                detail: detail.clone(),
            };
            debug!(code = stall.error_code(), recoverable = stall.is_recoverable(), "{}", stall);
        }

        match (role, notice) {
            (SessionRole::Primary, Some(SessionNotice::Stalled { .. })) => self.handle_stall(role),
            (SessionRole::Overlay, Some(SessionNotice::Ready)) => {
                self.apply_reveal(RevealInput::OverlayReady)
            }
            (SessionRole::Overlay, Some(SessionNotice::Rebuffering)) => {
                self.apply_reveal(RevealInput::OverlayBuffering)
            }
            (SessionRole::Overlay, Some(SessionNotice::Stalled { .. })) => {
                self.apply_reveal(RevealInput::OverlayStalled)
            }
            (_, Some(SessionNotice::Ended)) => {
                info!(%role, "Playback ended, no restarts left");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_sample(&mut self) -> Result<()> {
        let Some(scope) = self.scope.as_ref() else {
            return Ok(());
        };
        let position = scope.primary.snapshot().position;
        self.apply_reveal(RevealInput::PrimarySample(position))
    }

    fn apply_reveal(&mut self, input: RevealInput) -> Result<()> {
        let effects = match self.scope.as_mut().and_then(|s| s.coordinator.as_mut()) {
            Some(coordinator) => coordinator.handle(input),
            None => return Ok(()),
        };

        for effect in effects {
            match effect {
                RevealEffect::ShowOverlay => {
                    self.surface.set_visible(SessionRole::Overlay, true);
                }
                RevealEffect::PlayOverlay => {
                    if let Some(overlay) = self.scope.as_mut().and_then(|s| s.overlay.as_mut()) {
                        overlay.set_play_when_ready(true)?;
                    }
                }
                RevealEffect::StopSampler => {
                    if let Some(scope) = self.scope.as_mut() {
                        scope.stop_sampler();
                    }
                }
                RevealEffect::RetryOverlay => self.handle_stall(SessionRole::Overlay)?,
            }
        }
        Ok(())
    }

    /// Schedule or issue a retry according to the session's policy
    fn handle_stall(&mut self, role: SessionRole) -> Result<()> {
        let Some(scope) = self.scope.as_mut() else {
            return Ok(());
        };
        let generation = scope.generation;
        let token = scope.token.clone();
        let Some(session) = scope.session_mut(role) else {
            return Ok(());
        };

        let Some(delay) = session.next_retry_delay() else {
            let attempts = session.snapshot().retry_attempts;
            error!(%role, attempts, "Retries exhausted");
            if role == SessionRole::Overlay {
                scope.drop_overlay(self.surface.as_mut());
            }
            return Err(Error::RetriesExhausted { role, attempts });
        };

        if delay.is_zero() {
            return session.retry();
        }

        debug!(%role, delay_ms = delay.as_millis() as u64, "Retry scheduled");
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(LoopEvent {
                        generation,
                        kind: LoopEventKind::RetryDue { role },
                    });
                }
            }
        });
        Ok(())
    }

    fn retry_now(&mut self, role: SessionRole) -> Result<()> {
        let Some(session) = self.scope.as_mut().and_then(|s| s.session_mut(role)) else {
            return Ok(());
        };
        session.retry()
    }

    /// Wait for and process the next loop event
    pub async fn process_next(&mut self) -> Result<()> {
        match self.events_rx.recv().await {
            Some(event) => self.dispatch(event),
            None => Ok(()),
        }
    }

    /// Run the event loop for `duration`, stopping early on the first error
    pub async fn run_for(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                Some(event) = self.events_rx.recv() => self.dispatch(event)?,
            }
        }
    }

    /// Run until the signal channel closes, then leave the foreground.
    ///
    /// Errors are logged; resolution warnings are forwarded to `warnings`.
    pub async fn run(
        &mut self,
        mut signals: mpsc::Receiver<LifecycleSignal>,
        warnings: mpsc::UnboundedSender<ResolveWarning>,
    ) {
        loop {
            tokio::select! {
                signal = signals.recv() => {
                    let Some(signal) = signal else { break };
                    match self.on_lifecycle(signal).await {
                        Ok(found) => {
                            for warning in found {
                                let _ = warnings.send(warning);
                            }
                        }
                        Err(e) => error!(error = %e, code = e.error_code(), ?signal, "Lifecycle transition failed"),
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.dispatch(event) {
                        error!(error = %e, code = e.error_code(), "Event handling failed");
                    }
                }
            }
        }
        self.exit_foreground();
    }
}

impl Drop for ActivityLifecycleBinder {
    fn drop(&mut self) {
        self.exit_foreground();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_boundary_mapping() {
        let boundary = LifecycleBoundary::Visibility;
        assert_eq!(boundary.transition_for(LifecycleSignal::Start), Some(Transition::Enter));
        assert_eq!(boundary.transition_for(LifecycleSignal::Resume), Some(Transition::Enter));
        assert_eq!(boundary.transition_for(LifecycleSignal::Pause), None);
        assert_eq!(boundary.transition_for(LifecycleSignal::Stop), Some(Transition::Exit));
    }

    #[test]
    fn test_interactivity_boundary_mapping() {
        let boundary = LifecycleBoundary::Interactivity;
        assert_eq!(boundary.transition_for(LifecycleSignal::Start), None);
        assert_eq!(boundary.transition_for(LifecycleSignal::Resume), Some(Transition::Enter));
        assert_eq!(boundary.transition_for(LifecycleSignal::Pause), Some(Transition::Exit));
        assert_eq!(boundary.transition_for(LifecycleSignal::Stop), None);
    }
}
