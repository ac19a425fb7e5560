//! Simulated pipeline engine
//!
//! Produces the state reports a real engine would (buffering delay, ready,
//! end of content, optional scripted stall) on the tokio clock, without
//! decoding anything. Used by the CLI and for exercising the coordinator
//! under a paused clock.

use crate::{
    drm::DrmHandle,
    pipeline::{EventSink, Pipeline, PipelineFactory},
    resolver::SourceConfig,
    types::{PipelineEvent, RepeatPolicy, SessionRole},
    Result,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often a running simulated pipeline checks for end of content
const END_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Behaviour of one simulated stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProfile {
    /// Time from prepare to ready (milliseconds)
    pub buffering_ms: u64,
    /// Length of the stream (milliseconds)
    pub content_ms: u64,
    /// Report idle once, this long after the first prepare (milliseconds)
    pub stall_after_ms: Option<u64>,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            buffering_ms: 500,
            content_ms: 600_000,
            stall_after_ms: None,
        }
    }
}

impl SimProfile {
    /// A short clip, like the overlay asset
    pub fn clip() -> Self {
        Self {
            buffering_ms: 1_500,
            content_ms: 8_000,
            stall_after_ms: None,
        }
    }
}

/// Creates simulated pipelines, one profile per role
#[derive(Debug, Clone)]
pub struct SimulatedPipelineFactory {
    primary: SimProfile,
    overlay: SimProfile,
}

impl Default for SimulatedPipelineFactory {
    fn default() -> Self {
        Self::new(SimProfile::default(), SimProfile::clip())
    }
}

impl SimulatedPipelineFactory {
    pub fn new(primary: SimProfile, overlay: SimProfile) -> Self {
        Self { primary, overlay }
    }
}

impl PipelineFactory for SimulatedPipelineFactory {
    fn create(
        &self,
        role: SessionRole,
        config: &SourceConfig,
        drm: Option<&DrmHandle>,
    ) -> Result<Box<dyn Pipeline>> {
        let profile = match role {
            SessionRole::Primary => self.primary.clone(),
            SessionRole::Overlay => self.overlay.clone(),
        };
        debug!(
            %role,
            locator = %config.locator,
            content_type = %config.content_type,
            drm = drm.map(|h| h.scheme.to_string()),
            "Simulated pipeline allocated"
        );
        Ok(Box::new(SimulatedPipeline::new(role, profile)))
    }
}

#[derive(Debug)]
struct SimClock {
    ready: bool,
    play_requested: bool,
    base: Duration,
    running_since: Option<Instant>,
    content: Duration,
    stall_pending: Option<Duration>,
}

impl SimClock {
    fn position(&self) -> Duration {
        let elapsed = self.running_since.map(|t| t.elapsed()).unwrap_or_default();
        (self.base + elapsed).min(self.content)
    }

    fn update_running(&mut self) {
        let should_run = self.ready && self.play_requested;
        match (should_run, self.running_since) {
            (true, None) => self.running_since = Some(Instant::now()),
            (false, Some(_)) => {
                self.base = self.position();
                self.running_since = None;
            }
            _ => {}
        }
    }

    fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
        self.update_running();
    }
}

/// Pipeline driven by the tokio clock
pub struct SimulatedPipeline {
    role: SessionRole,
    profile: SimProfile,
    repeat: RepeatPolicy,
    clock: Arc<Mutex<SimClock>>,
    epoch: Option<CancellationToken>,
}

impl SimulatedPipeline {
    pub fn new(role: SessionRole, profile: SimProfile) -> Self {
        let clock = SimClock {
            ready: false,
            play_requested: false,
            base: Duration::ZERO,
            running_since: None,
            content: Duration::from_millis(profile.content_ms),
            stall_pending: profile.stall_after_ms.map(Duration::from_millis),
        };
        Self {
            role,
            profile,
            repeat: RepeatPolicy::None,
            clock: Arc::new(Mutex::new(clock)),
            epoch: None,
        }
    }

    fn clock(&self) -> MutexGuard<'_, SimClock> {
        lock(&self.clock)
    }

    fn cancel_epoch(&mut self) {
        if let Some(token) = self.epoch.take() {
            token.cancel();
        }
    }
}

fn lock(clock: &Mutex<SimClock>) -> MutexGuard<'_, SimClock> {
    clock.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Pipeline for SimulatedPipeline {
    fn prepare(&mut self, events: EventSink) {
        self.cancel_epoch();
        let stall_after = {
            let mut clock = self.clock();
            clock.set_ready(false);
            clock.stall_pending.take()
        };

        let token = CancellationToken::new();
        self.epoch = Some(token.clone());
        debug!(role = %self.role, repeat = ?self.repeat, "Simulated prepare");

        tokio::spawn(drive(
            events,
            self.clock.clone(),
            token,
            Duration::from_millis(self.profile.buffering_ms),
            stall_after,
        ));
    }

    fn play(&mut self) {
        let mut clock = self.clock();
        clock.play_requested = true;
        clock.update_running();
    }

    fn pause(&mut self) {
        let mut clock = self.clock();
        clock.play_requested = false;
        clock.update_running();
    }

    fn seek_to(&mut self, position: Duration) {
        let mut clock = self.clock();
        clock.base = position.min(clock.content);
        if clock.running_since.is_some() {
            clock.running_since = Some(Instant::now());
        }
    }

    fn set_repeat(&mut self, policy: RepeatPolicy) {
        self.repeat = policy;
    }

    fn current_position(&self) -> Duration {
        self.clock().position()
    }

    fn release(&mut self) {
        self.cancel_epoch();
        let mut clock = self.clock();
        clock.play_requested = false;
        clock.set_ready(false);
        debug!(role = %self.role, "Simulated pipeline released");
    }
}

impl Drop for SimulatedPipeline {
    fn drop(&mut self) {
        self.cancel_epoch();
    }
}

/// One prepare epoch: buffer, report ready, then watch for end of content
async fn drive(
    events: EventSink,
    clock: Arc<Mutex<SimClock>>,
    token: CancellationToken,
    buffering: Duration,
    stall_after: Option<Duration>,
) {
    let stall_at = stall_after.map(|d| Instant::now() + d);
    let far_future = Instant::now() + Duration::from_secs(86_400 * 365);

    events.emit(PipelineEvent::Buffering);
    tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = sleep_until(stall_at.unwrap_or(far_future)), if stall_at.is_some() => {
            events.emit(PipelineEvent::Idle);
            return;
        }
        _ = sleep(buffering) => {}
    }

    lock(&clock).set_ready(true);
    if !events.emit(PipelineEvent::Ready) {
        return;
    }

    let mut ticker = interval(END_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ended_reported = false;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = sleep_until(stall_at.unwrap_or(far_future)), if stall_at.is_some() => {
                lock(&clock).set_ready(false);
                events.emit(PipelineEvent::Idle);
                return;
            }
            _ = ticker.tick() => {
                let at_end = {
                    let clock = lock(&clock);
                    clock.position() >= clock.content
                };
                if at_end && !ended_reported {
                    ended_reported = true;
                    if !events.emit(PipelineEvent::Ended) {
                        return;
                    }
                } else if !at_end {
                    ended_reported = false;
                }
            }
        }
    }
}
