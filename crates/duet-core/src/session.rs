//! Playback Session - one player pipeline and its state machine
//!
//! Coordinates:
//! - Pipeline lifecycle (create -> prepare -> play -> release)
//! - State transitions driven by pipeline reports
//! - End-of-content looping
//! - Stall retry bookkeeping

use crate::{
    config::RetryPolicy,
    drm::DrmHandle,
    pipeline::{EventSink, Pipeline, PipelineFactory},
    resolver::SourceConfig,
    types::*,
    Error, Result,
};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What a pipeline report means to the owner of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Buffering finished
    Ready,
    /// Went back to buffering while ready
    Rebuffering,
    /// Lost readiness while loading or playing; needs a retry
    Stalled { detail: String },
    /// Restarted from the beginning after end of content
    Looped { completed_plays: u32 },
    /// End of content with no restarts left
    Ended,
}

/// Player session owning a single pipeline
pub struct PlaybackSession {
    /// Unique session ID
    id: SessionId,
    /// Primary or overlay
    role: SessionRole,
    /// Current state
    state: PlaybackState,
    /// Source this session was created for
    config: SourceConfig,
    /// End-of-content behaviour
    repeat: RepeatPolicy,
    /// Stall recovery
    retry: RetryPolicy,
    /// Underlying engine, `None` once released
    pipeline: Option<Box<dyn Pipeline>>,
    /// Listener installed at prepare time
    listener: Option<EventSink>,
    /// Start output as soon as the session is ready
    play_when_ready: bool,
    /// Whether `play` has been issued to the engine
    output_running: bool,
    /// Full plays of the stream so far
    completed_plays: u32,
    /// Retries since last ready
    retry_attempts: u32,
}

impl PlaybackSession {
    /// Allocate a pipeline for `config`; does not start fetching
    pub fn create(
        role: SessionRole,
        config: SourceConfig,
        repeat: RepeatPolicy,
        retry: RetryPolicy,
        factory: &dyn PipelineFactory,
        drm: Option<&DrmHandle>,
    ) -> Result<Self> {
        let mut pipeline = factory.create(role, &config, drm)?;
        pipeline.set_repeat(repeat);

        let id = SessionId::new();
        info!(%role, session_id = %id, locator = %config.locator, content_type = %config.content_type, "Session created");

        Ok(Self {
            id,
            role,
            state: PlaybackState::Idle,
            config,
            repeat,
            retry,
            pipeline: Some(pipeline),
            listener: None,
            play_when_ready: false,
            output_running: false,
            completed_plays: 0,
            retry_attempts: 0,
        })
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Get current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source(&self) -> &SourceConfig {
        &self.config
    }

    pub fn repeat(&self) -> RepeatPolicy {
        self.repeat
    }

    pub fn is_released(&self) -> bool {
        self.state == PlaybackState::Released
    }

    /// Transition to new state
    fn set_state(&mut self, new_state: PlaybackState) -> Result<()> {
        let current = self.state;

        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        self.state = new_state;
        info!(role = %self.role, session_id = %self.id, from = %current, to = %new_state, "State transition");

        Ok(())
    }

    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        if self.is_released() {
            debug!(role = %self.role, operation, "Ignoring call on released session");
            return Err(Error::ReleasedSessionAccess {
                role: self.role,
                operation,
            });
        }
        Ok(())
    }

    fn engine(&mut self, operation: &'static str) -> Result<&mut Box<dyn Pipeline>> {
        let role = self.role;
        self.pipeline
            .as_mut()
            .ok_or(Error::ReleasedSessionAccess { role, operation })
    }

    /// Begin loading; reports are delivered to `events`
    #[instrument(skip(self, events), fields(role = %self.role))]
    pub fn prepare(&mut self, events: EventSink) -> Result<()> {
        self.ensure_live("prepare")?;
        self.set_state(PlaybackState::Buffering)?;
        self.engine("prepare")?.prepare(events.clone());
        self.listener = Some(events);
        Ok(())
    }

    /// Delay before the next retry, or `None` once the policy is exhausted
    pub fn next_retry_delay(&self) -> Option<Duration> {
        self.retry.delay_for(self.retry_attempts + 1)
    }

    /// Re-issue `prepare` after a stall
    pub fn retry(&mut self) -> Result<()> {
        self.ensure_live("retry")?;
        let listener = self.listener.clone().ok_or_else(|| Error::InvalidStateTransition {
            from: self.state.to_string(),
            to: "retry before prepare".into(),
        })?;

        if self.state != PlaybackState::Idle {
            debug!(role = %self.role, state = %self.state, "Retry skipped, session already recovering");
            return Ok(());
        }

        self.retry_attempts += 1;
        warn!(role = %self.role, attempt = self.retry_attempts, "Retrying pipeline");
        self.set_state(PlaybackState::Buffering)?;
        self.output_running = false;
        self.engine("retry")?.prepare(listener);
        Ok(())
    }

    /// Start or resume output; only valid once ready
    pub fn play(&mut self) -> Result<()> {
        self.ensure_live("play")?;
        if self.state != PlaybackState::Ready {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: "playing".into(),
            });
        }

        self.play_when_ready = true;
        if !self.output_running {
            self.engine("play")?.play();
            self.output_running = true;
            info!(role = %self.role, session_id = %self.id, "Playback started");
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_live("pause")?;
        self.play_when_ready = false;
        if self.output_running {
            self.engine("pause")?.pause();
            self.output_running = false;
            info!(role = %self.role, session_id = %self.id, "Playback paused");
        }
        Ok(())
    }

    /// Play now if ready, otherwise as soon as the session becomes ready
    pub fn set_play_when_ready(&mut self, play_when_ready: bool) -> Result<()> {
        self.ensure_live("set_play_when_ready")?;
        if !play_when_ready {
            return self.pause();
        }
        self.play_when_ready = true;
        if self.state == PlaybackState::Ready {
            self.play()?;
        }
        Ok(())
    }

    /// Current position while buffering or ready, otherwise `None`
    pub fn current_position(&self) -> Option<Duration> {
        if self.listener.is_none() || !self.state.has_position() {
            return None;
        }
        self.pipeline.as_ref().map(|p| p.current_position())
    }

    /// Apply a pipeline state report
    pub fn handle_event(&mut self, event: PipelineEvent) -> Result<Option<SessionNotice>> {
        self.ensure_live("handle_event")?;

        match event {
            PipelineEvent::Buffering => {
                if self.state != PlaybackState::Ready {
                    return Ok(None);
                }
                self.set_state(PlaybackState::Buffering)?;
                Ok(Some(SessionNotice::Rebuffering))
            }
            PipelineEvent::Ready => {
                if self.state != PlaybackState::Buffering {
                    return Ok(None);
                }
                self.set_state(PlaybackState::Ready)?;
                self.retry_attempts = 0;
                if self.play_when_ready {
                    self.play()?;
                }
                Ok(Some(SessionNotice::Ready))
            }
            PipelineEvent::Ended => {
                if self.state != PlaybackState::Ready {
                    return Ok(None);
                }
                self.completed_plays += 1;
                if self.repeat.allows_restart(self.completed_plays) {
                    self.engine("loop")?.seek_to(Duration::ZERO);
                    debug!(role = %self.role, completed_plays = self.completed_plays, "Looping from start");
                    Ok(Some(SessionNotice::Looped {
                        completed_plays: self.completed_plays,
                    }))
                } else {
                    self.set_state(PlaybackState::Ended)?;
                    self.output_running = false;
                    Ok(Some(SessionNotice::Ended))
                }
            }
            PipelineEvent::Idle => self.stall("pipeline reported idle".into()),
            PipelineEvent::Error(detail) => self.stall(detail),
        }
    }

    fn stall(&mut self, detail: String) -> Result<Option<SessionNotice>> {
        match self.state {
            PlaybackState::Buffering | PlaybackState::Ready | PlaybackState::Ended => {
                self.set_state(PlaybackState::Idle)?;
                self.output_running = false;
                warn!(role = %self.role, session_id = %self.id, %detail, "Pipeline stalled");
                Ok(Some(SessionNotice::Stalled { detail }))
            }
            _ => Ok(None),
        }
    }

    /// Detach the pipeline; calling it again is a no-op
    pub fn release(&mut self) {
        let Some(mut pipeline) = self.pipeline.take() else {
            debug!(role = %self.role, session_id = %self.id, "Session already released");
            return;
        };

        pipeline.release();
        self.listener = None;
        self.output_running = false;
        self.state = PlaybackState::Released;
        info!(role = %self.role, session_id = %self.id, "Session released");
    }

    /// Immutable view for readers outside the session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            role: self.role,
            state: self.state,
            position: self.current_position(),
            play_when_ready: self.play_when_ready,
            loops_completed: self.completed_plays,
            retry_attempts: self.retry_attempts,
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LoopEvent;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use url::Url;

    #[derive(Debug, Default)]
    struct Calls {
        prepares: u32,
        plays: u32,
        pauses: u32,
        seeks: Vec<Duration>,
        releases: u32,
        position: Duration,
    }

    struct FakePipeline(Arc<Mutex<Calls>>);

    impl Pipeline for FakePipeline {
        fn prepare(&mut self, _events: EventSink) {
            self.0.lock().unwrap().prepares += 1;
        }
        fn play(&mut self) {
            self.0.lock().unwrap().plays += 1;
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().pauses += 1;
        }
        fn seek_to(&mut self, position: Duration) {
            self.0.lock().unwrap().seeks.push(position);
        }
        fn set_repeat(&mut self, _policy: RepeatPolicy) {}
        fn current_position(&self) -> Duration {
            self.0.lock().unwrap().position
        }
        fn release(&mut self) {
            self.0.lock().unwrap().releases += 1;
        }
    }

    struct FakeFactory(Arc<Mutex<Calls>>);

    impl PipelineFactory for FakeFactory {
        fn create(
            &self,
            _role: SessionRole,
            _config: &SourceConfig,
            _drm: Option<&DrmHandle>,
        ) -> Result<Box<dyn Pipeline>> {
            Ok(Box::new(FakePipeline(self.0.clone())))
        }
    }

    fn session(repeat: RepeatPolicy) -> (PlaybackSession, Arc<Mutex<Calls>>, mpsc::UnboundedReceiver<LoopEvent>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let factory = FakeFactory(calls.clone());
        let config = SourceConfig::progressive(Url::parse("file:///clip.mp4").unwrap());
        let mut session = PlaybackSession::create(
            SessionRole::Overlay,
            config,
            repeat,
            RetryPolicy::default(),
            &factory,
            None,
        )
        .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        session.prepare(EventSink::new(SessionRole::Overlay, 1, tx)).unwrap();
        (session, calls, rx)
    }

    #[test]
    fn test_session_creation() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let factory = FakeFactory(calls);
        let config = SourceConfig::progressive(Url::parse("file:///clip.mp4").unwrap());
        let session = PlaybackSession::create(
            SessionRole::Primary,
            config,
            RepeatPolicy::RepeatAll,
            RetryPolicy::default(),
            &factory,
            None,
        )
        .unwrap();

        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.current_position(), None);
    }

    #[test]
    fn test_ready_then_play() {
        let (mut session, calls, _rx) = session(RepeatPolicy::None);
        assert_eq!(session.state(), PlaybackState::Buffering);
        assert!(session.play().is_err());

        let notice = session.handle_event(PipelineEvent::Ready).unwrap();
        assert_eq!(notice, Some(SessionNotice::Ready));
        session.play().unwrap();
        session.play().unwrap();
        assert_eq!(calls.lock().unwrap().plays, 1);
        assert!(session.snapshot().is_playing());
    }

    #[test]
    fn test_play_when_ready_defers_until_ready() {
        let (mut session, calls, _rx) = session(RepeatPolicy::None);
        session.set_play_when_ready(true).unwrap();
        assert_eq!(calls.lock().unwrap().plays, 0);

        session.handle_event(PipelineEvent::Ready).unwrap();
        assert_eq!(calls.lock().unwrap().plays, 1);
    }

    #[test]
    fn test_loop_n_restarts_until_count() {
        let (mut session, calls, _rx) = session(RepeatPolicy::LoopN(2));
        session.handle_event(PipelineEvent::Ready).unwrap();

        let first = session.handle_event(PipelineEvent::Ended).unwrap();
        assert_eq!(first, Some(SessionNotice::Looped { completed_plays: 1 }));
        assert_eq!(session.state(), PlaybackState::Ready);
        assert_eq!(calls.lock().unwrap().seeks, vec![Duration::ZERO]);

        let second = session.handle_event(PipelineEvent::Ended).unwrap();
        assert_eq!(second, Some(SessionNotice::Ended));
        assert_eq!(session.state(), PlaybackState::Ended);
    }

    #[test]
    fn test_stall_and_retry() {
        let (mut session, calls, _rx) = session(RepeatPolicy::None);
        let notice = session.handle_event(PipelineEvent::Idle).unwrap();
        assert!(matches!(notice, Some(SessionNotice::Stalled { .. })));
        assert_eq!(session.state(), PlaybackState::Idle);

        assert_eq!(session.next_retry_delay(), Some(Duration::from_millis(250)));
        session.retry().unwrap();
        assert_eq!(session.state(), PlaybackState::Buffering);
        assert_eq!(calls.lock().unwrap().prepares, 2);
        assert_eq!(session.snapshot().retry_attempts, 1);

        session.handle_event(PipelineEvent::Ready).unwrap();
        assert_eq!(session.snapshot().retry_attempts, 0);
    }

    #[test]
    fn test_position_only_while_buffering_or_ready() {
        let (mut session, calls, _rx) = session(RepeatPolicy::None);
        calls.lock().unwrap().position = Duration::from_millis(1_500);
        assert_eq!(session.current_position(), Some(Duration::from_millis(1_500)));

        session.handle_event(PipelineEvent::Ready).unwrap();
        assert_eq!(session.snapshot().position, Some(Duration::from_millis(1_500)));

        session.handle_event(PipelineEvent::Ended).unwrap();
        assert_eq!(session.state(), PlaybackState::Ended);
        assert_eq!(session.current_position(), None);

        session.handle_event(PipelineEvent::Idle).unwrap();
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.current_position(), None);
    }

    #[test]
    fn test_rebuffering_while_ready() {
        let (mut session, _calls, _rx) = session(RepeatPolicy::None);
        assert_eq!(session.handle_event(PipelineEvent::Buffering).unwrap(), None);

        session.handle_event(PipelineEvent::Ready).unwrap();
        let notice = session.handle_event(PipelineEvent::Buffering).unwrap();
        assert_eq!(notice, Some(SessionNotice::Rebuffering));
        assert_eq!(session.state(), PlaybackState::Buffering);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (mut session, calls, _rx) = session(RepeatPolicy::None);
        session.release();
        session.release();

        assert_eq!(calls.lock().unwrap().releases, 1);
        assert_eq!(session.state(), PlaybackState::Released);
        assert_eq!(session.current_position(), None);
        assert!(matches!(
            session.play(),
            Err(Error::ReleasedSessionAccess { .. })
        ));
        assert!(matches!(
            session.handle_event(PipelineEvent::Ready),
            Err(Error::ReleasedSessionAccess { .. })
        ));
    }

    #[test]
    fn test_drop_releases_pipeline() {
        let (session, calls, _rx) = session(RepeatPolicy::None);
        drop(session);
        assert_eq!(calls.lock().unwrap().releases, 1);
    }
}
