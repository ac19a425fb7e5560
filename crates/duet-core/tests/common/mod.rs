//! Recording collaborators for driving the lifecycle binder in tests

#![allow(dead_code)]

use async_trait::async_trait;
use duet_core::{
    ActivityLifecycleBinder, CoordinatorConfig, DrmConfig, DrmHandle, DrmScheme,
    DrmSessionManager, Error, EventSink, Pipeline, PipelineEvent, PipelineFactory,
    PlatformCapabilities, PlaybackRequest, PresentationSurface, RepeatPolicy, Result, SessionId,
    SessionRole, SourceConfig,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything a pipeline has been asked to do
#[derive(Debug, Default)]
pub struct RecorderState {
    pub prepares: u32,
    pub plays: u32,
    pub pauses: u32,
    pub seeks: Vec<Duration>,
    pub releases: u32,
    pub repeat: Option<RepeatPolicy>,
    pub position: Duration,
    pub sink: Option<EventSink>,
    pub source: Option<SourceConfig>,
    pub drm: Option<DrmScheme>,
}

/// Test-side handle to one recording pipeline
#[derive(Debug, Clone, Default)]
pub struct Recorder(pub Arc<Mutex<RecorderState>>);

impl Recorder {
    pub fn state(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.0.lock().unwrap()
    }

    /// Deliver a report through the listener installed at prepare time
    pub fn emit(&self, event: PipelineEvent) {
        let sink = self.state().sink.clone().expect("pipeline was never prepared");
        sink.emit(event);
    }

    pub fn set_position(&self, ms: u64) {
        self.state().position = Duration::from_millis(ms);
    }

    pub fn prepares(&self) -> u32 {
        self.state().prepares
    }

    pub fn plays(&self) -> u32 {
        self.state().plays
    }

    pub fn releases(&self) -> u32 {
        self.state().releases
    }
}

struct RecordingPipeline(Recorder);

impl Pipeline for RecordingPipeline {
    fn prepare(&mut self, events: EventSink) {
        let mut state = self.0.state();
        state.prepares += 1;
        state.sink = Some(events);
    }

    fn play(&mut self) {
        self.0.state().plays += 1;
    }

    fn pause(&mut self) {
        self.0.state().pauses += 1;
    }

    fn seek_to(&mut self, position: Duration) {
        let mut state = self.0.state();
        state.seeks.push(position);
        state.position = position;
    }

    fn set_repeat(&mut self, policy: RepeatPolicy) {
        self.0.state().repeat = Some(policy);
    }

    fn current_position(&self) -> Duration {
        self.0.state().position
    }

    fn release(&mut self) {
        self.0.state().releases += 1;
    }
}

/// Factory remembering every pipeline it allocated
#[derive(Default)]
pub struct RecordingFactory {
    created: Mutex<Vec<(SessionRole, Recorder)>>,
}

impl RecordingFactory {
    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn count(&self, role: SessionRole) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }

    /// Most recently allocated pipeline for `role`
    pub fn latest(&self, role: SessionRole) -> Recorder {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| *r == role)
            .map(|(_, recorder)| recorder.clone())
            .expect("no pipeline created for role")
    }

    pub fn all(&self) -> Vec<(SessionRole, Recorder)> {
        self.created.lock().unwrap().clone()
    }
}

impl PipelineFactory for RecordingFactory {
    fn create(
        &self,
        role: SessionRole,
        config: &SourceConfig,
        drm: Option<&DrmHandle>,
    ) -> Result<Box<dyn Pipeline>> {
        let recorder = Recorder::default();
        {
            let mut state = recorder.state();
            state.source = Some(config.clone());
            state.drm = drm.map(|h| h.scheme);
        }
        self.created.lock().unwrap().push((role, recorder.clone()));
        Ok(Box::new(RecordingPipeline(recorder)))
    }
}

/// One call made on the presentation surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Attach(SessionRole, SessionId),
    Detach(SessionRole),
    Visible(SessionRole, bool),
    Offset(SessionRole, f32, f32),
    Opacity(SessionRole, f32),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSurface(pub Arc<Mutex<Vec<SurfaceCall>>>);

impl RecordingSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &SurfaceCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn overlay_shown(&self) -> usize {
        self.count(&SurfaceCall::Visible(SessionRole::Overlay, true))
    }
}

impl PresentationSurface for RecordingSurface {
    fn attach(&mut self, slot: SessionRole, session: SessionId) {
        self.0.lock().unwrap().push(SurfaceCall::Attach(slot, session));
    }

    fn detach(&mut self, slot: SessionRole) {
        self.0.lock().unwrap().push(SurfaceCall::Detach(slot));
    }

    fn set_visible(&mut self, slot: SessionRole, visible: bool) {
        self.0.lock().unwrap().push(SurfaceCall::Visible(slot, visible));
    }

    fn set_offset(&mut self, slot: SessionRole, x: f32, y: f32) {
        self.0.lock().unwrap().push(SurfaceCall::Offset(slot, x, y));
    }

    fn set_opacity(&mut self, slot: SessionRole, opacity: f32) {
        self.0.lock().unwrap().push(SurfaceCall::Opacity(slot, opacity));
    }
}

/// DRM manager that opens sessions locally or fails on demand
#[derive(Default)]
pub struct StubDrm {
    pub fail_with_license_error: bool,
}

#[async_trait]
impl DrmSessionManager for StubDrm {
    async fn acquire(&self, config: &DrmConfig) -> Result<DrmHandle> {
        if self.fail_with_license_error {
            return Err(Error::license("license server unreachable"));
        }
        Ok(DrmHandle {
            id: uuid::Uuid::new_v4(),
            scheme: config.scheme,
            license_url: config.license_url.clone(),
            license_headers: config.license_headers.clone(),
        })
    }
}

/// Binder wired to recording collaborators
pub struct Harness {
    pub binder: ActivityLifecycleBinder,
    pub factory: Arc<RecordingFactory>,
    pub surface: RecordingSurface,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(CoordinatorConfig::default(), PlatformCapabilities::default(), StubDrm::default())
    }

    pub fn build(config: CoordinatorConfig, capabilities: PlatformCapabilities, drm: StubDrm) -> Self {
        let factory = Arc::new(RecordingFactory::default());
        let surface = RecordingSurface::default();
        let binder = ActivityLifecycleBinder::new(
            config,
            capabilities,
            factory.clone(),
            Arc::new(drm),
            Box::new(surface.clone()),
        )
        .unwrap();
        Self {
            binder,
            factory,
            surface,
        }
    }

    pub fn with_request(mut self, request: PlaybackRequest) -> Self {
        self.binder = self.binder.with_request(request);
        self
    }

    pub fn primary(&self) -> Recorder {
        self.factory.latest(SessionRole::Primary)
    }

    pub fn overlay(&self) -> Recorder {
        self.factory.latest(SessionRole::Overlay)
    }

    /// Process loop events for `ms` of (paused) time
    pub async fn run_ms(&mut self, ms: u64) {
        self.binder
            .run_for(Duration::from_millis(ms))
            .await
            .unwrap();
    }
}
