//! Core types for Duet

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two concurrent sessions a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Main content selected by the caller
    Primary,
    /// Short looping clip revealed after the threshold
    Overlay,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Primary => write!(f, "primary"),
            SessionRole::Overlay => write!(f, "overlay"),
        }
    }
}

/// Pipeline variant selected for a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Segmented manifest (DASH)
    Segmented,
    /// Single progressive container file
    Progressive,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Segmented => write!(f, "segmented"),
            ContentType::Progressive => write!(f, "progressive"),
        }
    }
}

/// How a session behaves when its stream reaches end of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Play once, then report ended
    None,
    /// Restart from the beginning indefinitely
    RepeatAll,
    /// Play the stream this many times in total
    LoopN(u32),
}

impl RepeatPolicy {
    /// Whether playback restarts after `completed_plays` full plays
    pub fn allows_restart(&self, completed_plays: u32) -> bool {
        match self {
            RepeatPolicy::None => false,
            RepeatPolicy::RepeatAll => true,
            RepeatPolicy::LoopN(count) => completed_plays < *count,
        }
    }
}

/// Player session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Pipeline allocated, nothing fetched; also entered on stall or error
    Idle,
    /// Loading content
    Buffering,
    /// Enough content buffered to play
    Ready,
    /// End of content reached with no restarts left
    Ended,
    /// Pipeline detached; terminal
    Released,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Buffering) | (Idle, Released) |
            // From Buffering
            (Buffering, Ready) | (Buffering, Idle) | (Buffering, Released) |
            // From Ready
            (Ready, Buffering) | (Ready, Ended) | (Ready, Idle) | (Ready, Released) |
            // From Ended
            (Ended, Buffering) | (Ended, Idle) | (Ended, Released)
        )
    }

    /// Whether a position can be read in this state
    pub fn has_position(&self) -> bool {
        matches!(self, PlaybackState::Buffering | PlaybackState::Ready)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Released => write!(f, "released"),
        }
    }
}

/// Asynchronous state report delivered by a pipeline engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Buffering,
    Ready,
    Ended,
    Idle,
    Error(String),
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::Buffering => write!(f, "buffering"),
            PipelineEvent::Ready => write!(f, "ready"),
            PipelineEvent::Ended => write!(f, "ended"),
            PipelineEvent::Idle => write!(f, "idle"),
            PipelineEvent::Error(detail) => write!(f, "error({})", detail),
        }
    }
}

/// Overlay reveal progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealState {
    /// Overlay not yet ready
    Waiting,
    /// Overlay ready, primary below the threshold
    Armed,
    /// Overlay shown and playing; terminal
    Revealed,
}

impl std::fmt::Display for RevealState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevealState::Waiting => write!(f, "waiting"),
            RevealState::Armed => write!(f, "armed"),
            RevealState::Revealed => write!(f, "revealed"),
        }
    }
}

/// Immutable view of a session, handed out instead of references into it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub role: SessionRole,
    pub state: PlaybackState,
    /// `None` before `prepare` and after release
    pub position: Option<Duration>,
    pub play_when_ready: bool,
    /// Completed end-of-content restarts
    pub loops_completed: u32,
    /// Retries issued since the session was last ready
    pub retry_attempts: u32,
}

impl SessionSnapshot {
    /// Whether output is actually running
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Ready && self.play_when_ready
    }
}
