//! Coordinator configuration

use crate::error::{Error, Result};
use crate::types::RepeatPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// What to do when DRM is requested but no secure surface exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecureSurfacePolicy {
    /// Record a warning and continue without secure output
    WarnAndProceed,
    /// Abort resolution with `SecureSurfaceUnavailable`
    Fail,
}

/// Stall recovery policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum retries before giving up (None = retry forever)
    pub max_attempts: Option<u32>,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor applied per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, forever
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff_ms.max(self.initial_backoff_ms) as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

/// Placement of the overlay container over the primary video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub opacity: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            opacity: 0.6,
            offset_x: 100.0,
            offset_y: 100.0,
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Primary position at which the overlay may be revealed (milliseconds)
    pub reveal_threshold_ms: u64,
    /// Period of the primary position sampler (milliseconds)
    pub sample_interval_ms: u64,
    /// Total plays of the overlay clip
    pub overlay_loop_count: u32,
    /// Repeat behaviour of the primary stream
    pub primary_repeat: RepeatPolicy,
    /// Overlay placement
    pub overlay_style: OverlayStyle,
    /// Stall recovery
    pub retry: RetryPolicy,
    /// Handling of DRM requests without a secure surface
    pub secure_surface_policy: SecureSurfacePolicy,
    /// Clip played in the overlay
    pub overlay_locator: Url,
    /// Primary content used when the launch request names none
    pub default_primary_locator: Url,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reveal_threshold_ms: 60_000,
            sample_interval_ms: 5,
            overlay_loop_count: 300,
            primary_repeat: RepeatPolicy::RepeatAll,
            overlay_style: OverlayStyle::default(),
            retry: RetryPolicy::default(),
            secure_surface_policy: SecureSurfacePolicy::WarnAndProceed,
            overlay_locator: bundled_asset("overlay_video_layer.mp4"),
            default_primary_locator: bundled_asset("base_video_layer.mp4"),
        }
    }
}

impl CoordinatorConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(Error::InvalidConfig("sample_interval_ms must be > 0".into()));
        }
        if self.overlay_loop_count == 0 {
            return Err(Error::InvalidConfig("overlay_loop_count must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.overlay_style.opacity) {
            return Err(Error::InvalidConfig(format!(
                "overlay opacity {} outside 0..=1",
                self.overlay_style.opacity
            )));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::InvalidConfig("retry multiplier must be >= 1".into()));
        }
        Ok(())
    }

    pub fn reveal_threshold(&self) -> Duration {
        Duration::from_millis(self.reveal_threshold_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn overlay_repeat(&self) -> RepeatPolicy {
        RepeatPolicy::LoopN(self.overlay_loop_count)
    }
}

fn bundled_asset(name: &str) -> Url {
    Url::parse(&format!("file:///android_asset/{}", name))
        .expect("bundled asset names are valid URL paths")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.reveal_threshold(), Duration::from_secs(60));
        assert_eq!(config.sample_interval(), Duration::from_millis(5));
        assert_eq!(config.overlay_repeat(), RepeatPolicy::LoopN(300));
        assert_eq!(config.primary_repeat, RepeatPolicy::RepeatAll);
        assert_eq!(
            config.overlay_locator.as_str(),
            "file:///android_asset/overlay_video_layer.mp4"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{ "reveal_threshold_ms": 1500 }"#).unwrap();
        assert_eq!(config.reveal_threshold_ms, 1500);
        assert_eq!(config.sample_interval_ms, 5);
        assert_eq!(config.overlay_style.opacity, 0.6);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = CoordinatorConfig {
            sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_retry_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(4000)));
        assert_eq!(policy.delay_for(6), None);

        let capped = RetryPolicy {
            max_attempts: None,
            ..Default::default()
        };
        assert_eq!(capped.delay_for(20), Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_unbounded_retry_is_immediate() {
        let policy = RetryPolicy::unbounded();
        assert_eq!(policy.delay_for(1), Some(Duration::ZERO));
        assert_eq!(policy.delay_for(10_000), Some(Duration::ZERO));
    }
}
