//! Media source resolution
//!
//! Decides which pipeline variant and DRM configuration a locator plays
//! with. Pure decision logic: the same inputs always give the same output.

use crate::config::SecureSurfacePolicy;
use crate::drm::{DrmConfig, DrmParams};
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleBoundary;
use crate::types::ContentType;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Containers the progressive pipeline extracts directly
const PROGRESSIVE_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "m4a", "mkv", "webm", "mov", "mp3", "aac", "ogg", "flac", "wav", "ts", "3gp",
];

/// Segmented formats with no pipeline variant wired up
const UNWIRED_SEGMENTED_EXTENSIONS: &[&str] = &["m3u8", "m3u", "hls", "ism", "isml", "ss"];

/// Immutable pipeline configuration for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub locator: Url,
    pub content_type: ContentType,
    pub drm: Option<DrmConfig>,
}

impl SourceConfig {
    /// Progressive, clear content
    pub fn progressive(locator: Url) -> Self {
        Self {
            locator,
            content_type: ContentType::Progressive,
            drm: None,
        }
    }
}

/// Non-fatal conditions found during resolution, shown to the user upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveWarning {
    /// Protected content will render to an unprotected surface
    SecureSurfaceUnavailable { scheme: String },
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveWarning::SecureSurfaceUnavailable { scheme } => write!(
                f,
                "Protected content extension not supported; playing {} content without a secure surface",
                scheme
            ),
        }
    }
}

/// Resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub config: SourceConfig,
    pub warnings: Vec<ResolveWarning>,
}

/// Runtime capabilities of the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Protected (secure) video output is available
    pub secure_surface: bool,
    /// A DRM framework is available
    pub drm: bool,
    /// Surfaces stay live while visible but not interactive
    pub multi_window: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            secure_surface: true,
            drm: true,
            multi_window: true,
        }
    }
}

impl PlatformCapabilities {
    /// Which lifecycle signals delimit a foreground interval on this platform
    pub fn lifecycle_boundary(&self) -> LifecycleBoundary {
        if self.multi_window {
            LifecycleBoundary::Visibility
        } else {
            LifecycleBoundary::Interactivity
        }
    }
}

/// Chooses the pipeline variant and DRM configuration for a locator
#[derive(Debug, Clone)]
pub struct MediaSourceResolver {
    capabilities: PlatformCapabilities,
    secure_surface_policy: SecureSurfacePolicy,
}

impl MediaSourceResolver {
    pub fn new(capabilities: PlatformCapabilities, secure_surface_policy: SecureSurfacePolicy) -> Self {
        Self {
            capabilities,
            secure_surface_policy,
        }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Resolve a locator, optional type hint and optional DRM parameters
    pub fn resolve(
        &self,
        locator: &Url,
        type_hint: Option<&str>,
        drm: Option<&DrmParams>,
    ) -> Result<ResolvedSource> {
        let content_type = infer_content_type(locator, type_hint)?;
        let mut warnings = Vec::new();

        let drm = match drm {
            Some(params) => {
                if !self.capabilities.drm {
                    return Err(Error::DrmUnsupported {
                        scheme: params.scheme.clone(),
                    });
                }
                let config = DrmConfig::from_params(params)?;
                if !self.capabilities.secure_surface {
                    match self.secure_surface_policy {
                        SecureSurfacePolicy::Fail => return Err(Error::SecureSurfaceUnavailable),
                        SecureSurfacePolicy::WarnAndProceed => {
                            warn!(scheme = %config.scheme, "Secure surface unavailable, continuing");
                            warnings.push(ResolveWarning::SecureSurfaceUnavailable {
                                scheme: config.scheme.to_string(),
                            });
                        }
                    }
                }
                Some(config)
            }
            None => None,
        };

        debug!(locator = %locator, %content_type, drm = drm.is_some(), "Source resolved");

        Ok(ResolvedSource {
            config: SourceConfig {
                locator: locator.clone(),
                content_type,
                drm,
            },
            warnings,
        })
    }
}

/// Classify a locator; an explicit hint wins over the locator's extension
pub fn infer_content_type(locator: &Url, type_hint: Option<&str>) -> Result<ContentType> {
    let hint = type_hint
        .map(|h| h.trim().trim_start_matches('.').to_lowercase())
        .filter(|h| !h.is_empty());
    let extension = hint.clone().or_else(|| path_extension(locator));

    let unsupported = || Error::UnsupportedContentType {
        locator: locator.to_string(),
        hint: type_hint.map(str::to_string),
    };

    match extension.as_deref() {
        None => Ok(ContentType::Progressive),
        Some("mpd") | Some("dash") => Ok(ContentType::Segmented),
        Some(ext) if UNWIRED_SEGMENTED_EXTENSIONS.contains(&ext) => Err(unsupported()),
        Some(ext) if PROGRESSIVE_EXTENSIONS.contains(&ext) => Ok(ContentType::Progressive),
        Some(_) => Err(unsupported()),
    }
}

fn path_extension(locator: &Url) -> Option<String> {
    let file_name = locator.path().rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_detect_dash() {
        let locator = url("https://example.com/manifest.mpd");
        assert_eq!(infer_content_type(&locator, None).unwrap(), ContentType::Segmented);
    }

    #[test]
    fn test_detect_progressive() {
        let locator = url("file:///android_asset/base_video_layer.mp4");
        assert_eq!(infer_content_type(&locator, None).unwrap(), ContentType::Progressive);
        let no_ext = url("https://example.com/watch?v=42");
        assert_eq!(infer_content_type(&no_ext, None).unwrap(), ContentType::Progressive);
    }

    #[test]
    fn test_hint_overrides_extension() {
        let locator = url("https://example.com/stream");
        assert_eq!(
            infer_content_type(&locator, Some(".MPD")).unwrap(),
            ContentType::Segmented
        );
        let mp4 = url("https://example.com/clip.mp4");
        assert_eq!(infer_content_type(&mp4, Some("mpd")).unwrap(), ContentType::Segmented);
    }

    #[test]
    fn test_unwired_and_unknown_types_fail() {
        let hls = url("https://example.com/master.m3u8");
        assert!(matches!(
            infer_content_type(&hls, None),
            Err(Error::UnsupportedContentType { .. })
        ));
        let odd = url("https://example.com/file.xyz");
        assert!(matches!(
            infer_content_type(&odd, None),
            Err(Error::UnsupportedContentType { .. })
        ));
        let hinted = url("https://example.com/file.mp4");
        assert!(matches!(
            infer_content_type(&hinted, Some("ism")),
            Err(Error::UnsupportedContentType { .. })
        ));
    }

    #[test]
    fn test_lifecycle_boundary_from_capabilities() {
        let modern = PlatformCapabilities::default();
        assert_eq!(modern.lifecycle_boundary(), LifecycleBoundary::Visibility);
        let legacy = PlatformCapabilities {
            multi_window: false,
            ..Default::default()
        };
        assert_eq!(legacy.lifecycle_boundary(), LifecycleBoundary::Interactivity);
    }
}
