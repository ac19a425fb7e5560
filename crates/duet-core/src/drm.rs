//! DRM - scheme resolution and license session handles
//!
//! The coordinator never speaks a license protocol itself. It resolves the
//! launch parameters into a [`DrmConfig`], asks a [`DrmSessionManager`] for an
//! opaque [`DrmHandle`], and threads that handle into pipeline creation.
//!
//! ```text
//!  (scheme, license url) ──► DrmConfig ──► DrmSessionManager::acquire ──► DrmHandle ──► Pipeline
//! ```

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const WIDEVINE_UUID: Uuid = Uuid::from_u128(0xedef8ba9_79d6_4ace_a3c8_27dcd51d21ed);
const PLAYREADY_UUID: Uuid = Uuid::from_u128(0x9a04f079_9840_4286_ab92_e65be0885f95);
const CLEARKEY_UUID: Uuid = Uuid::from_u128(0xe2719d58_a985_b3c9_781a_b030af78d30e);

/// DRM system types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrmScheme {
    Widevine,
    PlayReady,
    ClearKey,
}

impl DrmScheme {
    /// Returns the system ID used in protection headers
    pub fn system_id(&self) -> Uuid {
        match self {
            DrmScheme::Widevine => WIDEVINE_UUID,
            DrmScheme::PlayReady => PLAYREADY_UUID,
            DrmScheme::ClearKey => CLEARKEY_UUID,
        }
    }

    /// Look up a scheme by well-known name or by system ID
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier.trim().to_lowercase().as_str() {
            "widevine" => Some(DrmScheme::Widevine),
            "playready" => Some(DrmScheme::PlayReady),
            "clearkey" => Some(DrmScheme::ClearKey),
            other => {
                let id = Uuid::parse_str(other).ok()?;
                [DrmScheme::Widevine, DrmScheme::PlayReady, DrmScheme::ClearKey]
                    .into_iter()
                    .find(|scheme| scheme.system_id() == id)
            }
        }
    }
}

impl std::fmt::Display for DrmScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrmScheme::Widevine => write!(f, "widevine"),
            DrmScheme::PlayReady => write!(f, "playready"),
            DrmScheme::ClearKey => write!(f, "clearkey"),
        }
    }
}

/// Unresolved DRM launch parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmParams {
    /// Scheme name (`widevine`, ...) or system UUID
    pub scheme: String,
    /// License server endpoint
    pub license_url: String,
}

impl DrmParams {
    pub fn new(scheme: impl Into<String>, license_url: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            license_url: license_url.into(),
        }
    }
}

/// Resolved DRM configuration for a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmConfig {
    pub scheme: DrmScheme,
    pub license_url: Url,
    /// Custom headers for license requests
    pub license_headers: HashMap<String, String>,
}

impl DrmConfig {
    /// Resolve raw launch parameters
    pub fn from_params(params: &DrmParams) -> Result<Self> {
        let scheme = DrmScheme::from_identifier(&params.scheme).ok_or_else(|| {
            Error::DrmUnsupported {
                scheme: params.scheme.clone(),
            }
        })?;
        let license_url = Url::parse(&params.license_url).map_err(|e| {
            Error::InvalidConfig(format!("license url {:?}: {}", params.license_url, e))
        })?;

        Ok(Self {
            scheme,
            license_url,
            license_headers: HashMap::new(),
        })
    }

    /// Add a custom header for license requests
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.license_headers.insert(key.to_string(), value.to_string());
        self
    }
}

/// Opaque license session handle passed to pipeline creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmHandle {
    pub id: Uuid,
    pub scheme: DrmScheme,
    pub license_url: Url,
    pub license_headers: HashMap<String, String>,
}

/// Collaborator that turns a DRM configuration into a session handle
#[async_trait]
pub trait DrmSessionManager: Send + Sync {
    /// Fails with `DrmUnsupported` or `LicenseAcquisitionFailed`
    async fn acquire(&self, config: &DrmConfig) -> Result<DrmHandle>;
}

/// Session manager whose handles fetch licenses over HTTP
pub struct HttpDrmSessionManager {
    client: reqwest::Client,
    supported: Vec<DrmScheme>,
}

impl HttpDrmSessionManager {
    /// Create a manager supporting every known scheme
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            supported: vec![DrmScheme::Widevine, DrmScheme::PlayReady, DrmScheme::ClearKey],
        })
    }

    /// Restrict the schemes this device can open sessions for
    pub fn with_supported(mut self, schemes: Vec<DrmScheme>) -> Self {
        self.supported = schemes;
        self
    }

    /// POST a key request challenge to the handle's license server
    pub async fn execute_key_request(&self, handle: &DrmHandle, challenge: Bytes) -> Result<Bytes> {
        let mut request = self
            .client
            .post(handle.license_url.clone())
            .header("Content-Type", "application/octet-stream")
            .body(challenge);
        for (key, value) in &handle.license_headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::license(format!(
                "{} returned {}",
                handle.license_url, status
            )));
        }

        let license = response.bytes().await?;
        debug!(scheme = %handle.scheme, bytes = license.len(), "License received");
        Ok(license)
    }
}

#[async_trait]
impl DrmSessionManager for HttpDrmSessionManager {
    async fn acquire(&self, config: &DrmConfig) -> Result<DrmHandle> {
        if !self.supported.contains(&config.scheme) {
            return Err(Error::DrmUnsupported {
                scheme: config.scheme.to_string(),
            });
        }

        let handle = DrmHandle {
            id: Uuid::new_v4(),
            scheme: config.scheme,
            license_url: config.license_url.clone(),
            license_headers: config.license_headers.clone(),
        };
        info!(scheme = %handle.scheme, session = %handle.id, "DRM session opened");
        Ok(handle)
    }
}
