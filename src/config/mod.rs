use crate::error::IngestError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://localhost:41798/ims-uploader";

/// What the pipeline does when a file cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Record the failure and continue with the next file
    Skip,
    /// Stop the whole run
    Halt,
}

impl FromStr for DecodeFailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "halt" | "abort" => Ok(Self::Halt),
            other => Err(IngestError::Config(format!(
                "unknown decode failure policy '{}' (expected skip|halt)",
                other
            ))),
        }
    }
}

/// Which submission outcomes release the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancePolicy {
    AnyOutcome,
    /// Failed submissions keep the asset open so the operator can retry or skip
    AcceptedOnly,
}

impl FromStr for AdvancePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" | "any_outcome" => Ok(Self::AnyOutcome),
            "accepted" | "accepted_only" => Ok(Self::AcceptedOnly),
            other => Err(IngestError::Config(format!(
                "unknown advance policy '{}' (expected any|accepted)",
                other
            ))),
        }
    }
}

/// How the thumbnail for a submission is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPolicy {
    /// Use the last capture whatever asset it shows
    Manual,
    /// Reject the submission unless the last capture shows the current asset
    RequireFresh,
    /// Use a fresh capture if there is one, otherwise render and capture now
    AutoCapture,
}

impl FromStr for ThumbnailPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "require_fresh" | "fresh" => Ok(Self::RequireFresh),
            "auto" | "auto_capture" => Ok(Self::AutoCapture),
            other => Err(IngestError::Config(format!(
                "unknown thumbnail policy '{}' (expected manual|fresh|auto)",
                other
            ))),
        }
    }
}

/// Runtime configuration for an ingestion session
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Ingestion endpoint receiving the multipart POST
    pub endpoint: String,

    /// Whole-request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,

    /// Accept self-signed certificates, e.g. a local https endpoint (default: false)
    pub accept_invalid_certs: bool,

    /// Square viewport edge in pixels (default: 550)
    pub viewport_size: u32,

    /// Render loop frequency (default: 30)
    pub render_fps: u32,

    /// Give up on an asset after this long without a submission (default: never)
    pub gate_timeout_secs: Option<u64>,

    pub on_decode_failure: DecodeFailurePolicy,

    pub advance_on: AdvancePolicy,

    pub thumbnail_policy: ThumbnailPolicy,

    /// Downscale thumbnails to fit this edge (default: full viewport)
    pub thumbnail_max_size: Option<u32>,

    /// Maximum model size in bytes (default: 256 MB)
    pub max_file_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 30,
            accept_invalid_certs: false,
            viewport_size: 550,
            render_fps: 30,
            gate_timeout_secs: None,
            on_decode_failure: DecodeFailurePolicy::Skip,
            advance_on: AdvancePolicy::AcceptedOnly,
            thumbnail_policy: ThumbnailPolicy::AutoCapture,
            thumbnail_max_size: None,
            max_file_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let config = Self {
            endpoint: lookup("INGEST_ENDPOINT").unwrap_or(default.endpoint),

            request_timeout_secs: lookup("INGEST_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.request_timeout_secs),

            accept_invalid_certs: lookup("INGEST_ACCEPT_INVALID_CERTS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.accept_invalid_certs),

            viewport_size: lookup("VIEWPORT_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.viewport_size),

            render_fps: lookup("RENDER_FPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.render_fps),

            gate_timeout_secs: lookup("GATE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .or(default.gate_timeout_secs),

            on_decode_failure: match lookup("DECODE_FAILURE_POLICY") {
                Some(v) => v.parse()?,
                None => default.on_decode_failure,
            },

            advance_on: match lookup("ADVANCE_POLICY") {
                Some(v) => v.parse()?,
                None => default.advance_on,
            },

            thumbnail_policy: match lookup("THUMBNAIL_POLICY") {
                Some(v) => v.parse()?,
                None => default.thumbnail_policy,
            },

            thumbnail_max_size: lookup("THUMBNAIL_MAX_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .or(default.thumbnail_max_size),

            max_file_size: lookup("MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        };

        config.validate()?;
        Ok(config)
    }

    /// Local endpoint over self-signed https, quick gate timeout
    pub fn development() -> Self {
        Self {
            accept_invalid_certs: true,
            gate_timeout_secs: Some(600),
            ..Self::default()
        }
    }

    /// Strict certificate checking, operator must resolve every asset
    pub fn production() -> Self {
        Self {
            accept_invalid_certs: false,
            on_decode_failure: DecodeFailurePolicy::Skip,
            advance_on: AdvancePolicy::AcceptedOnly,
            thumbnail_policy: ThumbnailPolicy::RequireFresh,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.endpoint_url()?;
        if self.viewport_size == 0 {
            return Err(IngestError::Config("viewport size must be positive".into()));
        }
        if self.render_fps == 0 {
            return Err(IngestError::Config("render fps must be positive".into()));
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, IngestError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| IngestError::Config(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(IngestError::Config(format!(
                "endpoint scheme must be http or https, got '{}'",
                scheme
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gate_timeout_secs.map(Duration::from_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.render_fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.viewport_size, 550);
        assert_eq!(config.on_decode_failure, DecodeFailurePolicy::Skip);
        assert_eq!(config.advance_on, AdvancePolicy::AcceptedOnly);
        assert_eq!(config.thumbnail_policy, ThumbnailPolicy::AutoCapture);
        assert!(config.gate_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = IngestConfig::development();
        assert!(config.accept_invalid_certs);
        assert_eq!(config.gate_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_production_config() {
        let config = IngestConfig::production();
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.thumbnail_policy, ThumbnailPolicy::RequireFresh);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("INGEST_ENDPOINT", "http://127.0.0.1:9000/upload"),
            ("GATE_TIMEOUT_SECS", "45"),
            ("DECODE_FAILURE_POLICY", "halt"),
            ("ADVANCE_POLICY", "any"),
            ("THUMBNAIL_POLICY", "manual"),
            ("VIEWPORT_SIZE", "256"),
            ("INGEST_ACCEPT_INVALID_CERTS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "http://127.0.0.1:9000/upload");
        assert_eq!(config.gate_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(config.on_decode_failure, DecodeFailurePolicy::Halt);
        assert_eq!(config.advance_on, AdvancePolicy::AnyOutcome);
        assert_eq!(config.thumbnail_policy, ThumbnailPolicy::Manual);
        assert_eq!(config.viewport_size, 256);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(IngestConfig::from_lookup(lookup_from(&[("ADVANCE_POLICY", "sometimes")])).is_err());
        assert!(IngestConfig::from_lookup(lookup_from(&[("INGEST_ENDPOINT", "ftp://host/x")])).is_err());
        assert!(IngestConfig::from_lookup(lookup_from(&[("INGEST_ENDPOINT", "not a url")])).is_err());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = IngestConfig::from_lookup(lookup_from(&[("GATE_TIMEOUT_SECS", "0")])).unwrap();
        assert!(config.gate_timeout().is_none());
    }
}
