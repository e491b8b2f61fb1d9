//! Configuration module
//!
//! All configuration is read once at startup from environment variables (a `.env` file is
//! honoured). Retry and staleness values have no defaults: a deployment must choose them.

use std::env;
use std::str::FromStr;

use chrono::Duration;

use crate::models::TransformationKind;
use crate::router::PrefixRouter;
use crate::storage_types::{MarkerBackend, StorageBackend};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
const DEFAULT_ROUTES: &str = "resize/=resize,greyscale/=greyscale,exif/=exif";
const DEFAULT_OUTPUT_PREFIX_ROOT: &str = "processed/";
const DEFAULT_RESIZE_BOUND: u32 = 1024;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Settings of the hosting process.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    /// `pretty` or `json`
    pub log_format: String,
    pub max_payload_bytes: usize,
}

/// One `prefix -> transformation` routing rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    pub prefix: String,
    pub kind: TransformationKind,
    pub output_prefix: String,
}

impl RouteConfig {
    pub fn new(
        prefix: impl Into<String>,
        kind: TransformationKind,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
            output_prefix: output_prefix.into(),
        }
    }
}

/// Bounding box for the resize transformation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeBounds {
    pub max_width: u32,
    pub max_height: u32,
    /// Apply the EXIF orientation tag before resizing
    pub auto_orient: bool,
}

impl Default for ResizeBounds {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_RESIZE_BOUND,
            max_height: DEFAULT_RESIZE_BOUND,
            auto_orient: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub routes: Vec<RouteConfig>,
    /// Destination bucket for artifacts; the source bucket when unset
    pub output_location: Option<String>,
    pub resize: ResizeBounds,
}

impl PipelineConfig {
    /// The stock routes: `resize/`, `greyscale/` and `exif/` under `processed/<slug>/`.
    pub fn default_routes() -> Vec<RouteConfig> {
        // DEFAULT_ROUTES is a constant and always parses
        parse_routes(DEFAULT_ROUTES, DEFAULT_OUTPUT_PREFIX_ROOT).unwrap_or_default()
    }
}

/// How the content part of a processing key is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerprintMode {
    /// Hash of the notification's identity attributes (size, etag, version, sequencer, time)
    Event,
    /// SHA-256 of the object body; costs one extra read before the idempotency check
    Content,
}

impl FromStr for FingerprintMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "event" => Ok(FingerprintMode::Event),
            "content" => Ok(FingerprintMode::Content),
            _ => Err(anyhow::anyhow!("Invalid fingerprint mode: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IdempotencyConfig {
    pub staleness_window_secs: u64,
    pub max_attempts: u32,
    pub fingerprint_mode: FingerprintMode,
}

impl IdempotencyConfig {
    pub fn staleness_window(&self) -> Duration {
        let secs = i64::try_from(self.staleness_window_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs.min(i64::MAX / 1000))
    }
}

/// Exponential backoff used for the retry-after hint of transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_secs: u64,
    pub max_secs: u64,
}

impl RetryPolicy {
    /// `base * 2^(attempt - 1)`, capped at `max_secs`.
    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_secs)
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, LocalStack, ...)
    pub s3_endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MarkerConfig {
    pub backend: MarkerBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub pipeline: PipelineConfig,
    pub idempotency: IdempotencyConfig,
    pub retry: RetryPolicy,
    pub storage: StorageConfig,
    pub marker: MarkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base = BaseConfig {
            server_port: var("PORT")
                .unwrap_or_else(|| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
            max_payload_bytes: var("MAX_PAYLOAD_BYTES")
                .unwrap_or_else(|| DEFAULT_MAX_PAYLOAD_BYTES.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_PAYLOAD_BYTES),
        };

        let output_root = var("OUTPUT_PREFIX_ROOT")
            .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX_ROOT.to_string());
        let routes = parse_routes(
            &var("ROUTES").unwrap_or_else(|| DEFAULT_ROUTES.to_string()),
            &output_root,
        )?;

        let pipeline = PipelineConfig {
            routes,
            output_location: var("OUTPUT_LOCATION"),
            resize: ResizeBounds {
                max_width: var("RESIZE_MAX_WIDTH")
                    .unwrap_or_else(|| DEFAULT_RESIZE_BOUND.to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("RESIZE_MAX_WIDTH must be a valid number"))?,
                max_height: var("RESIZE_MAX_HEIGHT")
                    .unwrap_or_else(|| DEFAULT_RESIZE_BOUND.to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("RESIZE_MAX_HEIGHT must be a valid number"))?,
                auto_orient: var("RESIZE_AUTOROTATE")
                    .map(|v| parse_bool(&v))
                    .unwrap_or(true),
            },
        };

        let idempotency = IdempotencyConfig {
            staleness_window_secs: required(&var, "STALENESS_WINDOW_SECS")?,
            max_attempts: required(&var, "MAX_ATTEMPTS")?,
            fingerprint_mode: var("FINGERPRINT_MODE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(FingerprintMode::Event),
        };

        let retry = RetryPolicy {
            base_secs: required(&var, "RETRY_BACKOFF_BASE_SECS")?,
            max_secs: required(&var, "RETRY_BACKOFF_MAX_SECS")?,
        };

        let storage = StorageConfig {
            backend: var("STORAGE_BACKEND")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(StorageBackend::S3),
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
        };

        let marker = MarkerConfig {
            backend: var("MARKER_BACKEND")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(MarkerBackend::Postgres),
            database_url: var("DATABASE_URL"),
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
        };

        Ok(Config {
            base,
            pipeline,
            idempotency,
            retry,
            storage,
            marker,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.log_format != "pretty" && self.base.log_format != "json" {
            return Err(anyhow::anyhow!("LOG_FORMAT must be 'pretty' or 'json'"));
        }

        if self.pipeline.resize.max_width == 0 || self.pipeline.resize.max_height == 0 {
            return Err(anyhow::anyhow!(
                "RESIZE_MAX_WIDTH and RESIZE_MAX_HEIGHT must be greater than 0"
            ));
        }

        if self.idempotency.staleness_window_secs == 0 {
            return Err(anyhow::anyhow!(
                "STALENESS_WINDOW_SECS must be greater than 0"
            ));
        }

        if self.idempotency.max_attempts == 0 {
            return Err(anyhow::anyhow!("MAX_ATTEMPTS must be at least 1"));
        }

        if self.retry.max_secs < self.retry.base_secs {
            return Err(anyhow::anyhow!(
                "RETRY_BACKOFF_MAX_SECS must not be smaller than RETRY_BACKOFF_BASE_SECS"
            ));
        }

        if self.storage.backend == StorageBackend::Local
            && self.storage.local_storage_path.is_none()
        {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
            ));
        }

        if self.marker.backend == MarkerBackend::Postgres {
            match self.marker.database_url.as_deref() {
                Some(url)
                    if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                _ => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string when MARKER_BACKEND=postgres"
                    ))
                }
            }
        }

        // Overlapping or self-triggering routes are rejected here rather than per delivery
        PrefixRouter::new(self.pipeline.routes.clone())?;

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.base.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn server_port(&self) -> u16 {
        self.base.server_port
    }
}

fn required<T, F>(var: &F, name: &str) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .ok_or_else(|| anyhow::anyhow!("{} must be set", name))?
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid number", name))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse `prefix=kind[=output_prefix]` entries separated by commas.
///
/// When the output prefix is omitted it defaults to `<output_root><slug>/`.
pub fn parse_routes(entries: &str, output_root: &str) -> Result<Vec<RouteConfig>, anyhow::Error> {
    let mut root = output_root.trim().to_string();
    if !root.is_empty() && !root.ends_with('/') {
        root.push('/');
    }

    entries.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split('=').map(str::trim).collect();
            match parts.as_slice() {
                [prefix, kind] => {
                    let kind: TransformationKind = kind.parse()?;
                    Ok(RouteConfig::new(
                        *prefix,
                        kind,
                        format!("{}{}/", root, kind.slug()),
                    ))
                }
                [prefix, kind, output_prefix] => {
                    Ok(RouteConfig::new(*prefix, kind.parse()?, *output_prefix))
                }
                _ => Err(anyhow::anyhow!(
                    "Invalid route '{}': expected prefix=kind[=output_prefix]",
                    entry
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("STALENESS_WINDOW_SECS", "300"),
        ("MAX_ATTEMPTS", "3"),
        ("RETRY_BACKOFF_BASE_SECS", "2"),
        ("RETRY_BACKOFF_MAX_SECS", "60"),
        ("MARKER_BACKEND", "memory"),
    ];

    #[test]
    fn test_defaults_with_required_values() {
        let config = Config::from_lookup(vars(&REQUIRED)).unwrap();
        assert_eq!(config.server_port(), 8080);
        assert_eq!(config.base.max_payload_bytes, 1024 * 1024);
        assert_eq!(config.pipeline.routes.len(), 3);
        assert_eq!(config.pipeline.routes[0].prefix, "resize/");
        assert_eq!(config.pipeline.routes[0].output_prefix, "processed/resize/");
        assert_eq!(config.pipeline.routes[2].kind, TransformationKind::ExifExtract);
        assert_eq!(config.pipeline.routes[2].output_prefix, "processed/exif/");
        assert_eq!(config.pipeline.resize, ResizeBounds::default());
        assert_eq!(config.idempotency.fingerprint_mode, FingerprintMode::Event);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_required_value_fails() {
        for missing in ["STALENESS_WINDOW_SECS", "MAX_ATTEMPTS", "RETRY_BACKOFF_BASE_SECS"] {
            let pairs: Vec<(&str, &str)> = REQUIRED
                .iter()
                .copied()
                .filter(|(k, _)| *k != missing)
                .collect();
            let err = Config::from_lookup(vars(&pairs)).unwrap_err();
            assert!(err.to_string().contains(missing), "{}", err);
        }
    }

    #[test]
    fn test_non_numeric_required_value_fails() {
        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("MAX_ATTEMPTS", "three");
        assert!(Config::from_lookup(vars(&pairs)).is_err());
    }

    #[test]
    fn test_custom_routes() {
        let routes = parse_routes(
            "thumbs/=resize, bw/=grayscale=derived/bw/",
            "out",
        )
        .unwrap();
        assert_eq!(routes[0], RouteConfig::new("thumbs/", TransformationKind::Resize, "out/resize/"));
        assert_eq!(
            routes[1],
            RouteConfig::new("bw/", TransformationKind::Greyscale, "derived/bw/")
        );
        assert!(parse_routes("resize/", "processed/").is_err());
        assert!(parse_routes("resize/=blur", "processed/").is_err());
    }

    #[test]
    fn test_validate_rejects_overlapping_routes() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROUTES", "img/=resize,img/bw/=greyscale"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_routes_sharing_an_output_prefix() {
        // Both default to processed/resize/, so thumbs/x.jpg and avatars/x.jpg would collide
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROUTES", "thumbs/=resize,avatars/=resize"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert!(config.validate().is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROUTES", "thumbs/=resize=out/thumbs/,avatars/=resize=out/avatars/"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_database_url_for_postgres() {
        let mut pairs = REQUIRED.to_vec();
        pairs[4] = ("MARKER_BACKEND", "postgres");
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert!(config.validate().is_err());

        pairs.push(("DATABASE_URL", "postgresql://localhost/imgflow"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_local_storage_needs_path() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STORAGE_BACKEND", "local"));
        let config = Config::from_lookup(vars(&pairs)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            base_secs: 2,
            max_secs: 60,
        };
        assert_eq!(policy.backoff_secs(1), 2);
        assert_eq!(policy.backoff_secs(2), 4);
        assert_eq!(policy.backoff_secs(3), 8);
        assert_eq!(policy.backoff_secs(10), 60);
        assert_eq!(policy.backoff_secs(u32::MAX), 60);
    }
}
