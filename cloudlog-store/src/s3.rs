//! S3-based store.
//!
//! Stores objects in AWS S3 or S3-compatible services (`MinIO`, `LocalStack`).
//! Transfer mechanics (retries, timeouts, connection pooling) are left to the
//! AWS SDK.
//!
//! # Example
//!
//! ```ignore
//! use cloudlog_store::{S3Config, S3Store};
//!
//! let config = S3Config::from_env()?;
//! let store = S3Store::new(config).await?;
//! ```

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response as HttpResponse;
use bytes::Bytes;
use tracing::{error, info};

use crate::error::{ConfigError, StoreError, StoreResult};
use crate::store::{ObjectKey, Store};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// S3 storage class for uploaded objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum S3StorageClass {
    /// Standard S3 storage (default).
    #[default]
    Standard,
    /// Infrequent Access.
    StandardIa,
    /// Intelligent Tiering.
    IntelligentTiering,
}

impl S3StorageClass {
    const fn to_sdk_class(self) -> aws_sdk_s3::types::StorageClass {
        match self {
            Self::Standard => aws_sdk_s3::types::StorageClass::Standard,
            Self::StandardIa => aws_sdk_s3::types::StorageClass::StandardIa,
            Self::IntelligentTiering => aws_sdk_s3::types::StorageClass::IntelligentTiering,
        }
    }
}

/// Configuration for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name (required).
    pub bucket: String,

    /// Extra prefix placed in front of every (already namespaced) key.
    ///
    /// Default: empty.
    pub key_prefix: String,

    /// AWS region. If not set, uses the region from the environment/profile.
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    pub endpoint_url: Option<String>,

    /// Force path-style addressing (`MinIO`, `LocalStack`).
    pub force_path_style: bool,

    /// Per-operation timeout in seconds, including SDK retries.
    ///
    /// Default: 30 seconds.
    pub timeout_secs: u64,

    /// Maximum attempts per operation, handled by the SDK.
    ///
    /// Default: 3.
    pub max_attempts: u32,

    /// Storage class for uploaded objects.
    pub storage_class: S3StorageClass,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key_prefix: String::new(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
            timeout_secs: 30,
            max_attempts: 3,
            storage_class: S3StorageClass::Standard,
        }
    }
}

impl S3Config {
    /// Creates a new configuration with the given bucket name.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CLOUDLOG_S3_BUCKET` (required): S3 bucket name
    /// - `CLOUDLOG_S3_PREFIX`: Extra key prefix
    /// - `CLOUDLOG_S3_REGION`: AWS region
    /// - `CLOUDLOG_S3_ENDPOINT`: Custom endpoint URL
    /// - `CLOUDLOG_S3_FORCE_PATH_STYLE`: `"true"` for path-style addressing
    /// - `CLOUDLOG_S3_TIMEOUT_SECS`: Per-operation timeout
    ///
    /// # Errors
    ///
    /// Returns an error if `CLOUDLOG_S3_BUCKET` is not set or the timeout is
    /// not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket = env::var("CLOUDLOG_S3_BUCKET")
            .map_err(|_| ConfigError::MissingEnv("CLOUDLOG_S3_BUCKET"))?;

        let timeout_secs = match env::var("CLOUDLOG_S3_TIMEOUT_SECS") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::Invalid(format!("CLOUDLOG_S3_TIMEOUT_SECS is not a number: {value}"))
            })?,
            Err(_) => Self::default().timeout_secs,
        };

        Ok(Self {
            bucket,
            key_prefix: env::var("CLOUDLOG_S3_PREFIX").unwrap_or_default(),
            region: env::var("CLOUDLOG_S3_REGION").ok(),
            endpoint_url: env::var("CLOUDLOG_S3_ENDPOINT").ok(),
            force_path_style: env::var("CLOUDLOG_S3_FORCE_PATH_STYLE")
                .is_ok_and(|v| v.eq_ignore_ascii_case("true")),
            timeout_secs,
            ..Self::default()
        })
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets a custom endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self
    }

    /// Enables path-style addressing.
    #[must_use]
    pub const fn with_path_style(mut self) -> Self {
        self.force_path_style = true;
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the storage class.
    #[must_use]
    pub const fn with_storage_class(mut self, class: S3StorageClass) -> Self {
        self.storage_class = class;
        self
    }
}

// -----------------------------------------------------------------------------
// S3Store
// -----------------------------------------------------------------------------

/// S3-backed [`Store`].
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3Store {
    /// Creates a new S3 store from configuration.
    ///
    /// Credentials come from the standard AWS credential chain (environment,
    /// shared credentials file, instance role).
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is empty.
    pub async fn new(config: S3Config) -> Result<Self, ConfigError> {
        if config.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket name must not be empty".into()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_secs))
                    .build(),
            )
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts));

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket,
            region = config.region.as_deref().unwrap_or("default"),
            "Created S3 store"
        );

        Ok(Self { client, config })
    }

    /// Creates a store from an existing SDK client.
    ///
    /// # Panics
    ///
    /// Panics if the bucket name is empty.
    #[must_use]
    pub fn from_client(client: aws_sdk_s3::Client, config: S3Config) -> Self {
        assert!(!config.bucket.is_empty(), "bucket name must not be empty");
        Self { client, config }
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn full_key(&self, key: &ObjectKey) -> String {
        format!("{}{}", self.config.key_prefix, key.as_str())
    }
}

#[async_trait]
impl Store for S3Store {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<()> {
        assert!(!key.is_empty(), "key must not be empty");

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(self.full_key(key))
            .content_length(i64::try_from(data.len()).unwrap_or(i64::MAX))
            .body(ByteStream::from(data))
            .storage_class(self.config.storage_class.to_sdk_class())
            .send()
            .await
            .map_err(|e| map_sdk_error(key, "PutObject", e))?;

        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        assert!(!key.is_empty(), "key must not be empty");

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, "GetObject", e))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Transport {
                key: key.to_string(),
                message: format!("failed to read S3 response body: {e}"),
            })?
            .into_bytes();

        Ok(bytes)
    }
}

// -----------------------------------------------------------------------------
// Helper Functions
// -----------------------------------------------------------------------------

/// Flattens an SDK error into a [`StoreError`].
///
/// Service errors mean S3 answered and refused; timeouts mean we stopped
/// waiting; everything else never reached a response.
fn map_sdk_error<E>(key: &ObjectKey, operation: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::ServiceError(service_err) => {
            if service_err.raw().status().as_u16() == 404 {
                return StoreError::NotFound {
                    key: key.to_string(),
                };
            }
            let inner = service_err.err();
            let code = inner.code().unwrap_or("unknown").to_string();
            let message = inner.message().unwrap_or("no message").to_string();
            error!(key = %key, code = %code, "S3 rejected {operation} request");
            StoreError::Rejected {
                key: key.to_string(),
                code,
                message: format!("S3 {operation} rejected: {message}"),
            }
        }
        SdkError::TimeoutError(_) => StoreError::Interrupted {
            key: key.to_string(),
            message: format!("S3 {operation} timed out: {err}"),
        },
        _ => StoreError::Transport {
            key: key.to_string(),
            message: format!("S3 {operation} failed: {err}"),
        },
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
