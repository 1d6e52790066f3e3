//! Startup wiring: AWS configuration, destination probing, and construction
//! of the request source and widget sink the consumer runs against.
mod credentials;

use std::path::PathBuf;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use thiserror::Error;

use crate::sink::{DynamoTableClient, ObjectSink, ReservedWords, TableSink, WidgetSink};
use crate::source::{ObjectStoreRequestSource, RequestSource, SqsRequestSource};

use credentials::SdkCredentialBridge;

const FILE_SCHEME: &str = "file://";
const MEMORY_SCHEME: &str = "memory://";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid location {0:?}")]
    InvalidLocation(String),

    #[error("could not prepare local directory {path}: {source}")]
    LocalDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open object store for {location}: {source}")]
    ObjectStore {
        location: String,
        #[source]
        source: object_store::Error,
    },

    #[error("{0:?} is neither a reachable DynamoDB table nor an S3 bucket")]
    UnknownDestination(String),
}

/// Where a source or destination lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Process-local in-memory store, for smoke runs.
    Memory,
    /// Directory on the local filesystem.
    LocalDir(PathBuf),
    /// S3 bucket or DynamoDB table name.
    Remote(String),
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let raw = raw.trim();
        if raw.starts_with(MEMORY_SCHEME) {
            return Ok(Self::Memory);
        }
        if let Some(dir) = raw.strip_prefix(FILE_SCHEME) {
            if dir.is_empty() {
                return Err(SessionError::InvalidLocation(raw.to_string()));
            }
            return Ok(Self::LocalDir(PathBuf::from(dir)));
        }
        if raw.is_empty() || raw.contains("://") {
            return Err(SessionError::InvalidLocation(raw.to_string()));
        }
        Ok(Self::Remote(raw.to_string()))
    }
}

/// Loaded AWS configuration shared by every client the process builds.
pub struct AwsSession {
    sdk_config: SdkConfig,
}

impl AwsSession {
    /// Resolves region and credentials through the standard provider chain.
    pub async fn load(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self { sdk_config }
    }

    pub fn from_sdk_config(sdk_config: SdkConfig) -> Self {
        Self { sdk_config }
    }

    pub fn region(&self) -> Option<&str> {
        self.sdk_config.region().map(|region| region.as_ref())
    }

    pub fn dynamodb(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(&self.sdk_config)
    }

    pub fn sqs(&self) -> aws_sdk_sqs::Client {
        aws_sdk_sqs::Client::new(&self.sdk_config)
    }

    /// Probes with `DescribeTable`. Any failure other than a missing table is
    /// logged and treated as "not a table" so the bucket probe still runs.
    pub async fn table_exists(&self, name: &str) -> bool {
        match self.dynamodb().describe_table().table_name(name).send().await {
            Ok(_) => true,
            Err(SdkError::ServiceError(err)) if err.err().is_resource_not_found_exception() => {
                false
            }
            Err(err) => {
                tracing::warn!(
                    event = "table_probe_failed",
                    name,
                    error = %DisplayErrorContext(&err),
                    "could not describe table"
                );
                false
            }
        }
    }

    /// S3 store for `bucket`, authenticated with the SDK's credential chain.
    pub fn s3_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, SessionError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = self.region() {
            builder = builder.with_region(region);
        }
        if let Some(provider) = self.sdk_config.credentials_provider() {
            builder = builder.with_credentials(Arc::new(SdkCredentialBridge::new(provider)));
        }

        let store = builder.build().map_err(|source| SessionError::ObjectStore {
            location: bucket.to_string(),
            source,
        })?;
        Ok(Arc::new(store))
    }

    /// Object store backing `location`. Local directories are created if missing.
    pub async fn object_store(
        &self,
        location: &Location,
    ) -> Result<Arc<dyn ObjectStore>, SessionError> {
        match location {
            Location::Memory => Ok(Arc::new(InMemory::new())),
            Location::LocalDir(dir) => {
                let path = dir.display().to_string();
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| SessionError::LocalDirectory {
                        path: path.clone(),
                        source,
                    })?;
                let store = LocalFileSystem::new_with_prefix(dir).map_err(|source| {
                    SessionError::ObjectStore {
                        location: path,
                        source,
                    }
                })?;
                Ok(Arc::new(store))
            }
            Location::Remote(bucket) => self.s3_store(bucket),
        }
    }

    /// Picks the sink for `destination` once, before any request is processed.
    /// Local locations skip probing; a remote name is tried as a table first,
    /// then as a bucket.
    pub async fn resolve_sink(
        &self,
        destination: &str,
        reserved: ReservedWords,
    ) -> Result<Box<dyn WidgetSink>, SessionError> {
        let location = Location::parse(destination)?;
        let name = match &location {
            Location::Remote(name) => name.clone(),
            Location::Memory | Location::LocalDir(_) => {
                let store = self.object_store(&location).await?;
                tracing::info!(event = "destination_resolved", destination, backend = "object_store");
                return Ok(Box::new(ObjectSink::new(store)));
            }
        };

        if self.table_exists(&name).await {
            tracing::info!(event = "destination_resolved", destination, backend = "table_store");
            let client = DynamoTableClient::new(self.dynamodb());
            return Ok(Box::new(TableSink::new(client, name, reserved)));
        }

        let store = self.s3_store(&name)?;
        match store.list_with_delimiter(None).await {
            Ok(_) => {
                tracing::info!(event = "destination_resolved", destination, backend = "object_store");
                Ok(Box::new(ObjectSink::new(store)))
            }
            Err(err) => {
                tracing::warn!(
                    event = "bucket_probe_failed",
                    destination,
                    error = %err,
                    "could not list bucket"
                );
                Err(SessionError::UnknownDestination(name))
            }
        }
    }

    /// The queue when `queue_url` is set, otherwise the request bucket.
    pub async fn resolve_source(
        &self,
        request_bucket: &str,
        queue_url: Option<&str>,
        wait_seconds: i32,
    ) -> Result<Box<dyn RequestSource>, SessionError> {
        if let Some(queue_url) = queue_url {
            tracing::info!(event = "source_resolved", queue_url, kind = "queue");
            return Ok(Box::new(SqsRequestSource::new(
                self.sqs(),
                queue_url,
                wait_seconds,
            )));
        }

        let location = Location::parse(request_bucket)?;
        let store = self.object_store(&location).await?;
        tracing::info!(event = "source_resolved", request_bucket, kind = "bucket");
        Ok(Box::new(ObjectStoreRequestSource::new(request_bucket, store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkBackend;

    fn offline_session() -> AwsSession {
        AwsSession::from_sdk_config(
            SdkConfig::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        )
    }

    #[test]
    fn parses_locations() {
        assert_eq!(Location::parse("memory://").unwrap(), Location::Memory);
        assert_eq!(
            Location::parse("file:///tmp/widgets").unwrap(),
            Location::LocalDir(PathBuf::from("/tmp/widgets"))
        );
        assert_eq!(
            Location::parse("usu-cs5250-web").unwrap(),
            Location::Remote("usu-cs5250-web".to_string())
        );
    }

    #[test]
    fn rejects_unusable_locations() {
        for raw in ["", "file://", "s3://bucket"] {
            assert!(
                matches!(Location::parse(raw), Err(SessionError::InvalidLocation(_))),
                "{raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn local_destinations_skip_probing() {
        let session = offline_session();
        let sink = session
            .resolve_sink("memory://", ReservedWords::default())
            .await
            .unwrap();
        assert_eq!(sink.backend(), SinkBackend::ObjectStore);

        let dir = std::env::temp_dir().join(format!("widget-consumer-session-{}", std::process::id()));
        let sink = session
            .resolve_sink(&format!("file://{}", dir.display()), ReservedWords::default())
            .await
            .unwrap();
        assert_eq!(sink.backend(), SinkBackend::ObjectStore);
        assert!(dir.is_dir());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn local_request_bucket_lists_nothing_when_empty() {
        let session = offline_session();
        let source = session.resolve_source("memory://", None, 0).await.unwrap();
        assert_eq!(source.describe(), "memory://");
        assert!(source.list_pending().await.unwrap().is_empty());
    }
}
