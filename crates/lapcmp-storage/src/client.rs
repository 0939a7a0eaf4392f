//! S3-compatible object store client.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use lapcmp_models::ObjectLocator;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// Object store client bound to one configured bucket and prefix.
///
/// Operations take explicit bucket names: job payloads carry their own
/// locators and may point at a bucket other than the default one.
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: Client,
    config: StorageConfig,
}

impl ObjectStoreClient {
    /// Create a new client from configuration.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        if config.endpoint_url.is_empty() {
            return Err(StorageError::config_error("endpoint URL is empty"));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "lapcmp-env",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(StorageConfig::from_env()?)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Default bucket.
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Stream an object to a local file, creating parent directories.
    pub async fn download_to(
        &self,
        locator: &ObjectLocator,
        path: impl AsRef<Path>,
    ) -> StorageResult<u64> {
        let path = path.as_ref();
        debug!(bucket = %locator.bucket, key = %locator.key, "Downloading to {}", path.display());

        let response = self
            .client
            .get_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(&locator.key)
                } else {
                    StorageError::download_failed(format!("{}: {:?}", locator.key, e))
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(path).await?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", locator.key, e)))?;
        file.flush().await?;

        info!(key = %locator.key, bytes = written, "Downloaded {}", path.display());
        Ok(written)
    }

    /// Upload a local file.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {:?}", key, e)))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Upload an in-memory object.
    pub async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}/{}", data.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {:?}", key, e)))?;

        Ok(())
    }

    /// Presigned GET URL.
    pub async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Presigned PUT URL. The uploader must send the same `Content-Type`.
    pub async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("object store connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StorageConfig {
        StorageConfig {
            endpoint_url: "http://127.0.0.1:9000".into(),
            region: "us-west-004".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket: "laps".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = ObjectStoreClient::new(StorageConfig::default());
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_presign_is_offline() {
        let client = ObjectStoreClient::new(test_config()).unwrap();
        let url = client
            .presign_get("laps", "lapcompare/uploads/a.mp4", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(url.starts_with("http://127.0.0.1:9000/laps/lapcompare/uploads/a.mp4?"));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_presign_put_url() {
        let client = ObjectStoreClient::new(test_config()).unwrap();
        let url = client
            .presign_put("laps", "k.mp4", "video/mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/laps/k.mp4?"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    #[ignore = "requires a reachable S3-compatible endpoint"]
    async fn test_round_trip_against_endpoint() {
        let client = ObjectStoreClient::from_env().unwrap();
        let bucket = client.bucket().to_string();
        let key = format!("{}tests/round_trip.txt", client.config().prefix);
        client
            .upload_bytes(&bucket, &key, b"lap".to_vec(), "text/plain")
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        let written = client
            .download_to(&ObjectLocator::new(&bucket, &key), &path)
            .await
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(std::fs::read(&path).unwrap(), b"lap");
    }
}
