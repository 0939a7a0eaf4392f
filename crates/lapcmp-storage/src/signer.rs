//! Pre-signed upload slots for clients.

use async_trait::async_trait;
use lapcmp_models::SignedUpload;
use tracing::info;
use uuid::Uuid;

use crate::client::ObjectStoreClient;
use crate::error::StorageResult;

/// Hands out upload slots in the default bucket.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn sign_upload(&self, filename: &str, content_type: &str) -> StorageResult<SignedUpload>;
}

#[async_trait]
impl UploadSigner for ObjectStoreClient {
    async fn sign_upload(&self, filename: &str, content_type: &str) -> StorageResult<SignedUpload> {
        let cfg = self.config();
        let key = cfg.upload_key(&Uuid::new_v4().to_string(), filename);

        let put_url = self
            .presign_put(&cfg.bucket, &key, content_type, cfg.presign_ttl)
            .await?;
        let get_url = self.presign_get(&cfg.bucket, &key, cfg.presign_ttl).await?;

        info!(key = %key, content_type, "Signed upload");
        Ok(SignedUpload {
            bucket: cfg.bucket.clone(),
            key,
            put_url,
            get_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[tokio::test]
    async fn test_sign_upload_layout() {
        let client = ObjectStoreClient::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:9000".into(),
            region: "us-west-004".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket: "laps".into(),
            ..Default::default()
        })
        .unwrap();

        let first = client.sign_upload("lap.mp4", "video/mp4").await.unwrap();
        let second = client.sign_upload("lap.mp4", "video/mp4").await.unwrap();

        assert_eq!(first.bucket, "laps");
        assert!(first.key.starts_with("lapcompare/uploads/"));
        assert!(first.key.ends_with("_lap.mp4"));
        assert_ne!(first.key, second.key);
        assert!(first.put_url.contains(&first.key));
        assert!(first.get_url.contains(&first.key));
        assert_ne!(first.put_url, first.get_url);
    }
}
