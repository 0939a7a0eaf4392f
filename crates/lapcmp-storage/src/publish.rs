//! Publishing a finished result bundle.

use std::path::Path;

use lapcmp_models::{
    ArtifactRef, Manifest, OutputTarget, ANALYSIS_SUMMARY, MANIFEST_FILE,
};
use tracing::{info, instrument};

use crate::client::ObjectStoreClient;
use crate::error::{StorageError, StorageResult};

/// Content type for an artifact, chosen by extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

impl ObjectStoreClient {
    /// Upload every file in `files` from `out_dir` under `outputs.prefix`,
    /// then store the manifest next to them.
    ///
    /// The stored manifest does not carry its own key; the returned one does.
    #[instrument(skip(self, out_dir, files), fields(prefix = %outputs.prefix))]
    pub async fn publish_results(
        &self,
        job_id: &str,
        out_dir: &Path,
        files: &[String],
        outputs: &OutputTarget,
    ) -> StorageResult<Manifest> {
        let mut manifest = Manifest::new(job_id, ANALYSIS_SUMMARY);

        for name in files {
            if name.contains('/') || name.contains('\\') {
                return Err(StorageError::InvalidKey(name.clone()));
            }
            let key = outputs.key_for(name);
            self.upload_file(&outputs.bucket, &key, out_dir.join(name), content_type_for(name))
                .await?;
            let url = self
                .presign_get(&outputs.bucket, &key, self.config().presign_ttl)
                .await?;
            manifest.artifacts.insert(
                name.clone(),
                ArtifactRef {
                    bucket: outputs.bucket.clone(),
                    key,
                    url,
                },
            );
        }

        let manifest_key = outputs.key_for(MANIFEST_FILE);
        let body = serde_json::to_vec_pretty(&manifest)?;
        self.upload_bytes(&outputs.bucket, &manifest_key, body, content_type_for(MANIFEST_FILE))
            .await?;

        info!(artifacts = manifest.artifacts.len(), manifest_key = %manifest_key, "Published results");
        manifest.manifest_key = Some(manifest_key);
        Ok(manifest)
    }
}
