//! S3-backed object storage issuing presigned URLs.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::debug;

use super::{CollabError, ObjectStorage, Result};

/// Presigns upload/download requests against one bucket.
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
}

impl S3ObjectStorage {
    pub async fn new(bucket: impl Into<String>, endpoint_url: Option<&str>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Ok(Self {
            client,
            bucket: bucket.into(),
        })
    }

    fn presigning(expires_secs: u64) -> Result<PresigningConfig> {
        PresigningConfig::expires_in(Duration::from_secs(expires_secs))
            .map_err(|e| CollabError::ObjectStorage(format!("invalid expiry: {e}")))
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn issue_upload_url(
        &self,
        object_key: &str,
        content_type: &str,
        expires_secs: u64,
    ) -> Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .presigned(Self::presigning(expires_secs)?)
            .await
            .map_err(|e| CollabError::ObjectStorage(format!("presign upload failed: {e}")))?;

        debug!(key = %object_key, "Issued upload URL");
        Ok(presigned.uri().to_string())
    }

    async fn issue_download_url(&self, object_key: &str, expires_secs: u64) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .presigned(Self::presigning(expires_secs)?)
            .await
            .map_err(|e| CollabError::ObjectStorage(format!("presign download failed: {e}")))?;

        debug!(key = %object_key, "Issued download URL");
        Ok(presigned.uri().to_string())
    }
}
