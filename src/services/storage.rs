use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::core::config::Settings;

/// Result of storing one object.
#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if s3.access_key.is_empty() || s3.secret_key.is_empty() {
            tracing::warn!("S3 credentials not configured; exam documents are disabled");
            return Ok(None);
        }

        let creds = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "exam-assist-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.clone())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build(),
        );

        Ok(Some(Self { client, bucket: s3.bucket.clone() }))
    }

    pub(crate) async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    pub(crate) async fn upload_bytes(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredObject> {
        let size = bytes.len() as i64;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("Failed to upload object {key}"))?;

        Ok(StoredObject { size, sha256 })
    }

    /// Downloads an object, refusing anything larger than `max_bytes`.
    pub(crate) async fn download_bytes(&self, key: &str, max_bytes: u64) -> anyhow::Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch object {key}"))?;

        if let Some(length) = output.content_length() {
            if length as u64 > max_bytes {
                anyhow::bail!("Object {key} is {length} bytes, above the {max_bytes} byte limit");
            }
        }

        let bytes = output
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read object {key}"))?
            .into_bytes();

        if bytes.len() as u64 > max_bytes {
            anyhow::bail!("Object {key} exceeds the {max_bytes} byte limit");
        }

        Ok(bytes.to_vec())
    }

    pub(crate) async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete object {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::StorageService;
    use crate::core::config::Settings;
    use crate::test_support;
    use std::time::Duration;

    #[tokio::test]
    async fn storage_disabled_without_credentials() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings).await.expect("storage");
        assert!(storage.is_none());
    }

    #[tokio::test]
    async fn presign_get_returns_url() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings)
            .await
            .expect("storage")
            .expect("storage enabled");

        let url = storage
            .presign_get("exams/test/de-thi.pdf", Duration::from_secs(300))
            .await
            .expect("presign get");
        assert!(url.contains("de-thi.pdf"));
    }
}
