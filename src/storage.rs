use async_trait::async_trait;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed store for incident attachments (photos, documents).
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), AttachmentStoreError>;
    async fn delete(&self, hash: &str) -> Result<(), AttachmentStoreError>;
}

// ---------------- Filesystem implementation (default backend) ----------------
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new() -> Self {
        let root = std::env::var("SECURELOG_ATTACHMENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/incident_attachments"));
        Self { root }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        // two-char fan-out keeps directories small
        self.root.join(&hash[0..2]).join(hash)
    }
}

impl Default for FsAttachmentStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError> {
        let path = self.path_for(hash);
        if path.exists() {
            return Err(AttachmentStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| AttachmentStoreError::Other(e.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|e| AttachmentStoreError::Other(e.to_string()))
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), AttachmentStoreError> {
        let path = self.path_for(hash);
        let bytes = std::fs::read(&path).map_err(|_| AttachmentStoreError::NotFound)?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, hash: &str) -> Result<(), AttachmentStoreError> {
        // best-effort: a missing file counts as deleted
        let _ = std::fs::remove_file(self.path_for(hash));
        Ok(())
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3AttachmentStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3AttachmentStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "securelog-attachments".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing is required for most MinIO/local endpoints.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO attachment client (path-style addressing enabled)");

        // Ensure bucket exists (create if missing)
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        } else {
                            let backoff_ms = 200 * attempt.pow(2); // quadratic backoff
                            warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64))
                                .await;
                        }
                    }
                }
            }
        }

        Ok(Self {
            bucket,
            client,
            prefix: "incident_attachments".into(),
        })
    }

    fn key_for(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.prefix, &hash[0..2], hash)
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(hash);
        // HEAD first to keep uploads idempotent
        if self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .is_ok()
        {
            return Err(AttachmentStoreError::Duplicate);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(
                infer::get(bytes)
                    .map(|t| t.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".into()),
            );
        if let Err(e) = put.send().await {
            error!(
                "put_object failed hash={hash} key={key} bucket={} err={:?}",
                self.bucket, e
            );
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(AttachmentStoreError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), AttachmentStoreError> {
        let key = self.key_for(hash);
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| AttachmentStoreError::NotFound)?;
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| AttachmentStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, hash: &str) -> Result<(), AttachmentStoreError> {
        let key = self.key_for(hash);
        let _ = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        Ok(())
    }
}

/// Factory used by main: S3 when an endpoint is configured, filesystem otherwise.
pub async fn build_attachment_store() -> Arc<dyn AttachmentStore> {
    if std::env::var("S3_ENDPOINT").is_ok() {
        match S3AttachmentStore::new().await {
            Ok(store) => return Arc::new(store),
            Err(e) => panic!("Failed to initialize S3 attachment store: {e}"),
        }
    }
    info!("Using filesystem attachment store");
    Arc::new(FsAttachmentStore::new())
}
