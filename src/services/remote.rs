use crate::config::RemoteConfig;
use crate::error::AppError;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use std::time::Duration;

/// Object-storage replica of the backup directory. Upload and delete are
/// idempotent and safe to retry; failures never fail the backup job itself.
pub struct RemoteStore {
    client: Client,
    bucket: String,
    prefix: String,
    timeout: Duration,
}

impl RemoteStore {
    /// Builds the S3 client and checks the bucket is reachable. Supports
    /// custom endpoints and path-style addressing for S3-compatible services.
    pub async fn connect(cfg: &RemoteConfig, timeout: Duration) -> Result<Self, AppError> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let (Some(key), Some(secret)) = (&cfg.access_key_id, &cfg.secret_access_key) {
            builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key,
                secret,
                None,
                None,
                "radio-admin",
            ));
        }
        if cfg.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let head = client.head_bucket().bucket(&cfg.bucket).send();
        match tokio::time::timeout(timeout, head).await {
            Err(_) => {
                return Err(AppError::Configuration(format!(
                    "replication bucket {} is unreachable (timed out)",
                    cfg.bucket
                )))
            }
            Ok(Err(e)) => {
                return Err(AppError::Configuration(format!(
                    "replication bucket {} is not accessible: {e}",
                    cfg.bucket
                )))
            }
            Ok(Ok(_)) => {}
        }

        Ok(Self {
            client,
            bucket: cfg.bucket.clone(),
            prefix: cfg.prefix.clone(),
            timeout,
        })
    }

    fn key(&self, filename: &str) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{prefix}/{filename}")
        }
    }

    pub async fn upload(&self, filename: &str, local: &Path) -> Result<(), AppError> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| AppError::Operation(format!("cannot read backup for upload: {e}")))?;

        let send = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(filename))
            .body(body)
            .content_type("application/octet-stream")
            .send();

        match tokio::time::timeout(self.timeout, send).await {
            Err(_) => Err(AppError::Operation(format!(
                "replication upload timed out after {:?}",
                self.timeout
            ))),
            Ok(Err(e)) => Err(AppError::Operation(format!("replication upload failed: {e}"))),
            Ok(Ok(_)) => {
                tracing::info!(filename = %filename, bucket = %self.bucket, "Backup replicated to object storage");
                Ok(())
            }
        }
    }

    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        let send = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(filename))
            .send();

        match tokio::time::timeout(self.timeout, send).await {
            Err(_) => Err(AppError::Operation(format!(
                "replication delete timed out after {:?}",
                self.timeout
            ))),
            Ok(Err(e)) => Err(AppError::Operation(format!("replication delete failed: {e}"))),
            Ok(Ok(_)) => {
                tracing::info!(filename = %filename, bucket = %self.bucket, "Removed replicated backup from object storage");
                Ok(())
            }
        }
    }
}
