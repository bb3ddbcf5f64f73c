/// S3-compatible object store backend.
///
/// Each namespace maps to one bucket on the same endpoint. All handles
/// built from one `S3Config` share a single SDK client.
///
/// Configuration requires:
/// - Endpoint URL
/// - Access key ID
/// - Secret access key
/// - Region
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::ObjectStore;
use crate::error::{AnchorError, Result};

/// Connection settings for the S3 gateway.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl S3Config {
    /// Build an SDK client. Missing endpoint or credentials is fatal.
    pub fn build_client(&self) -> Result<S3Client> {
        let missing: Vec<&str> = [
            ("endpoint", &self.endpoint),
            ("access key id", &self.access_key_id),
            ("secret access key", &self.secret_access_key),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(AnchorError::Config(format!(
                "object store {} not configured",
                missing.join(", ")
            )));
        }

        let credentials = Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            None,
            None,
            "ots-anchor",
        );

        let s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&self.endpoint)
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(S3Client::from_conf(s3_config))
    }
}

/// One bucket on an S3-compatible endpoint.
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn store_err(&self, op: &str, key: &str, e: impl std::error::Error) -> AnchorError {
        AnchorError::Store(format!(
            "{op} {}/{key}: {}",
            self.bucket,
            DisplayErrorContext(e)
        ))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn namespace(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(self.store_err("get", key, service_err));
            }
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| self.store_err("read body", key, e))?
            .into_bytes();

        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .content_length(data.len() as i64)
            .send()
            .await
            .map_err(|e| self.store_err("put", key, e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.store_err("delete", key, e))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| self.store_err("list", prefix, e))?;

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}
