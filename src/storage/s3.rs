use std::time::Duration;

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, Config};

/// Thin wrapper over the S3 SDK for output artifacts. Works against AWS or
/// any S3-compatible endpoint (R2, MinIO).
pub struct S3Client {
    client: Client,
    cdn_url: Option<String>,
}

impl S3Client {
    pub async fn new() -> Result<Self> {
        let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Ok(S3Client {
            client: Client::new(&config),
            cdn_url: std::env::var("CDN_URL").ok(),
        })
    }

    pub fn new_with_endpoint(
        endpoint_url: String,
        access_key_id: String,
        secret_access_key: String,
    ) -> Self {
        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "custom");

        let config = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .build();

        S3Client {
            client: Client::from_conf(config),
            cdn_url: None,
        }
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await?;

        // CDN URL if configured, plain S3 URL otherwise
        let url = if let Some(cdn) = &self.cdn_url {
            format!("{}/{}", cdn, key)
        } else {
            format!("https://{}.s3.amazonaws.com/{}", bucket, key)
        };

        Ok(url)
    }

    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;

        let data = response.body.collect().await?;
        Ok(data.to_vec())
    }

    pub async fn create_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in_seconds: u64,
    ) -> Result<String> {
        let presigning_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(expires_in_seconds))
            .build()?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await?;

        Ok(presigned.uri().to_string())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;

        Ok(())
    }
}
