// Durable blob storage over a plain HTTP object API
//
// Uploads are authenticated PUTs against `{endpoint}/{bucket}/{key}`; the
// public URL is `{public_url}/{key}`. Presigned uploads carry an expiry and
// a SHA-256 signature over `key|content_type|expiry` with a shared secret,
// which the storage gateway recomputes.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{BaseBlobStorage, PresignedUpload};

#[derive(Clone)]
pub struct HttpBlobStorage {
    http_client: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_url: String,
    access_token: String,
    signing_secret: String,
}

impl HttpBlobStorage {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
        access_token: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            signing_secret: signing_secret.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.trim_start_matches('/'))
    }

    fn public_object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key.trim_start_matches('/'))
    }

    /// Builds a presigned upload URL expiring at `expires_at`.
    pub fn presign_at(&self, key: &str, content_type: &str, expires_at: DateTime<Utc>) -> PresignedUpload {
        let expires = expires_at.timestamp();
        let signature = sign(&self.signing_secret, key, content_type, expires);
        PresignedUpload {
            url: format!(
                "{}?content_type={}&expires={}&signature={}",
                self.object_url(key),
                encode_query_value(content_type),
                expires,
                signature
            ),
            expires_at,
        }
    }
}

/// Hex SHA-256 of `secret|key|content_type|expires`.
pub fn sign(secret: &str, key: &str, content_type: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(content_type.as_bytes());
    hasher.update(b"|");
    hasher.update(expires.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Percent-encodes the characters a MIME type can carry into a query value.
fn encode_query_value(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => c.to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

#[async_trait]
impl BaseBlobStorage for HttpBlobStorage {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let size = bytes.len();
        let response = self
            .http_client
            .put(self.object_url(key))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", key))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("storage upload of {} failed ({}): {}", key, status, error_text);
        }

        debug!(key = %key, bytes = size, "Uploaded object");
        Ok(self.public_object_url(key))
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUpload> {
        let ttl = chrono::Duration::from_std(ttl).context("presign ttl out of range")?;
        Ok(self.presign_at(key, content_type, Utc::now() + ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn storage() -> HttpBlobStorage {
        HttpBlobStorage::new(
            "https://storage.example.com/",
            "briefcast",
            "https://cdn.example.com",
            "token",
            "secret",
        )
    }

    #[test]
    fn public_url_joins_key() {
        assert_eq!(
            storage().public_object_url("/podcasts/a.mp3"),
            "https://cdn.example.com/podcasts/a.mp3"
        );
    }

    #[test]
    fn presigned_url_carries_verifiable_signature() {
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let upload = storage().presign_at("podcasts/a.mp3", "audio/mpeg", expires_at);

        let expected = sign("secret", "podcasts/a.mp3", "audio/mpeg", expires_at.timestamp());
        assert!(upload
            .url
            .starts_with("https://storage.example.com/briefcast/podcasts/a.mp3?"));
        assert!(upload.url.contains("content_type=audio%2Fmpeg"));
        assert!(upload.url.ends_with(&format!("signature={}", expected)));
        assert_eq!(upload.expires_at, expires_at);
    }

    #[test]
    fn signature_depends_on_every_field() {
        let base = sign("s", "k", "audio/mpeg", 1);
        assert_ne!(base, sign("s", "k", "audio/mpeg", 2));
        assert_ne!(base, sign("s", "k2", "audio/mpeg", 1));
        assert_ne!(base, sign("s2", "k", "audio/mpeg", 1));
        assert_eq!(base.len(), 64);
    }
}
