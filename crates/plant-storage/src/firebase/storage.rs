use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Endpoints, check};
use crate::credential::Credential;
use crate::error::StorageResult;
use crate::keys;
use crate::traits::ObjectStore;

/// Cloud Storage bucket reached over its JSON and media-upload APIs.
#[derive(Clone)]
pub struct FirebaseStorage {
    http: Client,
    bucket: String,
    endpoints: Endpoints,
}

/// One bucket CORS rule, as the Storage JSON API spells it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    pub origin: Vec<String>,
    pub method: Vec<String>,
    pub response_header: Vec<String>,
    pub max_age_seconds: u32,
}

impl Default for CorsRule {
    /// Any origin, the five methods browsers use against the bucket,
    /// `Content-Type` exposed, one hour preflight cache.
    fn default() -> Self {
        Self {
            origin: vec!["*".into()],
            method: ["GET", "HEAD", "DELETE", "POST", "PUT"]
                .into_iter()
                .map(String::from)
                .collect(),
            response_header: vec!["Content-Type".into()],
            max_age_seconds: 3600,
        }
    }
}

#[derive(Serialize)]
struct CorsPatch<'a> {
    cors: &'a [CorsRule],
}

impl FirebaseStorage {
    pub fn new(http: Client, bucket: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            http,
            bucket: bucket.into(),
            endpoints,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoints.storage_api,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    /// Replace the bucket's CORS configuration.
    pub async fn set_cors(&self, rules: &[CorsRule], credential: &Credential) -> StorageResult<()> {
        let url = format!(
            "{}/storage/v1/b/{}?fields=cors",
            self.endpoints.storage_api, self.bucket
        );
        let req = self.http.patch(url).json(&CorsPatch { cors: rules });
        let response = credential.apply(req).send().await?;
        check(response, &self.bucket).await?;

        info!("CORS configuration set on bucket {} ({} rules)", self.bucket, rules.len());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FirebaseStorage {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        credential: &Credential,
    ) -> StorageResult<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoints.upload,
            self.bucket,
            urlencoding::encode(key)
        );
        let size = data.len();
        let req = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(data);
        let response = credential.apply(req).send().await?;
        check(response, key).await?;

        debug!("Uploaded {} ({} bytes) to bucket {}", key, size, self.bucket);
        Ok(())
    }

    async fn delete(&self, key: &str, credential: &Credential) -> StorageResult<()> {
        let req = self.http.delete(self.object_url(key));
        let response = credential.apply(req).send().await?;
        check(response, key).await?;

        debug!("Deleted {} from bucket {}", key, self.bucket);
        Ok(())
    }

    fn retrieval_url(&self, key: &str) -> String {
        keys::retrieval_url(&self.endpoints.download, &self.bucket, key)
    }
}
