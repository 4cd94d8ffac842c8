//! Cliente S3-compatible (MinIO/R2) sobre `object_store`.
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};

use super::ObjectStorage;
use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Base para construir URLs públicas; si falta se usa endpoint/bucket.
    pub public_url_base: Option<String>,
}

pub struct S3ObjectStorage {
    store: Box<dyn ObjectStore>,
    config: S3Config,
}

impl S3ObjectStorage {
    pub fn new(config: S3Config) -> Result<Self, ProviderError> {
        let allow_http = config.endpoint.starts_with("http://");
        let store = AmazonS3Builder::new().with_endpoint(&config.endpoint)
                                          .with_bucket_name(&config.bucket)
                                          .with_access_key_id(&config.access_key)
                                          .with_secret_access_key(&config.secret_key)
                                          .with_region("us-east-1")
                                          .with_allow_http(allow_http)
                                          .build()
                                          .map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(S3ObjectStorage { store: Box::new(store),
                             config })
    }
}

fn map_err(e: object_store::Error) -> ProviderError {
    ProviderError::Storage(e.to_string())
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn exists(&self, key: &str) -> Result<bool, ProviderError> {
        match self.store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ProviderError> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions { attributes,
                                ..Default::default() };
        self.store
            .put_opts(&Path::from(key), PutPayload::from(data), opts)
            .await
            .map_err(map_err)?;
        debug!("s3: put {key} ({content_type})");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ProviderError> {
        let result = self.store.get(&Path::from(key)).await.map_err(map_err)?;
        result.bytes().await.map_err(map_err)
    }

    fn public_url(&self, key: &str) -> String {
        match &self.config.public_url_base {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("{}/{}/{}", self.config.endpoint.trim_end_matches('/'), self.config.bucket, key),
        }
    }
}
