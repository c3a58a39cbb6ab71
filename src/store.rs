#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::debug;

use crate::{credentials::StoreCredentials, error::StoreError};

/// One batch of keys from a listing, plus the cursor for the next batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

/// The two object-store calls a bucket drain needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists one page of keys. The store decides the page size.
    async fn list_objects(
        &self,
        bucket: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Builds a client for the endpoint in `creds` and checks that the bucket
    /// is reachable with those credentials.
    pub async fn connect(creds: &StoreCredentials) -> Result<Self, StoreError> {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(creds.region().to_owned()))
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared_config)
            .credentials_provider(Credentials::new(
                creds.access_key(),
                creds.secret_key(),
                None,
                None,
                "bucketclear",
            ))
            .endpoint_url(creds.endpoint())
            .force_path_style(creds.path_style())
            .build();
        let store = S3Store {
            client: Client::from_conf(config),
        };

        debug!("checking bucket {} at {}", creds.bucket(), creds.endpoint());
        store
            .client
            .head_bucket()
            .bucket(creds.bucket())
            .send()
            .await?;
        Ok(store)
    }

    pub async fn put_object(&self, bucket: &str, key: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(blob))
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(
        &self,
        bucket: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage, StoreError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation)
            .send()
            .await?;
        let keys = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_owned))
            .collect();
        Ok(ObjectPage {
            keys,
            next_token: resp.next_continuation_token().map(str::to_owned),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }
}
