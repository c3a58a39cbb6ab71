use std::{fmt, path::Path};

use serde::Deserialize;

use crate::error::StoreError;

/// Everything needed to reach one bucket on an S3-compatible endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCredentials")]
pub struct StoreCredentials {
    access_key: String,
    secret_key: String,
    endpoint: String,
    bucket: String,
    region: String,
    path_style: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCredentials {
    access_key: String,
    secret_key: String,
    endpoint: String,
    bucket: String,
    region: String,
    #[serde(default = "default_path_style")]
    path_style: bool,
}

fn default_path_style() -> bool {
    true
}

impl TryFrom<RawCredentials> for StoreCredentials {
    type Error = StoreError;

    fn try_from(raw: RawCredentials) -> Result<Self, Self::Error> {
        Ok(StoreCredentials::new(
            raw.access_key,
            raw.secret_key,
            raw.endpoint,
            raw.bucket,
            raw.region,
        )?
        .with_path_style(raw.path_style))
    }
}

impl StoreCredentials {
    /// Path-style addressing is on by default; most S3-compatible providers
    /// other than AWS require it.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let creds = StoreCredentials {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            region: region.into(),
            path_style: true,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Reads credentials from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let creds = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid credentials file {}: {}", path.display(), e))?;
        Ok(creds)
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("access key", &self.access_key),
            ("secret key", &self.secret_key),
            ("endpoint", &self.endpoint),
            ("bucket", &self.bucket),
            ("region", &self.region),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::invalid_config(format!("{} must not be empty", name)));
            }
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(StoreError::invalid_config(format!(
                "endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        Ok(())
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn path_style(&self) -> bool {
        self.path_style
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .finish()
    }
}
