//! Command-line arguments shared by the binaries.

use std::path::PathBuf;

use anyhow::anyhow;
use clap::Args;

use crate::credentials::StoreCredentials;

#[derive(Debug, Args)]
pub struct CredentialArgs {
    /// JSON file holding access_key, secret_key, endpoint, bucket, region
    /// and optionally path_style. Overrides the flags below.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// The S3-compatible endpoint, e.g. https://s3.us.cloud-object-storage.appdomain.cloud
    #[arg(long, env = "AWS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// The name of the bucket.
    #[arg(long)]
    pub bucket: Option<String>,

    /// The region, e.g. us-geo.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Use virtual-hosted-style addressing instead of path-style.
    #[arg(long, default_value_t = false)]
    pub virtual_hosted: bool,
}

impl CredentialArgs {
    pub fn credentials(&self) -> anyhow::Result<StoreCredentials> {
        if let Some(path) = &self.config {
            return StoreCredentials::from_path(path);
        }
        let creds = StoreCredentials::new(
            required(&self.access_key, "access-key")?,
            required(&self.secret_key, "secret-key")?,
            required(&self.endpoint, "endpoint")?,
            required(&self.bucket, "bucket")?,
            required(&self.region, "region")?,
        )?;
        Ok(creds.with_path_style(!self.virtual_hosted))
    }
}

fn required(value: &Option<String>, flag: &str) -> anyhow::Result<String> {
    value
        .clone()
        .ok_or_else(|| anyhow!("missing --{} (or a --config file)", flag))
}
