pub mod clear;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod store;

pub use clear::{clear_bucket, BulkDeleter, ClearOptions, ClearResult, DeleteFailure, DeletionOutcome};
pub use credentials::StoreCredentials;
pub use error::{ClearError, StoreError};
pub use store::{ObjectPage, ObjectStore, S3Store};
