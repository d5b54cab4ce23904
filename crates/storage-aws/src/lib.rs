//! AWS backends for dicom-transfer storage.
//!
//! - `S3ObjectStore` - `ObjectStore` over Amazon S3
//! - `DynamoMetadataStore` - `MetadataStore` over Amazon DynamoDB
//!
//! Both clients are built from one shared SDK configuration.
//!
//! # Example
//!
//! ```ignore
//! use dicom_transfer_storage::StorageSettings;
//! use dicom_transfer_storage_aws::{load_sdk_config, DynamoMetadataStore, S3ObjectStore};
//!
//! let settings = StorageSettings::default();
//! let sdk_config = load_sdk_config(&settings).await;
//! let objects = S3ObjectStore::from_config(&sdk_config, false);
//! let metadata = DynamoMetadataStore::from_config(&sdk_config);
//! ```

mod config;
mod dynamodb;
mod error;
mod s3;

pub use config::load_sdk_config;
pub use dynamodb::{
    attribute_to_json, json_to_attribute, DynamoMetadataStore, TableWait, KEY_ATTRIBUTE,
    LOCATIONS_ATTRIBUTE,
};
pub use s3::S3ObjectStore;
