//! Shared SDK configuration.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use dicom_transfer_storage::StorageSettings;

/// Provider name attached to static credentials.
const CREDENTIALS_PROVIDER: &str = "dicom-transfer";

/// Load the SDK configuration shared by the S3 and DynamoDB clients.
///
/// Static credentials in `settings` replace the default provider chain; an
/// endpoint URL redirects every service to a local emulator or gateway.
///
/// # Arguments
/// * `settings` - Region, optional credentials and optional endpoint
pub async fn load_sdk_config(settings: &StorageSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()));

    if let Some(ref creds) = settings.credentials {
        let credentials = Credentials::new(
            &creds.access_key_id,
            &creds.secret_access_key,
            creds.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER,
        );
        loader = loader.credentials_provider(credentials);
    }

    if let Some(ref endpoint) = settings.endpoint_url {
        tracing::debug!(endpoint = %endpoint, "using custom AWS endpoint");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
