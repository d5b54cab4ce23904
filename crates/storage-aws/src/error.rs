//! Mapping of AWS SDK errors onto `StorageError`.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use dicom_transfer_storage::StorageError;

/// What went wrong with a request, independent of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    NotFound,
    AccessDenied,
    Transient,
    Permanent,
}

/// Classify a failure from its error code and HTTP status.
pub(crate) fn failure_kind(code: Option<&str>, status: Option<u16>, transport: bool) -> FailureKind {
    match (code, status) {
        (Some("NoSuchKey" | "NotFound" | "NoSuchBucket" | "ResourceNotFoundException"), _)
        | (_, Some(404)) => FailureKind::NotFound,
        (Some("AccessDenied" | "AccessDeniedException" | "Forbidden"), _) | (_, Some(403)) => {
            FailureKind::AccessDenied
        }
        (
            Some(
                "SlowDown"
                | "RequestTimeout"
                | "ThrottlingException"
                | "ProvisionedThroughputExceededException"
                | "InternalError",
            ),
            _,
        ) => FailureKind::Transient,
        (_, Some(status)) if status >= 500 => FailureKind::Transient,
        _ if transport => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Parts of an SDK error needed for mapping, extracted before it is consumed.
pub(crate) struct SdkFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SdkFailure {
    pub(crate) fn new<E>(err: &SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let transport: bool = matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
        );
        let status: Option<u16> = err.raw_response().map(|r| r.status().as_u16());
        Self {
            kind: failure_kind(err.code(), status, transport),
            message: DisplayErrorContext(err).to_string(),
        }
    }

    /// Convert into a `StorageError` for `resource`.
    ///
    /// `not_found` is produced for missing resources, so callers can pick the
    /// variant that names what was missing.
    pub(crate) fn into_storage_error(
        self,
        resource: &str,
        not_found: impl FnOnce() -> StorageError,
    ) -> StorageError {
        match self.kind {
            FailureKind::NotFound => not_found(),
            FailureKind::AccessDenied => StorageError::AccessDenied {
                resource: resource.to_string(),
                message: self.message,
            },
            FailureKind::Transient => StorageError::NetworkError {
                message: self.message,
                retryable: true,
            },
            FailureKind::Permanent => StorageError::NetworkError {
                message: self.message,
                retryable: false,
            },
        }
    }
}

/// Map an S3 object request failure.
pub(crate) fn object_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    SdkFailure::new(&err).into_storage_error(&format!("s3://{bucket}/{key}"), || {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    })
}

/// Map a DynamoDB table request failure. A missing table is a configuration problem.
pub(crate) fn table_error<E>(err: SdkError<E, HttpResponse>, table: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    SdkFailure::new(&err).into_storage_error(table, || StorageError::InvalidConfig {
        message: format!("table {table} does not exist"),
    })
}
