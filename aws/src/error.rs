//! Error classification for the Cloud Client Facade (spec.md §7): every
//! fallible call returns a [`ClientError`] already sorted into the three
//! buckets the Reconciliation Engine cares about — transient (retry with
//! backoff), not-found (treat as "already gone", useful for GC and
//! idempotent deletes), or fatal (surface to status, stop retrying).

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{operation} on {service}: not found")]
    NotFound { service: &'static str, operation: &'static str },
    #[error("{operation} on {service}: throttled")]
    Throttled { service: &'static str, operation: &'static str },
    #[error("{operation} on {service}: transient error: {message}")]
    Retryable {
        service: &'static str,
        operation: &'static str,
        message: String,
    },
    #[error("{operation} on {service}: {message}")]
    Fatal {
        service: &'static str,
        operation: &'static str,
        message: String,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Retryable { .. } | ClientError::Throttled { .. })
    }
}

/// AWS error codes across ELBv2/EC2/ACM/RGT that mean "the thing I asked
/// about doesn't exist". Each service spells this differently; there's no
/// shared taxonomy to dispatch on other than the code string itself.
const NOT_FOUND_CODES: &[&str] = &[
    "LoadBalancerNotFoundException",
    "TargetGroupNotFoundException",
    "ListenerNotFoundException",
    "RuleNotFoundException",
    "CertificateNotFoundException",
    "TargetGroupAssociationNotFoundException",
    "InvalidGroup.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidVpcID.NotFound",
    "InvalidSecurityGroupID.NotFound",
    "InvalidNetworkInterfaceID.NotFound",
    "ResourceNotFoundException",
];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "PriorRequestNotComplete",
];

/// Classifies any smithy operation error into a [`ClientError`], given the
/// service/operation names for logging and the error's code as reported by
/// [`ProvideErrorMetadata`]. Call sites extract the code via
/// `err.as_service_error().map(ProvideErrorMetadata::code)` since each
/// generated `*Error` enum implements the trait itself.
pub fn classify<E, R>(service: &'static str, operation: &'static str, err: &SdkError<E, R>) -> ClientError
where
    E: ProvideErrorMetadata,
{
    if let SdkError::ServiceError(service_err) = err {
        let meta = service_err.err();
        if let Some(code) = meta.code() {
            if NOT_FOUND_CODES.contains(&code) {
                return ClientError::NotFound { service, operation };
            }
            if THROTTLING_CODES.contains(&code) {
                return ClientError::Throttled { service, operation };
            }
        }
        return ClientError::Fatal {
            service,
            operation,
            message: meta.message().unwrap_or("unknown service error").to_string(),
        };
    }

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ClientError::Retryable {
            service,
            operation,
            message: err.to_string(),
        },
        _ => ClientError::Fatal {
            service,
            operation,
            message: err.to_string(),
        },
    }
}
