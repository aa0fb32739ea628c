//! Mapping of AWS SDK errors onto store errors

use crate::protocol::StoreError;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};

/// Convert an SDK error, keeping the service error code and HTTP status
pub(crate) fn from_sdk<E>(error: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match error {
        SdkError::TimeoutError(_) => StoreError::Timeout("SDK request timed out".to_string()),
        SdkError::DispatchFailure(e) => {
            StoreError::Network(format!("Network dispatch failure: {:?}", e))
        }
        SdkError::ResponseError(e) => StoreError::Network(format!("Response error: {:?}", e)),
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let err = context.err();
            let code = err.code().unwrap_or("Unknown");
            let message = err.message().unwrap_or(code).to_string();
            StoreError::from_service(code, message, Some(status))
        }
        other => StoreError::Sdk(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::put_object::PutObjectError;

    #[test]
    fn test_timeout_maps_to_retryable_timeout() {
        let err = SdkError::<PutObjectError, HttpResponse>::timeout_error("slow");
        let mapped = from_sdk(err);
        assert!(matches!(mapped, StoreError::Timeout(_)));
        assert!(mapped.is_retryable());
    }

    #[test]
    fn test_construction_failure_is_permanent() {
        let err = SdkError::<PutObjectError, HttpResponse>::construction_failure("bad input");
        let mapped = from_sdk(err);
        assert!(matches!(mapped, StoreError::Sdk(_)));
        assert!(!mapped.is_retryable());
    }
}
