//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use num_enum::TryFromPrimitive;

include!(concat!(env!("OUT_DIR"), "/sdk_version.rs"));

pub(crate) fn sdk_version() -> &'static str {
    SDK_VERSION
}

pub(crate) fn user_agent() -> &'static str {
    USER_AGENT
}

/// The status of a failed operation, as delivered to continuations and
/// returned from blocking calls.
#[derive(Debug, Clone, PartialEq)]
pub struct BigtableError {
    pub code: BigtableErrorCode,
    pub message: String,
}

impl std::error::Error for BigtableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::fmt::Display for BigtableError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "code={:?} message=\"{}\"", self.code, self.message)
    }
}

impl BigtableError {
    pub fn new(code: BigtableErrorCode, msg: &str) -> BigtableError {
        BigtableError {
            code,
            message: msg.to_string(),
        }
    }

    pub fn from_int(icode: i32, msg: &str) -> BigtableError {
        if let Ok(code) = BigtableErrorCode::try_from(icode) {
            return BigtableError {
                code,
                message: msg.to_string(),
            };
        }
        BigtableError {
            code: BigtableErrorCode::Unknown,
            message: format!("Invalid integer status code {}: {}", icode, msg),
        }
    }

    /// True if another attempt of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// True if this error reports a queue shutdown or an abandoned operation.
    pub fn is_cancelled(&self) -> bool {
        self.code == BigtableErrorCode::Cancelled
    }
}

pub(crate) fn cancelled(msg: &str) -> BigtableError {
    BigtableError::new(BigtableErrorCode::Cancelled, msg)
}

macro_rules! ia_error {
    ($($t:tt)*) => {{
        let m = format!($($t)*);
        BigtableError {
            code: crate::error::BigtableErrorCode::InvalidArgument,
            message: format!("{} ({})", m, crate::error::sdk_version()),
        }
    }};
}

pub(crate) use ia_error;

macro_rules! ia_err {
    ($($t:tt)*) => {{
        let m = format!($($t)*);
        Err(BigtableError {
            code: crate::error::BigtableErrorCode::InvalidArgument,
            message: format!("{} ({})", m, crate::error::sdk_version()),
        })
    }};
}

pub(crate) use ia_err;

impl From<reqwest::Error> for BigtableError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            BigtableErrorCode::DeadlineExceeded
        } else if e.is_connect() {
            BigtableErrorCode::Unavailable
        } else if e.is_decode() {
            BigtableErrorCode::Internal
        } else {
            BigtableErrorCode::Unknown
        };
        BigtableError {
            code,
            message: format!("reqwest error: {} ({})", e, sdk_version()),
        }
    }
}

impl From<reqwest::header::InvalidHeaderValue> for BigtableError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        ia_error!("invalid header value: {}", e)
    }
}

impl From<url::ParseError> for BigtableError {
    fn from(e: url::ParseError) -> Self {
        ia_error!("error parsing url: {}", e)
    }
}

impl From<serde_json::Error> for BigtableError {
    fn from(e: serde_json::Error) -> Self {
        BigtableError {
            code: BigtableErrorCode::Internal,
            message: format!("cannot decode response: {} ({})", e, sdk_version()),
        }
    }
}

// BigtableErrorCode mirrors the canonical RPC status codes used by the
// service. Only Unavailable, DeadlineExceeded and Aborted are treated as
// transient; every other non-OK code is permanent. Cancelled is reserved
// for operations that were still pending when their completion queue shut
// down or was dropped.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum BigtableErrorCode {
    /// Ok represents there is no error.
    Ok = 0,

    /// Cancelled represents the operation was cancelled before it completed,
    /// typically because its completion queue was shut down or dropped.
    Cancelled = 1,

    /// Unknown represents an error that could not be classified.
    Unknown = 2,

    /// InvalidArgument represents the application provided an illegal
    /// argument for the operation.
    InvalidArgument = 3,

    /// DeadlineExceeded represents the request did not complete within its
    /// deadline. This is retried.
    DeadlineExceeded = 4,

    /// NotFound represents the operation attempted to access a table or other
    /// resource that does not exist.
    NotFound = 5,

    /// AlreadyExists represents the operation attempted to create a table
    /// or resource that already exists.
    AlreadyExists = 6,

    /// PermissionDenied represents the caller lacks permission for the operation.
    PermissionDenied = 7,

    /// ResourceExhausted represents a quota or rate limit was exceeded.
    ResourceExhausted = 8,

    /// FailedPrecondition represents the system is not in a state required
    /// for the operation.
    FailedPrecondition = 9,

    /// Aborted represents a concurrency conflict on the service side.
    /// This is retried.
    Aborted = 10,

    /// OutOfRange represents an operation past the valid range.
    OutOfRange = 11,

    /// Unimplemented represents the operation is not supported by the service.
    Unimplemented = 12,

    /// Internal represents an internal problem in the service or in this
    /// library (for example, an undecodable response).
    Internal = 13,

    /// Unavailable represents the service is currently unavailable.
    /// This is usually temporary and is retried.
    Unavailable = 14,

    /// DataLoss represents unrecoverable data loss or corruption.
    DataLoss = 15,

    /// Unauthenticated represents missing or invalid credentials.
    Unauthenticated = 16,
}

impl BigtableErrorCode {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BigtableErrorCode::Unavailable
                | BigtableErrorCode::DeadlineExceeded
                | BigtableErrorCode::Aborted
        )
    }

    /// Map the `status` string of a service error body, e.g. `"NOT_FOUND"`.
    pub fn from_status_name(name: &str) -> BigtableErrorCode {
        match name {
            "OK" => BigtableErrorCode::Ok,
            "CANCELLED" => BigtableErrorCode::Cancelled,
            "INVALID_ARGUMENT" => BigtableErrorCode::InvalidArgument,
            "DEADLINE_EXCEEDED" => BigtableErrorCode::DeadlineExceeded,
            "NOT_FOUND" => BigtableErrorCode::NotFound,
            "ALREADY_EXISTS" => BigtableErrorCode::AlreadyExists,
            "PERMISSION_DENIED" => BigtableErrorCode::PermissionDenied,
            "RESOURCE_EXHAUSTED" => BigtableErrorCode::ResourceExhausted,
            "FAILED_PRECONDITION" => BigtableErrorCode::FailedPrecondition,
            "ABORTED" => BigtableErrorCode::Aborted,
            "OUT_OF_RANGE" => BigtableErrorCode::OutOfRange,
            "UNIMPLEMENTED" => BigtableErrorCode::Unimplemented,
            "INTERNAL" => BigtableErrorCode::Internal,
            "UNAVAILABLE" => BigtableErrorCode::Unavailable,
            "DATA_LOSS" => BigtableErrorCode::DataLoss,
            "UNAUTHENTICATED" => BigtableErrorCode::Unauthenticated,
            _ => BigtableErrorCode::Unknown,
        }
    }

    /// Map an HTTP status when the response carries no usable error body.
    pub fn from_http_status(status: u16) -> BigtableErrorCode {
        match status {
            200..=299 => BigtableErrorCode::Ok,
            400 => BigtableErrorCode::InvalidArgument,
            401 => BigtableErrorCode::Unauthenticated,
            403 => BigtableErrorCode::PermissionDenied,
            404 => BigtableErrorCode::NotFound,
            409 => BigtableErrorCode::AlreadyExists,
            429 => BigtableErrorCode::ResourceExhausted,
            499 => BigtableErrorCode::Cancelled,
            500 => BigtableErrorCode::Internal,
            501 => BigtableErrorCode::Unimplemented,
            503 => BigtableErrorCode::Unavailable,
            504 => BigtableErrorCode::DeadlineExceeded,
            _ => BigtableErrorCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes() {
        assert!(BigtableErrorCode::Unavailable.is_transient());
        assert!(BigtableErrorCode::DeadlineExceeded.is_transient());
        assert!(BigtableErrorCode::Aborted.is_transient());
        assert!(!BigtableErrorCode::NotFound.is_transient());
        assert!(!BigtableErrorCode::InvalidArgument.is_transient());
        assert!(!BigtableErrorCode::Cancelled.is_transient());
    }

    #[test]
    fn from_int_maps_unknown_values() {
        assert_eq!(
            BigtableError::from_int(5, "x").code,
            BigtableErrorCode::NotFound
        );
        let e = BigtableError::from_int(99, "x");
        assert_eq!(e.code, BigtableErrorCode::Unknown);
        assert!(e.message.contains("99"));
    }

    #[test]
    fn status_names_and_http_codes() {
        assert_eq!(
            BigtableErrorCode::from_status_name("ALREADY_EXISTS"),
            BigtableErrorCode::AlreadyExists
        );
        assert_eq!(
            BigtableErrorCode::from_status_name("bogus"),
            BigtableErrorCode::Unknown
        );
        assert_eq!(
            BigtableErrorCode::from_http_status(503),
            BigtableErrorCode::Unavailable
        );
        assert_eq!(
            BigtableErrorCode::from_http_status(418),
            BigtableErrorCode::Unknown
        );
    }

    #[test]
    fn ia_err_appends_version() {
        let r: Result<(), BigtableError> = ia_err!("bad table id '{}'", "x y");
        let e = r.unwrap_err();
        assert_eq!(e.code, BigtableErrorCode::InvalidArgument);
        assert!(e.message.contains(sdk_version()));
        assert!(e.to_string().starts_with("code=InvalidArgument"));
    }
}
