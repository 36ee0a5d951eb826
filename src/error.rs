use std::fmt;

use crate::ldap::DirectoryError;

/// Request-level error raised by the mapping core.
///
/// Each kind carries the HTTP-style status code the transport is expected
/// to serialize it with.
#[derive(Debug, Clone, PartialEq)]
pub enum ScimError {
    InvalidFilter(String),
    InvalidResource(String),
    InvalidAttributeValue(String),
    InvalidSort(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    PreconditionFailed(String),
    ServerError(String),
    ServiceUnavailable(String),
    Configuration(String),
    Cancelled,
}

impl ScimError {
    pub fn status_code(&self) -> u16 {
        match self {
            ScimError::InvalidFilter(_)
            | ScimError::InvalidResource(_)
            | ScimError::InvalidAttributeValue(_)
            | ScimError::InvalidSort(_) => 400,
            ScimError::Unauthorized(_) => 401,
            ScimError::Forbidden(_) => 403,
            ScimError::NotFound(_) => 404,
            ScimError::Conflict(_) => 409,
            ScimError::PreconditionFailed(_) => 412,
            ScimError::ServerError(_) | ScimError::Configuration(_) => 500,
            ScimError::ServiceUnavailable(_) => 503,
            ScimError::Cancelled => 499,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ScimError::InvalidFilter(m)
            | ScimError::InvalidResource(m)
            | ScimError::InvalidAttributeValue(m)
            | ScimError::InvalidSort(m)
            | ScimError::Unauthorized(m)
            | ScimError::Forbidden(m)
            | ScimError::NotFound(m)
            | ScimError::Conflict(m)
            | ScimError::PreconditionFailed(m)
            | ScimError::ServerError(m)
            | ScimError::ServiceUnavailable(m)
            | ScimError::Configuration(m) => m,
            ScimError::Cancelled => "Request cancelled",
        }
    }

    /// Rebuild an error from a status code carried on the wire, e.g. when
    /// parsing an `<Error>` document received from a peer gateway.
    pub fn from_status(status: u16, detail: String) -> ScimError {
        match status {
            400 => ScimError::InvalidResource(detail),
            401 => ScimError::Unauthorized(detail),
            403 => ScimError::Forbidden(detail),
            404 => ScimError::NotFound(detail),
            409 => ScimError::Conflict(detail),
            412 => ScimError::PreconditionFailed(detail),
            503 => ScimError::ServiceUnavailable(detail),
            _ => ScimError::ServerError(detail),
        }
    }
}

impl fmt::Display for ScimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScimError::InvalidFilter(m) => write!(f, "Invalid filter: {}", m),
            ScimError::InvalidResource(m) => write!(f, "Invalid resource: {}", m),
            ScimError::InvalidAttributeValue(m) => write!(f, "Invalid attribute value: {}", m),
            ScimError::InvalidSort(m) => write!(f, "Invalid sort: {}", m),
            ScimError::Unauthorized(m) => write!(f, "Unauthorized: {}", m),
            ScimError::Forbidden(m) => write!(f, "Forbidden: {}", m),
            ScimError::NotFound(m) => write!(f, "Not found: {}", m),
            ScimError::Conflict(m) => write!(f, "Conflict: {}", m),
            ScimError::PreconditionFailed(m) => write!(f, "Precondition failed: {}", m),
            ScimError::ServerError(m) => write!(f, "Server error: {}", m),
            ScimError::ServiceUnavailable(m) => write!(f, "Service unavailable: {}", m),
            ScimError::Configuration(m) => write!(f, "Configuration error: {}", m),
            ScimError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for ScimError {}

// LDAP result codes with a direct SCIM mapping. Everything else is a server
// error except connection-level failures, which map to 503.
impl From<DirectoryError> for ScimError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Cancelled => ScimError::Cancelled,
            DirectoryError::ConnectionFailure(message) => {
                tracing::warn!(error = %message, "directory connection failure");
                ScimError::ServiceUnavailable(message)
            }
            DirectoryError::Directory {
                result_code,
                message,
            } => {
                tracing::warn!(result_code, error = %message, "directory operation failed");
                match result_code {
                    32 => ScimError::NotFound(message),
                    49 => ScimError::Unauthorized(message),
                    50 => ScimError::Forbidden(message),
                    68 => ScimError::Conflict(message),
                    51 | 52 | 81 | 91 => ScimError::ServiceUnavailable(message),
                    _ => ScimError::ServerError(message),
                }
            }
        }
    }
}

pub type ScimResult<T> = Result<T, ScimError>;
