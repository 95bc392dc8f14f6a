use super::types::AuditError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl AuditError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Transient: the same call may succeed a moment later
            AuditError::Navigation(_) => ErrorClassification {
                error_type: "NavigationError",
                retryable: true,
            },
            AuditError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            AuditError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            AuditError::Browser(_) => ErrorClassification {
                error_type: "BrowserError",
                retryable: true,
            },
            AuditError::Figma(_) => ErrorClassification {
                error_type: "FigmaError",
                retryable: true,
            },
            AuditError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: true,
            },
            AuditError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },

            // Permanent
            AuditError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            AuditError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                retryable: false,
            },
            AuditError::InvalidState(_) => ErrorClassification {
                error_type: "InvalidStateError",
                retryable: false,
            },
            AuditError::NotFound(_) => ErrorClassification {
                error_type: "NotFoundError",
                retryable: false,
            },
            AuditError::Cancelled(_) => ErrorClassification {
                error_type: "CancelledError",
                retryable: false,
            },
            AuditError::Image(_) => ErrorClassification {
                error_type: "ImageError",
                retryable: false,
            },
            AuditError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            AuditError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            AuditError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }
}
