use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid invalidation pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_display() {
        let error = CacheError::InvalidPattern {
            pattern: "^(users".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid invalidation pattern `^(users`: unclosed group"
        );
    }
}
