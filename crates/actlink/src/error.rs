//! Error types for action-chain operations.

use std::io;

/// Result type for action-chain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, parsing, or sending action
/// chain messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message or struct was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A required attribute was absent.
    #[error("missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// An attribute failed its policy minimum-length check.
    #[error("malformed attribute {kind}: {len} bytes, minimum {min}")]
    MalformedAttribute {
        /// Attribute type.
        kind: u16,
        /// Payload length on the wire.
        len: usize,
        /// Minimum payload length per policy.
        min: usize,
    },

    /// Appending would exceed the chain capacity.
    #[error("action chain full: limit {limit}")]
    CapacityExceeded {
        /// Maximum number of actions per chain.
        limit: usize,
    },

    /// The target record is not a member of the chain.
    #[error("action not found in chain")]
    NotFound,

    /// A structural bound was violated.
    #[error("out of range: {0}")]
    Range(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 2 | 19), // ENOENT, ENODEV
            Self::NotFound => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 1 | 13),
            _ => false,
        }
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => *errno == 17,
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-2).is_not_found()); // ENOENT
        assert!(Error::from_errno(-19).is_not_found()); // ENODEV
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::from_errno(-17).is_not_found());
    }

    #[test]
    fn test_is_already_exists() {
        assert!(Error::from_errno(-17).is_already_exists()); // EEXIST
        assert!(!Error::from_errno(-2).is_already_exists());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::MissingAttribute("TCA_ACT_KIND");
        assert_eq!(err.to_string(), "missing required attribute: TCA_ACT_KIND");

        let err = Error::MalformedAttribute {
            kind: 1,
            len: 4,
            min: 16,
        };
        assert_eq!(err.to_string(), "malformed attribute 1: 4 bytes, minimum 16");

        let err = Error::CapacityExceeded { limit: 32 };
        assert_eq!(err.to_string(), "action chain full: limit 32");
    }
}
