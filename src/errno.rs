// ABOUTME: Numbered error taxonomy surfaced to operators.
// ABOUTME: Every step failure resolves to a code, a description and an optional clue.

use std::fmt;

/// A stable, numbered error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub code: u32,
    pub description: &'static str,
}

impl ErrorCode {
    pub const fn new(code: u32, description: &'static str) -> Self {
        Self { code, description }
    }

    /// Attach a clue (command output, underlying error text).
    pub fn clue(self, clue: impl Into<String>) -> CodedError {
        CodedError {
            code: self,
            clue: Some(clue.into()),
        }
    }

    pub fn bare(self) -> CodedError {
        CodedError {
            code: self,
            clue: None,
        }
    }

    /// Whether this is the catch-all for programming/connectivity faults.
    pub fn is_unknown(&self) -> bool {
        self.code == UNKNOWN.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.code)
    }
}

// 0xx: generic
pub const UNKNOWN: ErrorCode = ErrorCode::new(1, "unknown error");
pub const CANCELLED: ErrorCode = ErrorCode::new(2, "operation cancelled by operator");
pub const MISSING_STEP_INPUT: ErrorCode = ErrorCode::new(3, "step input was not produced by an earlier step");
pub const TEMPLATE_RENDER_FAILED: ErrorCode = ErrorCode::new(4, "failed to render command template");

// 1xxxxx: transport
pub const CONNECT_FAILED: ErrorCode = ErrorCode::new(100_001, "failed to connect to remote host");
pub const AUTHENTICATION_FAILED: ErrorCode = ErrorCode::new(100_002, "remote authentication failed");
pub const COMMAND_FAILED: ErrorCode = ErrorCode::new(100_003, "remote command exited with non-zero status");
pub const COMMAND_TIMEOUT: ErrorCode = ErrorCode::new(100_004, "remote command timed out");
pub const UPLOAD_FAILED: ErrorCode = ErrorCode::new(100_005, "failed to upload file");
pub const DOWNLOAD_FAILED: ErrorCode = ErrorCode::new(100_006, "failed to download file");
pub const TRANSPORT_CLOSED: ErrorCode = ErrorCode::new(100_007, "transport connection closed unexpectedly");

// 2xxxxx: state store
pub const STORAGE_FAILED: ErrorCode = ErrorCode::new(200_001, "state store operation failed");
pub const DECODE_FAILED: ErrorCode = ErrorCode::new(200_002, "failed to decode persisted value");

// 3xxxxx: container engine
pub const CREATE_CONTAINER_FAILED: ErrorCode = ErrorCode::new(300_001, "failed to create container");
pub const START_CONTAINER_FAILED: ErrorCode = ErrorCode::new(300_002, "failed to start container");
pub const STOP_CONTAINER_FAILED: ErrorCode = ErrorCode::new(300_003, "failed to stop container");
pub const REMOVE_CONTAINER_FAILED: ErrorCode = ErrorCode::new(300_004, "failed to remove container");
pub const PULL_IMAGE_FAILED: ErrorCode = ErrorCode::new(300_005, "failed to pull image");
pub const CONTAINER_LOSED: ErrorCode = ErrorCode::new(300_006, "container recorded in store is missing on host");
pub const ENGINE_NOT_FOUND: ErrorCode = ErrorCode::new(300_007, "no container engine found on host");

// 4xxxxx: shell / filesystem
pub const CREATE_DIRECTORY_FAILED: ErrorCode = ErrorCode::new(400_001, "failed to create directory");
pub const REMOVE_FILE_FAILED: ErrorCode = ErrorCode::new(400_002, "failed to remove file or directory");
pub const READ_FILE_FAILED: ErrorCode = ErrorCode::new(400_003, "failed to read file");
pub const INSTALL_FILE_FAILED: ErrorCode = ErrorCode::new(400_004, "failed to install file");
pub const MUTATE_CONFIG_FAILED: ErrorCode = ErrorCode::new(400_005, "failed to rewrite configuration");

// 5xxxxx: preflight checks
pub const PERMISSION_DENIED: ErrorCode = ErrorCode::new(500_001, "permission denied on directory");
pub const KERNEL_VERSION_TOO_LOW: ErrorCode = ErrorCode::new(500_002, "kernel version is lower than required");
pub const KERNEL_MODULE_MISSING: ErrorCode = ErrorCode::new(500_003, "required kernel module is not loaded");
pub const PORT_IN_USE: ErrorCode = ErrorCode::new(500_004, "port is already in use");
pub const CLOCK_SKEW_TOO_LARGE: ErrorCode = ErrorCode::new(500_005, "clock skew between hosts is too large");
pub const DISK_NOT_FORMATTED: ErrorCode = ErrorCode::new(500_006, "disk is not formatted or not mounted");

// 6xxxxx: membership migration
pub const ADD_MEMBER_FAILED: ErrorCode = ErrorCode::new(600_001, "failed to add cluster member");
pub const REMOVE_MEMBER_FAILED: ErrorCode = ErrorCode::new(600_002, "failed to remove cluster member");

/// An error carrying a taxonomy code and optional clue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedError {
    pub code: ErrorCode,
    pub clue: Option<String>,
}

impl CodedError {
    pub fn code(&self) -> u32 {
        self.code.code
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.code.description)?;
        if let Some(clue) = &self.clue {
            let clue = clue.trim();
            if !clue.is_empty() {
                write!(f, " (clue: {clue})")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CodedError {}

impl From<ErrorCode> for CodedError {
    fn from(code: ErrorCode) -> Self {
        code.bare()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_padded_code_and_clue() {
        let err = PORT_IN_USE.clue("2379");
        assert_eq!(
            err.to_string(),
            "[500004] port is already in use (clue: 2379)"
        );
    }

    #[test]
    fn blank_clue_is_omitted() {
        let err = COMMAND_FAILED.clue("  \n");
        assert_eq!(
            err.to_string(),
            "[100003] remote command exited with non-zero status"
        );
    }

    #[test]
    fn unknown_is_flagged() {
        assert!(UNKNOWN.is_unknown());
        assert!(!COMMAND_FAILED.is_unknown());
    }
}
