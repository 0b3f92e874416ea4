//! Error types with rich context
//!
//! Each orchestrator component translates subprocess and socket failures into
//! its own small error enum at its boundary. [`Error`] wraps all of them for
//! callers that only need "something went wrong" plus the I/O and
//! configuration errors of startup.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

// ─────────────────────────────────────────────────────────────────
// Component Errors
// ─────────────────────────────────────────────────────────────────

/// Failure invoking an external tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("{tool} not found. Ensure it is installed and on your PATH.")]
    NotFound { tool: String },

    #[error("{tool} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Failed to run {tool}: {reason}")]
    Spawn { tool: String, reason: String },
}

/// Failure sweeping the local network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("No active network interface with a private IPv4 address")]
    NoInterface,

    #[error("Invalid subnet: {0}")]
    InvalidSubnet(String),

    #[error("A network scan is already in progress")]
    ScanInProgress,
}

/// Failure connecting the bridge to a network device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Device requires authorization: {0}")]
    AuthRequired(String),

    #[error("Connection timed out")]
    Timeout,
}

/// Terminal failure reason of a pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PairingFailure {
    #[error("invalid pairing code")]
    InvalidCode,

    #[error("device unreachable")]
    Unreachable,

    #[error("pairing rejected")]
    Rejected,

    #[error("pairing timed out")]
    Timeout,
}

/// Failure launching the mirroring tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("Device {0} is not online")]
    DeviceNotOnline(String),

    #[error("Mirroring tool not found. Install scrcpy and ensure it is on your PATH.")]
    ToolMissing,

    #[error("Mirroring is already running for {0}. Use force to start a new session.")]
    AlreadyRunning(String),

    #[error("Failed to launch mirroring: {0}")]
    Spawn(String),
}

/// Failure starting a QR pairing advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrError {
    #[error("Failed to open pairing port: {0}")]
    Bind(String),

    #[error("Failed to advertise pairing service: {0}")]
    Advertise(String),

    #[error("Failed to render QR code: {0}")]
    Render(String),
}

// ─────────────────────────────────────────────────────────────────
// Application Error
// ─────────────────────────────────────────────────────────────────

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Component Errors
    // ─────────────────────────────────────────────────────────────
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Conn(#[from] ConnError),

    #[error("Pairing failed: {0}")]
    Pairing(#[from] PairingFailure),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Qr(#[from] QrError),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::NotFound {
            tool: "adb".to_string(),
        };
        assert!(err.to_string().contains("adb not found"));

        let err = ExecError::Timeout {
            tool: "adb".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "adb timed out after 10s");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_component_errors_convert() {
        let err: Error = ScanError::ScanInProgress.into();
        assert!(matches!(err, Error::Scan(ScanError::ScanInProgress)));

        let err: Error = PairingFailure::InvalidCode.into();
        assert_eq!(err.to_string(), "Pairing failed: invalid pairing code");

        let err: Error = QrError::Advertise("no multicast route".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Failed to advertise pairing service: no multicast route"
        );
    }

    #[test]
    fn test_launch_error_messages() {
        let err = LaunchError::DeviceNotOnline("ABC123".to_string());
        assert!(err.to_string().contains("ABC123"));

        let err = LaunchError::AlreadyRunning("ABC123".to_string());
        assert!(err.to_string().contains("force"));
    }
}
