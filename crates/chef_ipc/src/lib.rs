//! Host <-> rendering surface plumbing
//!
//! - [`SecureBridge`]: the closed set of privileged operations the surface may
//!   invoke, each resolving exactly once.
//! - [`EventChannel`]: fire-and-forget pushes from host to surface.
//! - [`Dialogs`]: async file dialogs served by whoever owns the surface.

pub mod bridge;
pub mod dialog;
pub mod events;

pub use bridge::{platform_id, AppInfo, BridgeOp, BridgeRequest, BridgeResponse, SecureBridge};
pub use dialog::{
    DialogCmd, DialogResult, Dialogs, FileFilter, OpenDialogOptions, OpenDialogResult,
    SaveDialogOptions, SaveDialogResult,
};
pub use events::{BridgeEvent, Delivery, EventChannel, EventListener};

// ============================================================================
// Error Types (7000+ range)
// ============================================================================

/// Error codes for bridge operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BridgeErrorCode {
    /// The host side of a channel is gone
    ChannelSend = 7000,
    /// Malformed request envelope or payload
    InvalidRequest = 7001,
    /// Operation name outside the bridge table
    UnknownOperation = 7002,
    /// Dialog subsystem failed or dropped the request
    DialogFailed = 7003,
    /// Request exceeded the configured timeout
    Timeout = 7004,
}

/// Failure reason carried back to the rendering surface
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("[{code}] Channel send error: {message}")]
    ChannelSend { code: u32, message: String },

    #[error("[{code}] Invalid request: {message}")]
    InvalidRequest { code: u32, message: String },

    #[error("[{code}] Unknown operation: {op}")]
    UnknownOperation { code: u32, op: String },

    #[error("[{code}] Dialog failed: {message}")]
    DialogFailed { code: u32, message: String },

    #[error("[{code}] Timed out after {millis}ms: {op}")]
    Timeout { code: u32, op: String, millis: u64 },
}

impl BridgeError {
    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            code: BridgeErrorCode::ChannelSend as u32,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            code: BridgeErrorCode::InvalidRequest as u32,
            message: message.into(),
        }
    }

    pub fn unknown_operation(op: impl Into<String>) -> Self {
        Self::UnknownOperation {
            code: BridgeErrorCode::UnknownOperation as u32,
            op: op.into(),
        }
    }

    pub fn dialog_failed(message: impl Into<String>) -> Self {
        Self::DialogFailed {
            code: BridgeErrorCode::DialogFailed as u32,
            message: message.into(),
        }
    }

    pub fn timeout(op: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            code: BridgeErrorCode::Timeout as u32,
            op: op.into(),
            millis,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::ChannelSend { code, .. }
            | Self::InvalidRequest { code, .. }
            | Self::UnknownOperation { code, .. }
            | Self::DialogFailed { code, .. }
            | Self::Timeout { code, .. } => *code,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
