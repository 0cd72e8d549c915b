//! Chef Suite desktop host
//!
//! [`HostController`] owns the single [`AppSession`]: the rendering surface
//! and the backend supervisor whose lifetime is tied to it. Windowing, menus
//! and dialogs sit behind [`HostPlatform`] so the lifecycle can be driven
//! without a display.

pub mod config;
pub mod controller;
pub mod platform;
pub mod surface;

pub use config::{HostConfig, Manifest, MANIFEST_FILE};
pub use controller::{AppSession, HostController, LifecycleAction};
pub use platform::HostPlatform;
pub use surface::{PageGeneration, SurfaceId, SurfaceOptions, SurfaceUrl};

// ============================================================================
// Error Types (9000+ range)
// ============================================================================

/// Error codes for host operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HostErrorCode {
    /// Manifest could not be read or parsed
    Config = 9000,
    /// Window or webview creation failed
    SurfaceFailed = 9001,
    /// Native menu could not be installed
    MenuFailed = 9002,
    /// External link could not be opened
    OpenExternal = 9003,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("[{code}] Configuration error: {message}")]
    Config { code: u32, message: String },

    #[error("[{code}] Failed to create surface: {message}")]
    SurfaceFailed { code: u32, message: String },

    #[error("[{code}] Menu error: {message}")]
    MenuFailed { code: u32, message: String },

    #[error("[{code}] Failed to open {url}: {message}")]
    OpenExternal {
        code: u32,
        url: String,
        message: String,
    },
}

impl HostError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: HostErrorCode::Config as u32,
            message: message.into(),
        }
    }

    pub fn surface_failed(message: impl Into<String>) -> Self {
        Self::SurfaceFailed {
            code: HostErrorCode::SurfaceFailed as u32,
            message: message.into(),
        }
    }

    pub fn menu_failed(message: impl Into<String>) -> Self {
        Self::MenuFailed {
            code: HostErrorCode::MenuFailed as u32,
            message: message.into(),
        }
    }

    pub fn open_external(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenExternal {
            code: HostErrorCode::OpenExternal as u32,
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Config { code, .. }
            | Self::SurfaceFailed { code, .. }
            | Self::MenuFailed { code, .. }
            | Self::OpenExternal { code, .. } => *code,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
