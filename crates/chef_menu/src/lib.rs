//! Application menu and the commands behind it
//!
//! [`build_menu`] produces the static [`MenuSpec`] once at startup. Clicks come
//! back as [`MenuEntryId`]s and go through [`CommandDispatcher`], which either
//! pushes a [`chef_ipc::BridgeEvent`] to the surface or hands a [`HostAction`]
//! back to the host loop.

pub mod dispatcher;
pub mod menu;

pub use dispatcher::{
    validate_external_url, AboutInfo, CommandDispatcher, DispatchOutcome, HostAction,
};
pub use menu::{
    build_menu, export_filters, import_filters, MenuCommand, MenuEntry, MenuEntryId, MenuSpec,
    ProductInfo, StandardRole, Submenu,
};

// ============================================================================
// Error Types (6000+ range)
// ============================================================================

/// Error codes for menu dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DispatchErrorCode {
    /// Menu id not present in the menu tree
    UnknownEntry = 6000,
    /// File dialog failed while serving a menu command
    DialogFailed = 6001,
    /// External link with a disallowed scheme
    InvalidLink = 6002,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("[{code}] Unknown menu entry: {id}")]
    UnknownEntry { code: u32, id: String },

    #[error("[{code}] Dialog failed: {message}")]
    DialogFailed { code: u32, message: String },

    #[error("[{code}] Invalid link: {message}")]
    InvalidLink { code: u32, message: String },
}

impl DispatchError {
    pub fn unknown_entry(id: impl Into<String>) -> Self {
        Self::UnknownEntry {
            code: DispatchErrorCode::UnknownEntry as u32,
            id: id.into(),
        }
    }

    pub fn dialog_failed(message: impl Into<String>) -> Self {
        Self::DialogFailed {
            code: DispatchErrorCode::DialogFailed as u32,
            message: message.into(),
        }
    }

    pub fn invalid_link(message: impl Into<String>) -> Self {
        Self::InvalidLink {
            code: DispatchErrorCode::InvalidLink as u32,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::UnknownEntry { code, .. }
            | Self::DialogFailed { code, .. }
            | Self::InvalidLink { code, .. } => *code,
        }
    }
}

impl From<chef_ipc::BridgeError> for DispatchError {
    fn from(e: chef_ipc::BridgeError) -> Self {
        Self::dialog_failed(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
