//! Static menu tree
//!
//! Every clickable leaf is either a [`MenuCommand`] handled by the dispatcher
//! or a [`StandardRole`] backed by built-in host behavior. Entry ids are
//! stable strings (`cmd:new-recipe`, `role:quit`) so the native menu layer can
//! round-trip them through its own id type.

use crate::DispatchError;
use chef_ipc::FileFilter;

/// Static product metadata shown in the About dialog and Help menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub name: String,
    /// Used in menu labels, e.g. "About Chef Suite"
    pub short_name: String,
    pub version: String,
    pub description: String,
    pub copyright: String,
    pub documentation_url: String,
    pub support_url: String,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            name: "Chef Suite Professional".to_string(),
            short_name: "Chef Suite".to_string(),
            version: "1.0.0".to_string(),
            description: "Culinary Operations Management System".to_string(),
            copyright: "© 2025 Brenham Country Club\nAll rights reserved.".to_string(),
            documentation_url: "https://chef-suite-docs.brenhamcc.com".to_string(),
            support_url: "mailto:support@brenhamcc.com".to_string(),
        }
    }
}

/// Application-specific menu commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuCommand {
    NewRecipe,
    ImportData,
    ExportData,
    Documentation,
    Support,
    About,
}

impl MenuCommand {
    pub const ALL: [MenuCommand; 6] = [
        MenuCommand::NewRecipe,
        MenuCommand::ImportData,
        MenuCommand::ExportData,
        MenuCommand::Documentation,
        MenuCommand::Support,
        MenuCommand::About,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NewRecipe => "new-recipe",
            Self::ImportData => "import-data",
            Self::ExportData => "export-data",
            Self::Documentation => "documentation",
            Self::Support => "support",
            Self::About => "about",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Built-in host behaviors reachable from the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardRole {
    Quit,
    Undo,
    Redo,
    Cut,
    Copy,
    Paste,
    SelectAll,
    Reload,
    ForceReload,
    ToggleDevTools,
    ResetZoom,
    ZoomIn,
    ZoomOut,
    ToggleFullscreen,
    Minimize,
    Close,
}

impl StandardRole {
    pub const ALL: [StandardRole; 16] = [
        StandardRole::Quit,
        StandardRole::Undo,
        StandardRole::Redo,
        StandardRole::Cut,
        StandardRole::Copy,
        StandardRole::Paste,
        StandardRole::SelectAll,
        StandardRole::Reload,
        StandardRole::ForceReload,
        StandardRole::ToggleDevTools,
        StandardRole::ResetZoom,
        StandardRole::ZoomIn,
        StandardRole::ZoomOut,
        StandardRole::ToggleFullscreen,
        StandardRole::Minimize,
        StandardRole::Close,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Cut => "cut",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::SelectAll => "select-all",
            Self::Reload => "reload",
            Self::ForceReload => "force-reload",
            Self::ToggleDevTools => "toggle-dev-tools",
            Self::ResetZoom => "reset-zoom",
            Self::ZoomIn => "zoom-in",
            Self::ZoomOut => "zoom-out",
            Self::ToggleFullscreen => "toggle-fullscreen",
            Self::Minimize => "minimize",
            Self::Close => "close",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Quit => "Quit",
            Self::Undo => "Undo",
            Self::Redo => "Redo",
            Self::Cut => "Cut",
            Self::Copy => "Copy",
            Self::Paste => "Paste",
            Self::SelectAll => "Select All",
            Self::Reload => "Reload",
            Self::ForceReload => "Force Reload",
            Self::ToggleDevTools => "Toggle Developer Tools",
            Self::ResetZoom => "Actual Size",
            Self::ZoomIn => "Zoom In",
            Self::ZoomOut => "Zoom Out",
            Self::ToggleFullscreen => "Toggle Full Screen",
            Self::Minimize => "Minimize",
            Self::Close => "Close",
        }
    }

    pub fn accelerator(&self) -> Option<&'static str> {
        match self {
            Self::Quit => Some("CmdOrCtrl+Q"),
            Self::Reload => Some("CmdOrCtrl+R"),
            Self::ForceReload => Some("CmdOrCtrl+Shift+R"),
            Self::ToggleDevTools => Some("CmdOrCtrl+Alt+I"),
            Self::ResetZoom => Some("CmdOrCtrl+0"),
            Self::ZoomIn => Some("CmdOrCtrl+Equal"),
            Self::ZoomOut => Some("CmdOrCtrl+Minus"),
            Self::ToggleFullscreen => Some("F11"),
            Self::Minimize => Some("CmdOrCtrl+M"),
            Self::Close => Some("CmdOrCtrl+W"),
            _ => None,
        }
    }

    /// Text-editing roles the native menu layer implements on its own
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            Self::Undo | Self::Redo | Self::Cut | Self::Copy | Self::Paste | Self::SelectAll
        )
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

/// Identity of a clickable leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuEntryId {
    Command(MenuCommand),
    Role(StandardRole),
}

impl MenuEntryId {
    pub fn parse(id: &str) -> Result<Self, DispatchError> {
        let parsed = if let Some(name) = id.strip_prefix("cmd:") {
            MenuCommand::from_name(name).map(Self::Command)
        } else if let Some(name) = id.strip_prefix("role:") {
            StandardRole::from_name(name).map(Self::Role)
        } else {
            None
        };
        parsed.ok_or_else(|| DispatchError::unknown_entry(id))
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Command(command) => format!("cmd:{}", command.name()),
            Self::Role(role) => format!("role:{}", role.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Command {
        command: MenuCommand,
        label: String,
        accelerator: Option<String>,
    },
    Role(StandardRole),
    Separator,
}

impl MenuEntry {
    fn command(command: MenuCommand, label: impl Into<String>) -> Self {
        Self::Command {
            command,
            label: label.into(),
            accelerator: None,
        }
    }

    pub fn id(&self) -> Option<MenuEntryId> {
        match self {
            Self::Command { command, .. } => Some(MenuEntryId::Command(*command)),
            Self::Role(role) => Some(MenuEntryId::Role(*role)),
            Self::Separator => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submenu {
    pub label: String,
    pub entries: Vec<MenuEntry>,
}

/// The application menu. Built once; there are no mutators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSpec {
    submenus: Vec<Submenu>,
}

impl MenuSpec {
    pub fn submenus(&self) -> &[Submenu] {
        &self.submenus
    }

    /// Every clickable leaf, in menu order
    pub fn entry_ids(&self) -> impl Iterator<Item = MenuEntryId> + '_ {
        self.submenus
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter_map(MenuEntry::id)
    }

    pub fn contains(&self, id: MenuEntryId) -> bool {
        self.entry_ids().any(|e| e == id)
    }
}

/// Filters offered by "Import Data"
pub fn import_filters() -> Vec<FileFilter> {
    vec![
        FileFilter::new("Excel Files", &["xlsx", "xls"]),
        FileFilter::new("CSV Files", &["csv"]),
    ]
}

/// Filters offered by "Export Data"
pub fn export_filters() -> Vec<FileFilter> {
    vec![
        FileFilter::new("Excel Files", &["xlsx"]),
        FileFilter::new("CSV Files", &["csv"]),
        FileFilter::new("PDF Reports", &["pdf"]),
    ]
}

pub fn build_menu(product: &ProductInfo) -> MenuSpec {
    use MenuEntry::{Role, Separator};
    use StandardRole::*;

    MenuSpec {
        submenus: vec![
            Submenu {
                label: "File".to_string(),
                entries: vec![
                    MenuEntry::Command {
                        command: MenuCommand::NewRecipe,
                        label: "New Recipe".to_string(),
                        accelerator: Some("CmdOrCtrl+N".to_string()),
                    },
                    Separator,
                    MenuEntry::command(MenuCommand::ImportData, "Import Data"),
                    MenuEntry::command(MenuCommand::ExportData, "Export Data"),
                    Separator,
                    Role(Quit),
                ],
            },
            Submenu {
                label: "Edit".to_string(),
                entries: vec![
                    Role(Undo),
                    Role(Redo),
                    Separator,
                    Role(Cut),
                    Role(Copy),
                    Role(Paste),
                    Role(SelectAll),
                ],
            },
            Submenu {
                label: "View".to_string(),
                entries: vec![
                    Role(Reload),
                    Role(ForceReload),
                    Role(ToggleDevTools),
                    Separator,
                    Role(ResetZoom),
                    Role(ZoomIn),
                    Role(ZoomOut),
                    Separator,
                    Role(ToggleFullscreen),
                ],
            },
            Submenu {
                label: "Window".to_string(),
                entries: vec![Role(Minimize), Role(Close)],
            },
            Submenu {
                label: "Help".to_string(),
                entries: vec![
                    MenuEntry::command(MenuCommand::Documentation, "Documentation"),
                    MenuEntry::command(MenuCommand::Support, "Support"),
                    Separator,
                    MenuEntry::command(MenuCommand::About, format!("About {}", product.short_name)),
                ],
            },
        ],
    }
}

// ============================================================================
// Tests
// ============================================================================
