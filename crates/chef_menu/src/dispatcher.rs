//! Menu click -> event push or host action

use crate::menu::{
    export_filters, import_filters, MenuCommand, MenuEntryId, ProductInfo, StandardRole,
};
use crate::DispatchError;
use chef_ipc::{
    BridgeEvent, DialogResult, Dialogs, EventChannel, OpenDialogOptions, SaveDialogOptions,
};
use tracing::{debug, info};

/// Contents of the About dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AboutInfo {
    pub title: String,
    pub message: String,
    pub detail: String,
}

impl AboutInfo {
    pub fn for_product(product: &ProductInfo) -> Self {
        Self {
            title: format!("About {}", product.name),
            message: format!("{} v{}", product.name, product.version),
            detail: format!("{}\n{}", product.description, product.copyright),
        }
    }
}

/// Something only the host loop can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Role(StandardRole),
    OpenExternal(String),
    ShowAbout(AboutInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An event was pushed toward the surface
    Emitted(chef_ipc::Delivery),
    /// The user dismissed the dialog; nothing was emitted
    Cancelled,
    Host(HostAction),
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    dialogs: Dialogs,
    events: EventChannel,
    product: ProductInfo,
}

impl CommandDispatcher {
    pub fn new(dialogs: Dialogs, events: EventChannel, product: ProductInfo) -> Self {
        Self {
            dialogs,
            events,
            product,
        }
    }

    pub fn product(&self) -> &ProductInfo {
        &self.product
    }

    /// Dispatch a raw menu id as reported by the native menu layer
    pub async fn dispatch_id(&self, id: &str) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch(MenuEntryId::parse(id)?).await
    }

    pub async fn dispatch(&self, entry: MenuEntryId) -> Result<DispatchOutcome, DispatchError> {
        debug!(entry = %entry.as_string(), "menu.dispatch");
        match entry {
            MenuEntryId::Role(role) => Ok(DispatchOutcome::Host(HostAction::Role(role))),
            MenuEntryId::Command(command) => self.run(command).await,
        }
    }

    async fn run(&self, command: MenuCommand) -> Result<DispatchOutcome, DispatchError> {
        match command {
            MenuCommand::NewRecipe => Ok(DispatchOutcome::Emitted(
                self.events
                    .emit(BridgeEvent::MenuAction(command.name().to_string())),
            )),
            MenuCommand::ImportData => {
                let opts = OpenDialogOptions {
                    filters: import_filters(),
                    ..Default::default()
                };
                match self.dialogs.open(opts).await? {
                    DialogResult::Chosen(paths) => match paths.into_iter().next() {
                        Some(path) => {
                            info!(path = %path, "import requested");
                            Ok(DispatchOutcome::Emitted(
                                self.events.emit(BridgeEvent::ImportFile(path)),
                            ))
                        }
                        None => Ok(DispatchOutcome::Cancelled),
                    },
                    DialogResult::Cancelled => Ok(DispatchOutcome::Cancelled),
                }
            }
            MenuCommand::ExportData => {
                let opts = SaveDialogOptions {
                    filters: export_filters(),
                    ..Default::default()
                };
                match self.dialogs.save(opts).await? {
                    DialogResult::Chosen(path) => {
                        info!(path = %path, "export requested");
                        Ok(DispatchOutcome::Emitted(
                            self.events.emit(BridgeEvent::ExportFile(path)),
                        ))
                    }
                    DialogResult::Cancelled => Ok(DispatchOutcome::Cancelled),
                }
            }
            MenuCommand::Documentation => external(&self.product.documentation_url),
            MenuCommand::Support => external(&self.product.support_url),
            MenuCommand::About => Ok(DispatchOutcome::Host(HostAction::ShowAbout(
                AboutInfo::for_product(&self.product),
            ))),
        }
    }
}

fn external(url: &str) -> Result<DispatchOutcome, DispatchError> {
    validate_external_url(url)?;
    Ok(DispatchOutcome::Host(HostAction::OpenExternal(url.to_string())))
}

/// Only web and mail targets may leave the app
pub fn validate_external_url(url: &str) -> Result<(), DispatchError> {
    if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("mailto:") {
        return Err(DispatchError::invalid_link(format!(
            "URL must start with http://, https://, or mailto: - got: {}",
            url
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
