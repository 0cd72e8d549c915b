//! File dialog requests and results
//!
//! Dialogs are shown by the host loop that owns the rendering surface.
//! Callers hold a [`Dialogs`] handle and await the outcome; the host side
//! drains [`DialogCmd`]s and answers through the embedded responder.

use crate::BridgeError;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Named file-type filter, e.g. `CSV Files: [csv]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenDialogOptions {
    pub title: Option<String>,
    pub default_path: Option<String>,
    pub filters: Vec<FileFilter>,
    pub multi_select: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveDialogOptions {
    pub title: Option<String>,
    pub default_path: Option<String>,
    pub filters: Vec<FileFilter>,
}

/// Outcome of a dialog. Cancellation is a successful result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum DialogResult<T> {
    Cancelled,
    Chosen(T),
}

impl<T> DialogResult<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn chosen(self) -> Option<T> {
        match self {
            Self::Cancelled => None,
            Self::Chosen(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for DialogResult<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Cancelled, Self::Chosen)
    }
}

pub type OpenDialogResult = DialogResult<Vec<String>>;
pub type SaveDialogResult = DialogResult<String>;

/// Dialog request routed to the host loop
#[derive(Debug)]
pub enum DialogCmd {
    Open {
        opts: OpenDialogOptions,
        respond: oneshot::Sender<Result<OpenDialogResult, String>>,
    },
    Save {
        opts: SaveDialogOptions,
        respond: oneshot::Sender<Result<SaveDialogResult, String>>,
    },
}

/// Caller-side handle to the host's dialog facility
#[derive(Debug, Clone)]
pub struct Dialogs {
    tx: mpsc::Sender<DialogCmd>,
}

impl Dialogs {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DialogCmd>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn open(&self, opts: OpenDialogOptions) -> Result<OpenDialogResult, BridgeError> {
        let (respond, rx) = oneshot::channel();
        self.send(DialogCmd::Open { opts, respond }).await?;
        Self::settle(rx.await)
    }

    pub async fn save(&self, opts: SaveDialogOptions) -> Result<SaveDialogResult, BridgeError> {
        let (respond, rx) = oneshot::channel();
        self.send(DialogCmd::Save { opts, respond }).await?;
        Self::settle(rx.await)
    }

    async fn send(&self, cmd: DialogCmd) -> Result<(), BridgeError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|e| BridgeError::channel_send(format!("dialog host unavailable: {}", e)))
    }

    fn settle<T>(
        outcome: Result<Result<T, String>, oneshot::error::RecvError>,
    ) -> Result<T, BridgeError> {
        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(BridgeError::dialog_failed(message)),
            Err(_) => Err(BridgeError::dialog_failed("dialog closed without a result")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
