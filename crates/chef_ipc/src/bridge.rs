//! The privileged operation table
//!
//! [`BridgeOp`] is the whole surface the rendering context can reach. Adding
//! a capability means adding a variant here and an arm in
//! [`SecureBridge::execute`]; there is no passthrough.

use crate::dialog::{Dialogs, OpenDialogOptions, SaveDialogOptions};
use crate::BridgeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Operation names accepted from the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeOp {
    GetAppVersion,
    GetPlatform,
    ShowSaveDialog,
    ShowOpenDialog,
}

impl BridgeOp {
    pub const ALL: [BridgeOp; 4] = [
        BridgeOp::GetAppVersion,
        BridgeOp::GetPlatform,
        BridgeOp::ShowSaveDialog,
        BridgeOp::ShowOpenDialog,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAppVersion => "getAppVersion",
            Self::GetPlatform => "getPlatform",
            Self::ShowSaveDialog => "showSaveDialog",
            Self::ShowOpenDialog => "showOpenDialog",
        }
    }
}

/// A decoded request with its operation-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    GetAppVersion,
    GetPlatform,
    ShowSaveDialog(SaveDialogOptions),
    ShowOpenDialog(OpenDialogOptions),
}

impl BridgeRequest {
    pub fn op(&self) -> BridgeOp {
        match self {
            Self::GetAppVersion => BridgeOp::GetAppVersion,
            Self::GetPlatform => BridgeOp::GetPlatform,
            Self::ShowSaveDialog(_) => BridgeOp::ShowSaveDialog,
            Self::ShowOpenDialog(_) => BridgeOp::ShowOpenDialog,
        }
    }

    /// Decode the `op`/`payload` pair posted by the surface
    pub fn from_wire(op: &str, payload: Value) -> Result<Self, BridgeError> {
        let op: BridgeOp = serde_json::from_value(Value::String(op.to_string()))
            .map_err(|_| BridgeError::unknown_operation(op))?;

        Ok(match op {
            BridgeOp::GetAppVersion => Self::GetAppVersion,
            BridgeOp::GetPlatform => Self::GetPlatform,
            BridgeOp::ShowSaveDialog => Self::ShowSaveDialog(options(payload)?),
            BridgeOp::ShowOpenDialog => Self::ShowOpenDialog(options(payload)?),
        })
    }
}

fn options<T: DeserializeOwned + Default>(payload: Value) -> Result<T, BridgeError> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|e| BridgeError::invalid_request(e.to_string()))
}

/// Envelope posted by the surface's preload script
#[derive(Debug, Deserialize)]
struct WireRequest {
    id: u64,
    op: String,
    #[serde(default)]
    payload: Value,
}

/// Exactly one of these is produced per request id
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeResponse {
    pub id: u64,
    pub outcome: Result<Value, BridgeError>,
}

impl BridgeResponse {
    pub fn failure(id: u64, error: BridgeError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    pub fn to_json(&self) -> Value {
        match &self.outcome {
            Ok(value) => json!({ "id": self.id, "ok": true, "value": value }),
            Err(error) => json!({
                "id": self.id,
                "ok": false,
                "error": { "code": error.code(), "message": error.to_string() },
            }),
        }
    }
}

/// Platform identifier in the surface's vocabulary (`darwin`, `win32`, `linux`, ...)
pub fn platform_id() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Host metadata served by the pure-read operations
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl AppInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            platform: platform_id().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecureBridge {
    info: Arc<AppInfo>,
    dialogs: Dialogs,
    timeout: Option<Duration>,
}

impl SecureBridge {
    pub fn new(info: AppInfo, dialogs: Dialogs) -> Self {
        Self {
            info: Arc::new(info),
            dialogs,
            timeout: None,
        }
    }

    /// Bound every request; `None` waits as long as the user keeps a dialog open
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn info(&self) -> &AppInfo {
        &self.info
    }

    /// Handle one raw message from the surface.
    ///
    /// Returns `None` only when the message has no readable `id`, since there
    /// is then nobody to answer.
    pub async fn handle_message(&self, raw: &str) -> Option<BridgeResponse> {
        let request: WireRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(e) => {
                let id = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("id").and_then(Value::as_u64));
                warn!(?id, error = %e, "malformed bridge message");
                return id.map(|id| {
                    BridgeResponse::failure(id, BridgeError::invalid_request(e.to_string()))
                });
            }
        };

        let outcome = match BridgeRequest::from_wire(&request.op, request.payload) {
            Ok(decoded) => self.dispatch(decoded).await,
            Err(e) => {
                warn!(id = request.id, op = %request.op, error = %e, "rejected bridge request");
                Err(e)
            }
        };

        Some(BridgeResponse {
            id: request.id,
            outcome,
        })
    }

    /// Run one request to completion, applying the timeout if configured
    pub async fn dispatch(&self, request: BridgeRequest) -> Result<Value, BridgeError> {
        let op = request.op();
        debug!(op = op.name(), "bridge.dispatch");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(request))
                .await
                .map_err(|_| BridgeError::timeout(op.name(), limit.as_millis() as u64))?,
            None => self.execute(request).await,
        }
    }

    async fn execute(&self, request: BridgeRequest) -> Result<Value, BridgeError> {
        match request {
            BridgeRequest::GetAppVersion => Ok(json!(self.info.version)),
            BridgeRequest::GetPlatform => Ok(json!(self.info.platform)),
            BridgeRequest::ShowSaveDialog(opts) => {
                let result = self.dialogs.save(opts).await?;
                Ok(json!(result))
            }
            BridgeRequest::ShowOpenDialog(opts) => {
                let result = self.dialogs.open(opts).await?;
                Ok(json!(result))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
