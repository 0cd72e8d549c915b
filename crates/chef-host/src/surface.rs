//! Rendering surface description and the scripts injected into it
//!
//! The surface never gets a host API of its own. [`preload_script`] installs
//! `window.chefAPI`, whose only way out is `window.ipc.postMessage` carrying a
//! bridge request; the host answers through [`response_script`] and pushes
//! through [`event_script`].

use chef_ipc::{BridgeEvent, BridgeResponse};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Host-assigned identity of a rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Page load counter for one surface.
///
/// Request ids restart with every page, so a response is only delivered
/// while the page that asked is still the one loaded.
#[derive(Debug, Clone, Default)]
pub struct PageGeneration(Arc<AtomicU64>);

impl PageGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// A new page started loading
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Where the surface content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUrl {
    /// Built frontend served from disk over `app://`
    App { root: PathBuf, entry: String },
    /// Dev server
    Remote(String),
}

impl SurfaceUrl {
    pub fn start_url(&self) -> String {
        match self {
            Self::App { entry, .. } => format!("app://localhost/{}", entry),
            Self::Remote(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub min_size: (u32, u32),
    pub max_size: Option<(u32, u32)>,
    /// RGBA
    pub background: (u8, u8, u8, u8),
    pub url: SurfaceUrl,
    /// Open devtools once the surface is shown
    pub devtools: bool,
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`
pub fn parse_color(hex: &str) -> Option<(u8, u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                out[i] = channel(&c.to_string())? * 0x11;
            }
            Some((out[0], out[1], out[2], 0xff))
        }
        6 | 8 => Some((
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            if hex.len() == 8 {
                channel(&hex[6..8])?
            } else {
                0xff
            },
        )),
        _ => None,
    }
}

pub fn preload_script() -> &'static str {
    include_str!("preload.js")
}

/// Content-Security-Policy for `app://` responses
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self' app:; \
     script-src 'self' app:; \
     style-src 'self' app: 'unsafe-inline'; \
     img-src 'self' app: data: blob:; \
     font-src 'self' app: data:; \
     connect-src 'self' app: http://localhost:* http://127.0.0.1:*;";

/// Script resolving one pending `chefAPI` promise
pub fn response_script(response: &BridgeResponse) -> String {
    format!(
        "window.__chef_resolve && window.__chef_resolve({});",
        response.to_json()
    )
}

/// Script handing one push to the surface's listeners
pub fn event_script(event: &BridgeEvent) -> String {
    let payload = serde_json::json!({
        "channel": event.channel(),
        "payload": event.payload(),
    });
    format!(
        "window.__chef_dispatch && window.__chef_dispatch({});",
        payload
    )
}

/// Map an `app://` request path onto a file under `root`.
///
/// Rejects anything that would climb out of `root`.
pub fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let path = request_path.split(['?', '#']).next().unwrap_or("");
    let path = path.trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };

    let mut resolved = root.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

pub fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|s| s.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chef_ipc::BridgeError;

    #[test]
    fn test_reload_retires_pending_responses() {
        let page = PageGeneration::default();
        let loaded = page.advance();

        // Dialog opened on the first page, then the surface reloads.
        let asked_by = page.current();
        let observer = page.clone();
        let reloaded = observer.advance();

        assert_ne!(loaded, reloaded);
        assert!(!page.is_current(asked_by));
        assert!(page.is_current(page.current()));
        assert_eq!(page.current(), reloaded);
    }

    #[test]
    fn test_preload_exposes_only_bridge_surface() {
        let script = preload_script();
        for op in chef_ipc::BridgeOp::ALL {
            assert!(script.contains(&format!("'{}'", op.name())), "{}", op.name());
        }
        for name in [
            "onMenuAction",
            "onImportFile",
            "onExportFile",
            "removeAllListeners",
        ] {
            assert!(script.contains(name), "{}", name);
        }
        assert!(!script.contains("require("));
        assert!(!script.contains("readFile"));
        assert!(!script.contains("process."));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#1a1a1a"), Some((0x1a, 0x1a, 0x1a, 0xff)));
        assert_eq!(parse_color("#fff"), Some((0xff, 0xff, 0xff, 0xff)));
        assert_eq!(parse_color("#00000080"), Some((0, 0, 0, 0x80)));
        assert_eq!(parse_color("1a1a1a"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("#ééé"), None);
    }

    #[test]
    fn test_scripts() {
        let ok = BridgeResponse {
            id: 3,
            outcome: Ok(serde_json::json!("1.0.0")),
        };
        assert_eq!(
            response_script(&ok),
            r#"window.__chef_resolve && window.__chef_resolve({"id":3,"ok":true,"value":"1.0.0"});"#
        );

        let err = BridgeResponse::failure(4, BridgeError::unknown_operation("exec"));
        assert!(response_script(&err).contains(r#""ok":false"#));

        let script = event_script(&BridgeEvent::ImportFile("C:\\data\\r\"1\".csv".into()));
        assert!(script.contains(r#""channel":"import-file""#));
        assert!(script.contains(r#"C:\\data\\r\"1\".csv"#));
    }

    #[test]
    fn test_resolve_asset() {
        let root = Path::new("/srv/build");
        assert_eq!(
            resolve_asset(root, "/"),
            Some(PathBuf::from("/srv/build/index.html"))
        );
        assert_eq!(
            resolve_asset(root, "/static/js/main.js?v=2"),
            Some(PathBuf::from("/srv/build/static/js/main.js"))
        );
        assert_eq!(resolve_asset(root, "/../secrets.txt"), None);
        assert_eq!(resolve_asset(root, "/static/../../etc/passwd"), None);
    }

    #[test]
    fn test_start_url() {
        let app = SurfaceUrl::App {
            root: PathBuf::from("/srv/build"),
            entry: "index.html".into(),
        };
        assert_eq!(app.start_url(), "app://localhost/index.html");
        assert_eq!(
            SurfaceUrl::Remote("http://localhost:3000".into()).start_url(),
            "http://localhost:3000"
        );
        assert_eq!(mime_for(Path::new("a/b.css")), "text/css; charset=utf-8");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
    }
}
