//! `chef.app.toml` manifest
//!
//! Every field is optional; a missing manifest yields the stock Chef Suite
//! setup. Relative paths resolve against the app directory.

use crate::surface::{parse_color, SurfaceOptions, SurfaceUrl};
use crate::HostError;
use chef_menu::ProductInfo;
use chef_process::{BackendSpec, RestartPolicy, SupervisorConfig, DEFAULT_GRACE_PERIOD};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const MANIFEST_FILE: &str = "chef.app.toml";

pub const DEFAULT_DEV_URL: &str = "http://localhost:3000";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Manifest {
    pub app: App,
    pub window: Window,
    pub backend: Backend,
    pub bridge: Bridge,
    pub help: Help,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct App {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub identifier: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Window {
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub background: Option<String>,
    /// Directory served as `app://` in production
    pub build_dir: Option<String>,
    pub dev_url: Option<String>,
    pub quit_on_last_window_closed: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Backend {
    pub interpreter: Option<String>,
    pub entry: Option<String>,
    pub working_dir: Option<String>,
    pub module_path_var: Option<String>,
    pub env: HashMap<String, String>,
    pub grace_period_ms: Option<u64>,
    pub restart: Option<RestartPolicy>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bridge {
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Help {
    pub documentation_url: Option<String>,
    pub support_url: Option<String>,
}

/// Resolved host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub manifest: Manifest,
    pub app_dir: PathBuf,
    pub dev_mode: bool,
}

impl HostConfig {
    /// Read `chef.app.toml` from `app_dir`, falling back to defaults if absent
    pub fn load(app_dir: impl Into<PathBuf>, dev_mode: bool) -> Result<Self, HostError> {
        let app_dir = app_dir.into();
        let path = app_dir.join(MANIFEST_FILE);
        let manifest = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| HostError::config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no manifest found, using defaults");
                Manifest::default()
            }
            Err(e) => {
                return Err(HostError::config(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self {
            manifest,
            app_dir,
            dev_mode,
        })
    }

    pub fn from_toml(
        app_dir: impl Into<PathBuf>,
        dev_mode: bool,
        text: &str,
    ) -> Result<Self, HostError> {
        let manifest = toml::from_str(text).map_err(|e| HostError::config(e.to_string()))?;
        Ok(Self {
            manifest,
            app_dir: app_dir.into(),
            dev_mode,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_dir.join(path)
        }
    }

    pub fn product(&self) -> ProductInfo {
        let app = &self.manifest.app;
        let help = &self.manifest.help;
        let defaults = ProductInfo::default();
        ProductInfo {
            name: app.name.clone().unwrap_or(defaults.name),
            short_name: app.short_name.clone().unwrap_or(defaults.short_name),
            version: app.version.clone().unwrap_or(defaults.version),
            description: app.description.clone().unwrap_or(defaults.description),
            copyright: app.copyright.clone().unwrap_or(defaults.copyright),
            documentation_url: help
                .documentation_url
                .clone()
                .unwrap_or(defaults.documentation_url),
            support_url: help.support_url.clone().unwrap_or(defaults.support_url),
        }
    }

    pub fn identifier(&self) -> &str {
        self.manifest
            .app
            .identifier
            .as_deref()
            .unwrap_or("com.brenhamcc.chefsuite")
    }

    pub fn surface_options(&self) -> SurfaceOptions {
        let window = &self.manifest.window;
        let url = if self.dev_mode {
            SurfaceUrl::Remote(
                window
                    .dev_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEV_URL.to_string()),
            )
        } else {
            SurfaceUrl::App {
                root: self.resolve(window.build_dir.as_deref().unwrap_or("build")),
                entry: "index.html".to_string(),
            }
        };

        let background = window.background.as_deref().unwrap_or("#1a1a1a");
        SurfaceOptions {
            title: window.title.clone().unwrap_or_else(|| self.product().name),
            width: window.width.unwrap_or(1400),
            height: window.height.unwrap_or(900),
            min_size: (
                window.min_width.unwrap_or(1200),
                window.min_height.unwrap_or(700),
            ),
            max_size: window.max_width.zip(window.max_height),
            background: parse_color(background).unwrap_or_else(|| {
                warn!(background, "invalid background color, using default");
                (0x1a, 0x1a, 0x1a, 0xff)
            }),
            url,
            devtools: self.dev_mode,
        }
    }

    pub fn backend_spec(&self) -> BackendSpec {
        let backend = &self.manifest.backend;
        let entry = self.resolve(backend.entry.as_deref().unwrap_or("../backend/main.py"));
        let working_dir = match backend.working_dir.as_deref() {
            Some(dir) => self.resolve(dir),
            None => entry
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.app_dir.clone()),
        };

        let mut spec = BackendSpec::new(entry, working_dir);
        if let Some(interpreter) = &backend.interpreter {
            // An empty interpreter runs the entry as an executable.
            spec = spec.with_interpreter((!interpreter.is_empty()).then(|| interpreter.clone()));
        }
        if let Some(var) = &backend.module_path_var {
            spec.module_path_var = var.clone();
        }
        for (key, value) in &backend.env {
            spec = spec.with_env(key, value);
        }
        spec
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let backend = &self.manifest.backend;
        SupervisorConfig {
            dev_mode: self.dev_mode,
            grace_period: backend
                .grace_period_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            restart: backend.restart.unwrap_or_default(),
        }
    }

    pub fn bridge_timeout(&self) -> Option<Duration> {
        self.manifest
            .bridge
            .request_timeout_ms
            .map(Duration::from_millis)
    }

    pub fn quit_on_last_window_closed(&self) -> bool {
        self.manifest
            .window
            .quit_on_last_window_closed
            .unwrap_or(!cfg!(target_os = "macos"))
    }
}

// ============================================================================
// Tests
// ============================================================================
