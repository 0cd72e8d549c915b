//! tao/wry/muda/rfd implementation of [`HostPlatform`]

use chef_host::surface::{
    event_script, mime_for, preload_script, resolve_asset, response_script,
    CONTENT_SECURITY_POLICY,
};
use chef_host::{HostError, HostPlatform, PageGeneration, SurfaceId, SurfaceOptions, SurfaceUrl};
use chef_ipc::{BridgeEvent, BridgeResponse, DialogCmd, FileFilter, SecureBridge};
use chef_menu::{HostAction, MenuEntry, MenuEntryId, MenuSpec, StandardRole};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tao::event_loop::{EventLoopProxy, EventLoopWindowTarget};
use tao::window::{Fullscreen, Window, WindowBuilder, WindowId};
use tracing::{debug, warn};
use wry::http::{header, HeaderValue, Response, StatusCode};
use wry::{PageLoadEvent, WebView, WebViewBuilder};

const MIN_ZOOM: f64 = 0.3;
const MAX_ZOOM: f64 = 3.0;
const ZOOM_STEP: f64 = 0.1;

/// Events delivered to the host loop from other threads
#[derive(Debug)]
pub enum UserEvent {
    /// Page finished loading; safe to show
    SurfaceLoaded(SurfaceId),
    /// Answer for the page generation that sent the request
    BridgeResponse(SurfaceId, u64, BridgeResponse),
    Push(BridgeEvent),
    /// Raw muda id of a clicked item
    Menu(String),
    Action(HostAction),
    Dialog(DialogCmd),
}

struct Surface {
    // Dropped before the window it renders into.
    webview: WebView,
    window: Window,
    page: PageGeneration,
    zoom: f64,
}

/// Native state that outlives a single loop iteration
pub struct DesktopState {
    proxy: EventLoopProxy<UserEvent>,
    runtime: tokio::runtime::Handle,
    surfaces: HashMap<SurfaceId, Surface>,
    windows: HashMap<WindowId, SurfaceId>,
    next_id: u64,
    app_menu: Option<muda::Menu>,
}

impl DesktopState {
    pub fn new(proxy: EventLoopProxy<UserEvent>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            proxy,
            runtime,
            surfaces: HashMap::new(),
            windows: HashMap::new(),
            next_id: 0,
            app_menu: None,
        }
    }

    pub fn surface_for_window(&self, window_id: WindowId) -> Option<SurfaceId> {
        self.windows.get(&window_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Whether `generation` is still the page loaded in `surface`
    pub fn is_current_page(&self, surface: SurfaceId, generation: u64) -> bool {
        self.surfaces
            .get(&surface)
            .is_some_and(|entry| entry.page.is_current(generation))
    }

    fn window(&self, surface: Option<SurfaceId>) -> Option<&Window> {
        surface
            .and_then(|id| self.surfaces.get(&id))
            .map(|entry| &entry.window)
    }

    /// Dialogs are built here on the loop thread and awaited on the runtime.
    fn serve_dialog(&self, owner: Option<SurfaceId>, cmd: DialogCmd) {
        let parent = self.window(owner);
        match cmd {
            DialogCmd::Open { opts, respond } => {
                let mut dialog = rfd::AsyncFileDialog::new();
                if let Some(window) = parent {
                    dialog = dialog.set_parent(window);
                }
                if let Some(title) = &opts.title {
                    dialog = dialog.set_title(title);
                }
                if let Some(path) = &opts.default_path {
                    dialog = dialog.set_directory(path);
                }
                dialog = add_filters(dialog, &opts.filters);

                if opts.multi_select {
                    let picked = dialog.pick_files();
                    self.runtime.spawn(async move {
                        let result = picked
                            .await
                            .map(|files| files.iter().map(|f| path_string(f.path())).collect());
                        let _ = respond.send(Ok(result.into()));
                    });
                } else {
                    let picked = dialog.pick_file();
                    self.runtime.spawn(async move {
                        let result = picked.await.map(|f| vec![path_string(f.path())]);
                        let _ = respond.send(Ok(result.into()));
                    });
                }
            }
            DialogCmd::Save { opts, respond } => {
                let mut dialog = rfd::AsyncFileDialog::new();
                if let Some(window) = parent {
                    dialog = dialog.set_parent(window);
                }
                if let Some(title) = &opts.title {
                    dialog = dialog.set_title(title);
                }
                if let Some(default_path) = &opts.default_path {
                    let path = Path::new(default_path);
                    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                        dialog = dialog.set_directory(dir);
                    }
                    if let Some(name) = path.file_name() {
                        dialog = dialog.set_file_name(name.to_string_lossy());
                    }
                }
                dialog = add_filters(dialog, &opts.filters);

                let picked = dialog.save_file();
                self.runtime.spawn(async move {
                    let result = picked.await.map(|f| path_string(f.path()));
                    let _ = respond.send(Ok(result.into()));
                });
            }
        }
    }
}

fn add_filters(mut dialog: rfd::AsyncFileDialog, filters: &[FileFilter]) -> rfd::AsyncFileDialog {
    for filter in filters {
        let extensions: Vec<&str> = filter.extensions.iter().map(|s| s.as_str()).collect();
        dialog = dialog.add_filter(&filter.name, &extensions);
    }
    dialog
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// [`DesktopState`] plus the loop target, valid for one loop callback
pub struct Desktop<'a> {
    state: &'a mut DesktopState,
    target: &'a EventLoopWindowTarget<UserEvent>,
}

impl<'a> Desktop<'a> {
    pub fn new(state: &'a mut DesktopState, target: &'a EventLoopWindowTarget<UserEvent>) -> Self {
        Self { state, target }
    }

    pub fn state(&self) -> &DesktopState {
        self.state
    }

    fn webview(&self, surface: SurfaceId) -> Option<&WebView> {
        self.state.surfaces.get(&surface).map(|s| &s.webview)
    }

    fn eval(&self, surface: SurfaceId, script: &str) {
        if let Some(webview) = self.webview(surface) {
            if let Err(e) = webview.evaluate_script(script) {
                warn!(%surface, error = %e, "script evaluation failed");
            }
        }
    }
}

impl HostPlatform for Desktop<'_> {
    fn create_surface(
        &mut self,
        opts: &SurfaceOptions,
        bridge: &SecureBridge,
    ) -> Result<SurfaceId, HostError> {
        let mut win_builder = WindowBuilder::new()
            .with_title(&opts.title)
            .with_inner_size(tao::dpi::LogicalSize::new(opts.width, opts.height))
            .with_min_inner_size(tao::dpi::LogicalSize::new(opts.min_size.0, opts.min_size.1))
            .with_visible(false);
        if let Some((max_w, max_h)) = opts.max_size {
            win_builder = win_builder.with_max_inner_size(tao::dpi::LogicalSize::new(max_w, max_h));
        }
        let window = win_builder
            .build(self.target)
            .map_err(|e| HostError::surface_failed(e.to_string()))?;

        self.state.next_id += 1;
        let id = SurfaceId(self.state.next_id);

        let mut builder = WebViewBuilder::new()
            .with_initialization_script(preload_script())
            .with_background_color(opts.background)
            .with_devtools(opts.devtools);

        let page = PageGeneration::default();

        // Bridge requests: decoded and served off-loop, answered through the proxy
        let ipc_page = page.clone();
        let ipc_bridge = bridge.clone();
        let ipc_proxy = self.state.proxy.clone();
        let runtime = self.state.runtime.clone();
        builder = builder.with_ipc_handler(move |request| {
            let raw = request.body().clone();
            let generation = ipc_page.current();
            let bridge = ipc_bridge.clone();
            let proxy = ipc_proxy.clone();
            runtime.spawn(async move {
                if let Some(response) = bridge.handle_message(&raw).await {
                    let _ = proxy.send_event(UserEvent::BridgeResponse(id, generation, response));
                }
            });
        });

        let load_page = page.clone();
        let load_proxy = self.state.proxy.clone();
        builder = builder.with_on_page_load_handler(move |event, _url| match event {
            PageLoadEvent::Started => {
                let generation = load_page.advance();
                debug!(%id, generation, "page load started");
            }
            PageLoadEvent::Finished => {
                let _ = load_proxy.send_event(UserEvent::SurfaceLoaded(id));
            }
        });

        if let SurfaceUrl::App { root, .. } = &opts.url {
            let root = root.clone();
            builder = builder.with_custom_protocol("app".into(), move |_id, request| {
                serve_asset(&root, request.uri().path())
            });
        }

        builder = builder.with_url(opts.url.start_url());
        let webview = builder
            .build(&window)
            .map_err(|e| HostError::surface_failed(e.to_string()))?;

        if let Some(menu) = &self.state.app_menu {
            attach_menu(menu, &window);
        }

        self.state.windows.insert(window.id(), id);
        self.state.surfaces.insert(
            id,
            Surface {
                webview,
                window,
                page,
                zoom: 1.0,
            },
        );
        debug!(%id, "surface built");
        Ok(id)
    }

    fn show_surface(&mut self, surface: SurfaceId, devtools: bool) {
        let Some(entry) = self.state.surfaces.get(&surface) else {
            return;
        };
        entry.window.set_visible(true);
        entry.window.set_focus();

        #[cfg(any(debug_assertions, feature = "devtools"))]
        if devtools {
            entry.webview.open_devtools();
        }
        #[cfg(not(any(debug_assertions, feature = "devtools")))]
        if devtools {
            debug!("devtools requested but not compiled in");
        }
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Some(entry) = self.state.surfaces.remove(&surface) {
            self.state.windows.remove(&entry.window.id());
            debug!(%surface, "surface destroyed");
        }
    }

    fn install_menu(&mut self, spec: &MenuSpec) -> Result<(), HostError> {
        let menu = muda::Menu::new();
        for submenu_spec in spec.submenus() {
            let submenu = muda::Submenu::new(&submenu_spec.label, true);
            for entry in &submenu_spec.entries {
                append_entry(&submenu, entry).map_err(|e| HostError::menu_failed(e.to_string()))?;
            }
            menu.append(&submenu)
                .map_err(|e| HostError::menu_failed(e.to_string()))?;
        }

        #[cfg(target_os = "macos")]
        {
            menu.init_for_nsapp();
        }
        for entry in self.state.surfaces.values() {
            attach_menu(&menu, &entry.window);
        }

        self.state.app_menu = Some(menu);
        Ok(())
    }

    fn deliver_event(&mut self, surface: SurfaceId, event: &BridgeEvent) {
        self.eval(surface, &event_script(event));
    }

    fn deliver_response(&mut self, surface: SurfaceId, response: &BridgeResponse) {
        self.eval(surface, &response_script(response));
    }

    fn perform_role(&mut self, surface: SurfaceId, role: StandardRole) {
        let Some(entry) = self.state.surfaces.get_mut(&surface) else {
            return;
        };
        match role {
            StandardRole::Reload | StandardRole::ForceReload => {
                if let Err(e) = entry.webview.evaluate_script("window.location.reload()") {
                    warn!(%surface, error = %e, "reload failed");
                }
            }
            StandardRole::ToggleDevTools => {
                #[cfg(any(debug_assertions, feature = "devtools"))]
                {
                    if entry.webview.is_devtools_open() {
                        entry.webview.close_devtools();
                    } else {
                        entry.webview.open_devtools();
                    }
                }
            }
            StandardRole::ResetZoom | StandardRole::ZoomIn | StandardRole::ZoomOut => {
                entry.zoom = match role {
                    StandardRole::ZoomIn => (entry.zoom + ZOOM_STEP).min(MAX_ZOOM),
                    StandardRole::ZoomOut => (entry.zoom - ZOOM_STEP).max(MIN_ZOOM),
                    _ => 1.0,
                };
                if let Err(e) = entry.webview.zoom(entry.zoom) {
                    warn!(%surface, zoom = entry.zoom, error = %e, "zoom failed");
                }
            }
            StandardRole::ToggleFullscreen => {
                let fullscreen = match entry.window.fullscreen() {
                    Some(_) => None,
                    None => Some(Fullscreen::Borderless(None)),
                };
                entry.window.set_fullscreen(fullscreen);
            }
            StandardRole::Minimize => entry.window.set_minimized(true),
            // Quit and Close belong to the controller; editing roles are native items.
            _ => debug!(role = role.name(), "role not handled by platform"),
        }
    }

    fn open_external(&mut self, url: &str) -> Result<(), HostError> {
        open::that(url).map_err(|e| HostError::open_external(url, e.to_string()))
    }

    fn show_dialog(&mut self, owner: Option<SurfaceId>, cmd: DialogCmd) {
        self.state.serve_dialog(owner, cmd);
    }

    fn show_message(&mut self, title: &str, message: &str, detail: &str) {
        let mut dialog = rfd::AsyncMessageDialog::new();
        if let Some(entry) = self.state.surfaces.values().next() {
            dialog = dialog.set_parent(&entry.window);
        }
        let shown = dialog
            .set_level(rfd::MessageLevel::Info)
            .set_title(title)
            .set_description(format!("{}\n\n{}", message, detail))
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
        self.state.runtime.spawn(async move {
            shown.await;
        });
    }
}

fn append_entry(submenu: &muda::Submenu, entry: &MenuEntry) -> muda::Result<()> {
    match entry {
        MenuEntry::Separator => submenu.append(&muda::PredefinedMenuItem::separator()),
        MenuEntry::Role(role) if role.is_native() => {
            let item = match role {
                StandardRole::Undo => muda::PredefinedMenuItem::undo(None),
                StandardRole::Redo => muda::PredefinedMenuItem::redo(None),
                StandardRole::Cut => muda::PredefinedMenuItem::cut(None),
                StandardRole::Copy => muda::PredefinedMenuItem::copy(None),
                StandardRole::Paste => muda::PredefinedMenuItem::paste(None),
                _ => muda::PredefinedMenuItem::select_all(None),
            };
            submenu.append(&item)
        }
        MenuEntry::Role(role) => submenu.append(&muda::MenuItem::with_id(
            MenuEntryId::Role(*role).as_string(),
            role.label(),
            true,
            role.accelerator().and_then(|a| a.parse().ok()),
        )),
        MenuEntry::Command {
            command,
            label,
            accelerator,
        } => submenu.append(&muda::MenuItem::with_id(
            MenuEntryId::Command(*command).as_string(),
            label,
            true,
            accelerator.as_ref().and_then(|a| a.parse().ok()),
        )),
    }
}

#[allow(unused_variables)]
fn attach_menu(menu: &muda::Menu, window: &Window) {
    #[cfg(target_os = "windows")]
    {
        use tao::platform::windows::WindowExtWindows;
        unsafe {
            let _ = menu.init_for_hwnd(window.hwnd() as isize);
        }
    }

    #[cfg(target_os = "linux")]
    {
        use gtk::prelude::*;
        use tao::platform::unix::WindowExtUnix;
        let gtk_win = window.gtk_window();
        let gtk_win_ref: &gtk::Window = gtk_win.upcast_ref();
        let _ = menu.init_for_gtk_window(gtk_win_ref, None::<&gtk::Box>);
    }
}

fn serve_asset(root: &Path, request_path: &str) -> Response<Cow<'static, [u8]>> {
    let found = resolve_asset(root, request_path)
        .and_then(|path| std::fs::read(&path).ok().map(|bytes| (path, bytes)));

    match found {
        Some((path, bytes)) => {
            let mut response = Response::new(Cow::Owned(bytes));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_for(&path)));
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(CONTENT_SECURITY_POLICY),
            );
            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            response
        }
        None => {
            debug!(path = request_path, "asset not found");
            let mut response = Response::new(Cow::Owned(
                format!("Not found: {}", request_path).into_bytes(),
            ));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        }
    }
}
