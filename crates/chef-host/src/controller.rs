//! Session lifecycle
//!
//! The backend only runs while a surface exists: it is started after the
//! surface is created and stopped when that surface goes away.

use crate::config::HostConfig;
use crate::platform::HostPlatform;
use crate::surface::SurfaceId;
use crate::HostError;
use chef_ipc::{
    AppInfo, BridgeEvent, BridgeResponse, DialogCmd, Dialogs, EventChannel, SecureBridge,
};
use chef_menu::{
    build_menu, validate_external_url, CommandDispatcher, HostAction, MenuSpec, StandardRole,
};
use chef_process::{ProcessState, ProcessSupervisor};
use tracing::{debug, info, warn};

/// What the host loop should do after a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Continue,
    Quit,
}

/// The single live application instance
pub struct AppSession {
    surface: Option<SurfaceId>,
    supervisor: ProcessSupervisor,
}

impl AppSession {
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn backend_state(&self) -> ProcessState {
        self.supervisor.state()
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}

/// Owns the session. The platform is borrowed per call, since native
/// windows can only be created from inside the host loop.
pub struct HostController {
    config: HostConfig,
    bridge: SecureBridge,
    dispatcher: CommandDispatcher,
    menu: MenuSpec,
    menu_installed: bool,
    session: Option<AppSession>,
}

impl HostController {
    pub fn new(config: HostConfig, dialogs: Dialogs, events: EventChannel) -> Self {
        let product = config.product();
        let bridge = SecureBridge::new(
            AppInfo::new(product.name.clone(), product.version.clone()),
            dialogs.clone(),
        )
        .with_timeout(config.bridge_timeout());
        let menu = build_menu(&product);
        let dispatcher = CommandDispatcher::new(dialogs, events, product);

        Self {
            config,
            bridge,
            dispatcher,
            menu,
            menu_installed: false,
            session: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn bridge(&self) -> &SecureBridge {
        &self.bridge
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn menu(&self) -> &MenuSpec {
        &self.menu
    }

    pub fn session(&self) -> Option<&AppSession> {
        self.session.as_ref()
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.session.as_ref().and_then(AppSession::surface)
    }

    /// Create the session, its surface and the menu, then start the backend
    pub fn on_ready(&mut self, platform: &mut impl HostPlatform) -> Result<SurfaceId, HostError> {
        if let Some(surface) = self.surface() {
            debug!(%surface, "host already ready");
            return Ok(surface);
        }

        let surface = self.open_surface(platform)?;

        if !self.menu_installed {
            match platform.install_menu(&self.menu) {
                Ok(()) => self.menu_installed = true,
                Err(e) => warn!(error = %e, "continuing without application menu"),
            }
        }

        Ok(surface)
    }

    fn open_surface(&mut self, platform: &mut impl HostPlatform) -> Result<SurfaceId, HostError> {
        let opts = self.config.surface_options();
        let surface = platform.create_surface(&opts, &self.bridge)?;
        info!(%surface, url = %opts.url.start_url(), "surface created");

        let spec = self.config.backend_spec();
        let supervisor_config = self.config.supervisor_config();
        let session = self.session.get_or_insert_with(|| AppSession {
            surface: None,
            supervisor: ProcessSupervisor::new(supervisor_config),
        });
        session.surface = Some(surface);

        // A backend that fails to spawn leaves the host running without one.
        if let Err(e) = session.supervisor.start(&spec) {
            warn!(error = %e, "backend unavailable");
        }

        Ok(surface)
    }

    /// The surface finished loading and can be shown without a blank flash
    pub fn on_surface_ready_to_show(&self, platform: &mut impl HostPlatform, surface: SurfaceId) {
        if self.surface() != Some(surface) {
            debug!(%surface, "ready-to-show for stale surface");
            return;
        }
        let devtools = self.config.surface_options().devtools;
        platform.show_surface(surface, devtools);
    }

    /// Drop the surface reference and stop the backend. Idempotent.
    pub async fn on_surface_closed(
        &mut self,
        platform: &mut impl HostPlatform,
        surface: SurfaceId,
    ) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.surface {
            Some(current) if current == surface => {
                session.surface = None;
                platform.destroy_surface(surface);
                info!(%surface, "surface closed");
            }
            Some(current) => {
                debug!(%surface, %current, "close for stale surface ignored");
                return;
            }
            None => {}
        }

        let state = session.supervisor.stop().await;
        debug!(?state, "backend after surface close");
    }

    /// Quit where closing the last window means quitting; otherwise keep
    /// running with no surface.
    pub async fn on_all_surfaces_closed(
        &mut self,
        platform: &mut impl HostPlatform,
    ) -> LifecycleAction {
        if let Some(session) = self.session.as_mut() {
            session.supervisor.stop().await;
        }

        if self.config.quit_on_last_window_closed() {
            self.shutdown(platform).await;
            LifecycleAction::Quit
        } else {
            info!("all surfaces closed, staying resident");
            LifecycleAction::Continue
        }
    }

    /// Recreate the surface after the app is reactivated with none open
    pub fn on_activate_with_no_surfaces(
        &mut self,
        platform: &mut impl HostPlatform,
    ) -> Result<Option<SurfaceId>, HostError> {
        if self.surface().is_some() {
            return Ok(None);
        }
        self.open_surface(platform).map(Some)
    }

    /// Forward a push to the current surface. Dropped when there is none.
    pub fn deliver_event(&self, platform: &mut impl HostPlatform, event: &BridgeEvent) -> bool {
        match self.surface() {
            Some(surface) => {
                platform.deliver_event(surface, event);
                true
            }
            None => {
                debug!(channel = event.channel(), "no surface, event dropped");
                false
            }
        }
    }

    /// Show a file dialog bound to the current surface
    pub fn serve_dialog(&self, platform: &mut impl HostPlatform, cmd: DialogCmd) {
        let owner = self.surface();
        if owner.is_none() {
            debug!("no surface, dialog shown unparented");
        }
        platform.show_dialog(owner, cmd);
    }

    /// Hand a bridge response back to the surface that asked
    pub fn deliver_response(
        &self,
        platform: &mut impl HostPlatform,
        surface: SurfaceId,
        response: &BridgeResponse,
    ) -> bool {
        if self.surface() != Some(surface) {
            debug!(%surface, id = response.id, "surface gone, response dropped");
            return false;
        }
        platform.deliver_response(surface, response);
        true
    }

    pub async fn perform(
        &mut self,
        platform: &mut impl HostPlatform,
        action: HostAction,
    ) -> LifecycleAction {
        match action {
            HostAction::Role(StandardRole::Quit) => {
                self.shutdown(platform).await;
                LifecycleAction::Quit
            }
            HostAction::Role(StandardRole::Close) => match self.surface() {
                Some(surface) => {
                    self.on_surface_closed(platform, surface).await;
                    self.on_all_surfaces_closed(platform).await
                }
                None => LifecycleAction::Continue,
            },
            HostAction::Role(role) => {
                if let Some(surface) = self.surface() {
                    platform.perform_role(surface, role);
                }
                LifecycleAction::Continue
            }
            HostAction::OpenExternal(url) => {
                let opened = validate_external_url(&url)
                    .map_err(|e| HostError::open_external(&url, e.to_string()))
                    .and_then(|()| platform.open_external(&url));
                if let Err(e) = opened {
                    warn!(error = %e, "could not open external link");
                }
                LifecycleAction::Continue
            }
            HostAction::ShowAbout(about) => {
                platform.show_message(&about.title, &about.message, &about.detail);
                LifecycleAction::Continue
            }
        }
    }

    /// End the session: stop the backend and destroy the surface
    pub async fn shutdown(&mut self, platform: &mut impl HostPlatform) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let state = session.supervisor.stop().await;
        if let Some(surface) = session.surface.take() {
            platform.destroy_surface(surface);
        }
        info!(backend = ?state, "session ended");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceOptions;
    use chef_ipc::{BridgeRequest, DialogResult, SaveDialogOptions};
    use chef_menu::AboutInfo;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(SurfaceId),
        Show(SurfaceId, bool),
        Destroy(SurfaceId),
        InstallMenu,
        Event(SurfaceId, BridgeEvent),
        Response(SurfaceId, u64),
        Role(SurfaceId, StandardRole),
        OpenExternal(String),
        Message(String, String),
        Dialog(Option<SurfaceId>),
    }

    #[derive(Default)]
    struct FakePlatform {
        calls: Vec<Call>,
        next_id: u64,
        fail_create: bool,
        fail_menu: bool,
    }

    impl FakePlatform {
        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl HostPlatform for FakePlatform {
        fn create_surface(
            &mut self,
            _opts: &SurfaceOptions,
            _bridge: &SecureBridge,
        ) -> Result<SurfaceId, HostError> {
            if self.fail_create {
                return Err(HostError::surface_failed("no display"));
            }
            self.next_id += 1;
            let id = SurfaceId(self.next_id);
            self.calls.push(Call::Create(id));
            Ok(id)
        }

        fn show_surface(&mut self, surface: SurfaceId, devtools: bool) {
            self.calls.push(Call::Show(surface, devtools));
        }

        fn destroy_surface(&mut self, surface: SurfaceId) {
            self.calls.push(Call::Destroy(surface));
        }

        fn install_menu(&mut self, _menu: &MenuSpec) -> Result<(), HostError> {
            if self.fail_menu {
                return Err(HostError::menu_failed("unsupported"));
            }
            self.calls.push(Call::InstallMenu);
            Ok(())
        }

        fn deliver_event(&mut self, surface: SurfaceId, event: &BridgeEvent) {
            self.calls.push(Call::Event(surface, event.clone()));
        }

        fn deliver_response(&mut self, surface: SurfaceId, response: &BridgeResponse) {
            self.calls.push(Call::Response(surface, response.id));
        }

        fn perform_role(&mut self, surface: SurfaceId, role: StandardRole) {
            self.calls.push(Call::Role(surface, role));
        }

        fn open_external(&mut self, url: &str) -> Result<(), HostError> {
            self.calls.push(Call::OpenExternal(url.to_string()));
            Ok(())
        }

        fn show_dialog(&mut self, owner: Option<SurfaceId>, cmd: DialogCmd) {
            self.calls.push(Call::Dialog(owner));
            match cmd {
                DialogCmd::Open { respond, .. } => {
                    let _ = respond.send(Ok(DialogResult::Cancelled));
                }
                DialogCmd::Save { respond, .. } => {
                    let _ = respond.send(Ok(DialogResult::Cancelled));
                }
            }
        }

        fn show_message(&mut self, title: &str, message: &str, _detail: &str) {
            self.calls
                .push(Call::Message(title.to_string(), message.to_string()));
        }
    }

    fn controller_with(
        app_dir: &std::path::Path,
        dev_mode: bool,
        manifest: &str,
    ) -> (HostController, mpsc::Receiver<DialogCmd>) {
        let config = HostConfig::from_toml(app_dir, dev_mode, manifest).unwrap();
        let (dialogs, rx) = Dialogs::channel(4);
        (HostController::new(config, dialogs, EventChannel::new()), rx)
    }

    /// App dir with no backend entry, so the supervisor stays idle
    fn idle_controller() -> (HostController, mpsc::Receiver<DialogCmd>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (controller, rx) = controller_with(
            dir.path(),
            false,
            "[window]\nquit_on_last_window_closed = true\n",
        );
        (controller, rx, dir)
    }

    #[tokio::test]
    async fn test_ready_creates_hidden_surface_and_menu_once() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();

        assert_eq!(platform.calls, vec![Call::Create(surface), Call::InstallMenu]);
        assert_eq!(controller.surface(), Some(surface));
        // Entry is missing: degraded, not fatal.
        assert_eq!(
            controller.session().unwrap().backend_state(),
            ProcessState::NotStarted
        );

        assert_eq!(controller.on_ready(&mut platform).unwrap(), surface);
        assert_eq!(platform.count(|c| matches!(c, Call::Create(_))), 1);

        controller.on_surface_ready_to_show(&mut platform, surface);
        assert_eq!(platform.calls.last(), Some(&Call::Show(surface, false)));

        controller.on_surface_ready_to_show(&mut platform, SurfaceId(99));
        assert_eq!(platform.count(|c| matches!(c, Call::Show(..))), 1);
    }

    #[tokio::test]
    async fn test_surface_failure_is_reported() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform {
            fail_create: true,
            ..Default::default()
        };
        let err = controller.on_ready(&mut platform).unwrap_err();
        assert_eq!(err.code(), 9001);
        assert!(controller.session().is_none());
    }

    #[tokio::test]
    async fn test_menu_failure_is_not_fatal() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform {
            fail_menu: true,
            ..Default::default()
        };
        assert!(controller.on_ready(&mut platform).is_ok());
    }

    #[tokio::test]
    async fn test_surface_close_is_idempotent() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();

        controller.on_surface_closed(&mut platform, surface).await;
        controller.on_surface_closed(&mut platform, surface).await;
        assert_eq!(controller.surface(), None);
        assert_eq!(platform.count(|c| *c == Call::Destroy(surface)), 1);

        // Events and responses for a gone surface are dropped.
        let event = BridgeEvent::MenuAction("new-recipe".into());
        assert!(!controller.deliver_event(&mut platform, &event));
        let response = BridgeResponse {
            id: 1,
            outcome: Ok(json!("1.0.0")),
        };
        assert!(!controller.deliver_response(&mut platform, surface, &response));
        assert_eq!(platform.count(|c| matches!(c, Call::Event(..) | Call::Response(..))), 0);
    }

    #[tokio::test]
    async fn test_stale_close_does_not_touch_new_surface() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let first = controller.on_ready(&mut platform).unwrap();
        controller.on_surface_closed(&mut platform, first).await;
        let second = controller
            .on_activate_with_no_surfaces(&mut platform)
            .unwrap()
            .unwrap();
        assert_ne!(first, second);

        controller.on_surface_closed(&mut platform, first).await;
        assert_eq!(controller.surface(), Some(second));
        assert_eq!(
            controller.on_activate_with_no_surfaces(&mut platform).unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_last_window_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut platform = FakePlatform::default();
        let (mut resident, _rx) = controller_with(
            dir.path(),
            false,
            "[window]\nquit_on_last_window_closed = false\n",
        );
        let surface = resident.on_ready(&mut platform).unwrap();
        resident.on_surface_closed(&mut platform, surface).await;
        assert_eq!(
            resident.on_all_surfaces_closed(&mut platform).await,
            LifecycleAction::Continue
        );
        assert!(resident.session().is_some());
        assert!(resident
            .on_activate_with_no_surfaces(&mut platform)
            .unwrap()
            .is_some());

        let (mut controller, _rx, _dir) = idle_controller();
        let surface = controller.on_ready(&mut platform).unwrap();
        controller.on_surface_closed(&mut platform, surface).await;
        assert_eq!(
            controller.on_all_surfaces_closed(&mut platform).await,
            LifecycleAction::Quit
        );
        assert!(controller.session().is_none());
    }

    #[tokio::test]
    async fn test_events_and_responses_reach_current_surface() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();

        let event = BridgeEvent::ImportFile("data/recipes.csv".into());
        assert!(controller.deliver_event(&mut platform, &event));
        let response = controller
            .bridge()
            .handle_message(r#"{"id":7,"op":"getPlatform"}"#)
            .await
            .unwrap();
        assert!(controller.deliver_response(&mut platform, surface, &response));

        assert!(platform.calls.contains(&Call::Event(surface, event)));
        assert!(platform.calls.contains(&Call::Response(surface, 7)));
    }

    #[tokio::test]
    async fn test_dialogs_are_owned_by_current_surface() {
        let (mut controller, mut rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();

        let bridge = controller.bridge().clone();
        let pending = tokio::spawn(async move {
            bridge
                .handle_message(r#"{"id":3,"op":"showOpenDialog","payload":null}"#)
                .await
        });
        let cmd = rx.recv().await.unwrap();
        controller.serve_dialog(&mut platform, cmd);
        assert_eq!(platform.calls.last(), Some(&Call::Dialog(Some(surface))));

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.to_json()["value"], json!({"status": "cancelled"}));

        controller.on_surface_closed(&mut platform, surface).await;
        let (respond, _answer) = oneshot::channel();
        controller.serve_dialog(
            &mut platform,
            DialogCmd::Save {
                opts: SaveDialogOptions::default(),
                respond,
            },
        );
        assert_eq!(platform.calls.last(), Some(&Call::Dialog(None)));
    }

    #[tokio::test]
    async fn test_perform_actions() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();

        let about = AboutInfo::for_product(controller.dispatcher().product());
        assert_eq!(
            controller
                .perform(&mut platform, HostAction::ShowAbout(about))
                .await,
            LifecycleAction::Continue
        );
        controller
            .perform(&mut platform, HostAction::Role(StandardRole::ZoomIn))
            .await;
        controller
            .perform(
                &mut platform,
                HostAction::OpenExternal("https://chef-suite-docs.brenhamcc.com".into()),
            )
            .await;
        controller
            .perform(
                &mut platform,
                HostAction::OpenExternal("file:///etc/passwd".into()),
            )
            .await;

        assert!(platform.calls.contains(&Call::Message(
            "About Chef Suite Professional".into(),
            "Chef Suite Professional v1.0.0".into()
        )));
        assert!(platform
            .calls
            .contains(&Call::Role(surface, StandardRole::ZoomIn)));
        assert_eq!(platform.count(|c| matches!(c, Call::OpenExternal(_))), 1);

        assert_eq!(
            controller
                .perform(&mut platform, HostAction::Role(StandardRole::Quit))
                .await,
            LifecycleAction::Quit
        );
        assert!(controller.session().is_none());
        assert!(platform.calls.contains(&Call::Destroy(surface)));
    }

    #[tokio::test]
    async fn test_close_role_closes_surface() {
        let (mut controller, _rx, _dir) = idle_controller();
        let mut platform = FakePlatform::default();
        let surface = controller.on_ready(&mut platform).unwrap();
        assert_eq!(
            controller
                .perform(&mut platform, HostAction::Role(StandardRole::Close))
                .await,
            LifecycleAction::Quit
        );
        assert_eq!(platform.count(|c| *c == Call::Destroy(surface)), 1);
    }

    #[cfg(unix)]
    mod backend {
        use super::*;
        use std::path::Path;

        fn manifest(dir: &Path) -> String {
            std::fs::write(dir.join("backend.sh"), "exec sleep 30\n").unwrap();
            format!(
                "[backend]\ninterpreter = \"sh\"\nentry = \"backend.sh\"\n\
                 working_dir = \"{}\"\ngrace_period_ms = 200\n",
                dir.display()
            )
        }

        fn alive(pid: u32) -> bool {
            nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
        }

        #[tokio::test]
        async fn test_closing_surface_stops_backend() {
            let dir = tempfile::tempdir().unwrap();
            let (mut controller, _rx) = controller_with(dir.path(), false, &manifest(dir.path()));
            let mut platform = FakePlatform::default();

            let surface = controller.on_ready(&mut platform).unwrap();
            let pid = controller
                .session()
                .unwrap()
                .backend_state()
                .pid()
                .expect("backend running");
            assert!(alive(pid));

            controller.on_surface_closed(&mut platform, surface).await;
            let state = controller.session().unwrap().backend_state();
            assert!(matches!(state, ProcessState::Stopped { .. }));
            assert!(!alive(pid));
        }

        #[tokio::test]
        async fn test_dev_mode_never_spawns() {
            let dir = tempfile::tempdir().unwrap();
            let (mut controller, _rx) = controller_with(dir.path(), true, &manifest(dir.path()));
            let mut platform = FakePlatform::default();
            controller.on_ready(&mut platform).unwrap();
            assert_eq!(
                controller.session().unwrap().backend_state(),
                ProcessState::NotStarted
            );
        }

        #[tokio::test]
        async fn test_version_stable_across_backend_restart() {
            let dir = tempfile::tempdir().unwrap();
            let (mut controller, _rx) = controller_with(dir.path(), false, &manifest(dir.path()));
            let mut platform = FakePlatform::default();

            let first = controller.on_ready(&mut platform).unwrap();
            let before = controller
                .bridge()
                .dispatch(BridgeRequest::GetAppVersion)
                .await
                .unwrap();
            let first_pid = controller.session().unwrap().backend_state().pid();

            controller.on_surface_closed(&mut platform, first).await;
            controller.on_activate_with_no_surfaces(&mut platform).unwrap();
            let second_pid = controller.session().unwrap().backend_state().pid();
            assert!(second_pid.is_some());
            assert_ne!(first_pid, second_pid);

            let after = controller
                .bridge()
                .dispatch(BridgeRequest::GetAppVersion)
                .await
                .unwrap();
            assert_eq!(before, after);
            assert_eq!(after, json!("1.0.0"));

            controller.shutdown(&mut platform).await;
        }

        #[tokio::test]
        async fn test_at_most_one_backend_per_session() {
            let dir = tempfile::tempdir().unwrap();
            let (mut controller, _rx) = controller_with(dir.path(), false, &manifest(dir.path()));
            let mut platform = FakePlatform::default();

            controller.on_ready(&mut platform).unwrap();
            let pid = controller.session().unwrap().backend_state().pid();
            assert!(pid.is_some());
            controller.on_ready(&mut platform).unwrap();
            controller.on_activate_with_no_surfaces(&mut platform).unwrap();
            assert_eq!(controller.session().unwrap().backend_state().pid(), pid);

            controller.shutdown(&mut platform).await;
            assert!(controller.session().is_none());
            assert!(pid.map_or(false, |pid| !alive(pid)));
        }
    }
}
