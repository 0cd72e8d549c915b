//! Seam between the host lifecycle and the windowing toolkit

use crate::surface::{SurfaceId, SurfaceOptions};
use crate::HostError;
use chef_ipc::{BridgeEvent, BridgeResponse, DialogCmd, SecureBridge};
use chef_menu::{MenuSpec, StandardRole};

/// Native operations the controller drives. All calls happen on the host loop.
pub trait HostPlatform {
    /// Create a hidden surface whose bridge requests are served by `bridge`
    fn create_surface(
        &mut self,
        opts: &SurfaceOptions,
        bridge: &SecureBridge,
    ) -> Result<SurfaceId, HostError>;

    fn show_surface(&mut self, surface: SurfaceId, devtools: bool);

    /// Tear down the surface; unknown ids are ignored
    fn destroy_surface(&mut self, surface: SurfaceId);

    fn install_menu(&mut self, menu: &MenuSpec) -> Result<(), HostError>;

    fn deliver_event(&mut self, surface: SurfaceId, event: &BridgeEvent);

    fn deliver_response(&mut self, surface: SurfaceId, response: &BridgeResponse);

    /// Built-in behavior for roles the controller does not own itself
    fn perform_role(&mut self, surface: SurfaceId, role: StandardRole);

    fn open_external(&mut self, url: &str) -> Result<(), HostError>;

    /// File dialog modal to `owner`, answered through the command's responder.
    /// Must not block the host loop.
    fn show_dialog(&mut self, owner: Option<SurfaceId>, cmd: DialogCmd);

    /// Informational, non-blocking message box
    fn show_message(&mut self, title: &str, message: &str, detail: &str);
}
