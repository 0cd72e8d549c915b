use anyhow::{bail, Context, Result};
use chef_host::{HostConfig, HostController, LifecycleAction};
use chef_ipc::{Dialogs, EventChannel};
use chef_menu::DispatchOutcome;
use std::env;
use std::path::PathBuf;
use tao::event::{Event, StartCause, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder};

mod desktop;
use desktop::{Desktop, DesktopState, UserEvent};

const DIALOG_QUEUE: usize = 8;

fn main() -> Result<()> {
    // Multi-thread runtime built by hand: the host loop owns the main thread
    // and calls block_on for the few lifecycle steps that must finish in order.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    sync_main(rt)
}

fn sync_main(rt: tokio::runtime::Runtime) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("CHEF_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Parse args: --app-dir <dir> --dev
    let mut args = env::args().skip(1);
    let mut app_dir = PathBuf::from(".");
    let mut dev_mode = env::var("CHEF_DEV").map(|v| v == "1").unwrap_or(false);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--app-dir" => match args.next() {
                Some(dir) => app_dir = PathBuf::from(dir),
                None => bail!("--app-dir requires a path"),
            },
            "--dev" => dev_mode = true,
            other => tracing::warn!(arg = other, "ignoring unknown argument"),
        }
    }

    let config = HostConfig::load(&app_dir, dev_mode)
        .with_context(|| format!("loading app from {}", app_dir.display()))?;
    let product = config.product();
    tracing::info!(
        "Starting app: {} v{} ({})",
        product.name,
        product.version,
        config.identifier()
    );

    // Supervisor and dialog tasks spawn from the host loop thread.
    let handle = rt.handle().clone();
    let _guard = handle.enter();

    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();

    let (dialogs, mut dialog_rx) = Dialogs::channel(DIALOG_QUEUE);
    let events = EventChannel::new();
    let mut controller = HostController::new(config, dialogs, events.clone());
    let mut desktop = DesktopState::new(proxy.clone(), handle.clone());

    // Native dialogs are created on the host loop
    let dialog_proxy = proxy.clone();
    rt.spawn(async move {
        while let Some(cmd) = dialog_rx.recv().await {
            if dialog_proxy.send_event(UserEvent::Dialog(cmd)).is_err() {
                break;
            }
        }
    });

    // Menu-originated pushes go to whichever surface is current
    let mut listener = events.subscribe();
    let push_proxy = proxy.clone();
    rt.spawn(async move {
        while let Some(event) = listener.recv().await {
            if push_proxy.send_event(UserEvent::Push(event)).is_err() {
                break;
            }
        }
    });

    let menu_proxy = proxy.clone();
    std::thread::spawn(move || {
        let receiver = muda::MenuEvent::receiver();
        while let Ok(event) = receiver.recv() {
            if menu_proxy.send_event(UserEvent::Menu(event.id.0)).is_err() {
                break;
            }
        }
    });

    event_loop.run(move |event, target, control| {
        *control = ControlFlow::Wait;
        let mut platform = Desktop::new(&mut desktop, target);

        match event {
            Event::NewEvents(StartCause::Init) => {
                if let Err(e) = controller.on_ready(&mut platform) {
                    tracing::error!(error = %e, "failed to open main window");
                    rt.block_on(controller.shutdown(&mut platform));
                    *control = ControlFlow::Exit;
                }
            }

            Event::UserEvent(UserEvent::SurfaceLoaded(surface)) => {
                controller.on_surface_ready_to_show(&mut platform, surface);
            }

            Event::UserEvent(UserEvent::BridgeResponse(surface, page, response)) => {
                if platform.state().is_current_page(surface, page) {
                    controller.deliver_response(&mut platform, surface, &response);
                } else {
                    tracing::debug!(%surface, id = response.id, "page reloaded, response dropped");
                }
            }

            Event::UserEvent(UserEvent::Push(event)) => {
                controller.deliver_event(&mut platform, &event);
            }

            Event::UserEvent(UserEvent::Dialog(cmd)) => {
                controller.serve_dialog(&mut platform, cmd);
            }

            Event::UserEvent(UserEvent::Menu(id)) => {
                let dispatcher = controller.dispatcher().clone();
                let action_proxy = proxy.clone();
                rt.spawn(async move {
                    match dispatcher.dispatch_id(&id).await {
                        Ok(DispatchOutcome::Host(action)) => {
                            let _ = action_proxy.send_event(UserEvent::Action(action));
                        }
                        Ok(outcome) => tracing::debug!(menu = %id, ?outcome, "menu command done"),
                        Err(e) => tracing::warn!(menu = %id, error = %e, "menu command failed"),
                    }
                });
            }

            Event::UserEvent(UserEvent::Action(action)) => {
                if rt.block_on(controller.perform(&mut platform, action)) == LifecycleAction::Quit {
                    *control = ControlFlow::Exit;
                }
            }

            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                window_id,
                ..
            } => {
                if let Some(surface) = platform.state().surface_for_window(window_id) {
                    rt.block_on(controller.on_surface_closed(&mut platform, surface));
                    if platform.state().is_empty()
                        && rt.block_on(controller.on_all_surfaces_closed(&mut platform))
                            == LifecycleAction::Quit
                    {
                        *control = ControlFlow::Exit;
                    }
                }
            }

            Event::Reopen {
                has_visible_windows: false,
                ..
            } => match controller.on_activate_with_no_surfaces(&mut platform) {
                Ok(Some(surface)) => tracing::info!(%surface, "window reopened"),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "failed to reopen window"),
            },

            Event::LoopDestroyed => {
                rt.block_on(controller.shutdown(&mut platform));
            }

            _ => {}
        }
    });
}
