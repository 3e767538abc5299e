mod app;
mod cli;
mod gfx;
mod hotreload;
mod render;
mod video;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

use warpeye_engine::assets::AssetsRoot;
use warpeye_engine::config::{load_app_config, AppConfig, ConfigMode};
use warpeye_engine::controller::{ControllerOptions, ControllerState};
use warpeye_engine::logging;
use warpeye_engine::scene::SceneManager;
use warpeye_engine::{loge, logi, logw};

use crate::app::{App, Flow};
use crate::cli::Args;
use crate::gfx::Gfx;
use crate::hotreload::SceneWatcher;
use crate::render::Renderer;
use crate::video::GlSourceFactory;

/// Config plus the resolved scene root. `--scenes` works without a resources folder.
fn load_config(args: &Args) -> Result<(AppConfig, PathBuf)> {
    let cwd = std::env::current_dir().context("cannot read working directory")?;
    let mode = if args.strict { ConfigMode::Strict } else { ConfigMode::Lenient };

    match AssetsRoot::discover(&cwd) {
        Ok(assets) => {
            logi!("ASSETS", "base: {}", assets.path().display());
            let cfg = load_app_config(&assets, mode)?;
            let scenes = args.scenes.clone().unwrap_or_else(|| assets.resolve(&cfg.scenes_dir));
            Ok((cfg, scenes))
        }
        Err(e) => match &args.scenes {
            Some(scenes) => {
                logw!("ASSETS", "{e}; using built-in config");
                Ok((AppConfig::default(), scenes.clone()))
            }
            None => Err(e).context("pass --scenes <dir> or set WARPEYE_ASSETS"),
        },
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let run_id = logging::init(args.log_file.clone());
    logi!("MAIN", "warpeye {} run_id={run_id}", env!("CARGO_PKG_VERSION"));

    let (cfg, scenes_root) = load_config(&args)?;
    logi!("MAIN", "scenes: {}", scenes_root.display());

    let mut controller = ControllerState::new(ControllerOptions::from_config(&cfg));
    if args.no_midi {
        logi!("MAIN", "MIDI disabled (--no-midi)");
    } else {
        controller.start(&cfg.midi).context("MIDI controller failed")?;
    }
    controller.start_osc(&cfg.osc).context("OSC listener failed")?;

    let event_loop = EventLoop::new().context("EventLoop::new failed")?;
    let gfx = Gfx::new(&event_loop, cfg.resolution, args.fullscreen)?;
    let renderer = Renderer::new(gfx.gl.clone())?;

    let now = Instant::now();
    let mut scenes = SceneManager::new(&scenes_root, GlSourceFactory::new(gfx.gl.clone()));
    if !scenes.start_or_skip(now) {
        bail!("no playable scenes under {}", scenes_root.display());
    }

    let watcher = match SceneWatcher::new(&scenes_root) {
        Ok(w) => Some(w),
        Err(e) => {
            logw!("WATCH", "scene hot-reload disabled: {e}");
            None
        }
    };

    let mut app = App::new(&args, cfg, gfx, renderer, scenes, controller, watcher, now);

    // `app` is dropped when the loop returns, on every exit path.
    event_loop
        .run(move |event, target| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => target.exit(),
                WindowEvent::KeyboardInput { event, .. } => {
                    if app.on_key(&event, Instant::now()) == Flow::Exit {
                        target.exit();
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    app.on_cursor((position.x, position.y), Instant::now());
                }
                WindowEvent::MouseInput { state, button, .. } => app.on_mouse_button(state, button),
                WindowEvent::Resized(size) => app.on_resize(size.width, size.height),
                WindowEvent::RedrawRequested => match app.frame(Instant::now()) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => target.exit(),
                    Err(e) => {
                        loge!("MAIN", "{e:#}");
                        target.exit();
                    }
                },
                _ => {}
            },
            Event::AboutToWait => {
                let (due, next) = app.schedule(Instant::now());
                if due {
                    app.gfx().window.request_redraw();
                }
                target.set_control_flow(ControlFlow::WaitUntil(next));
            }
            Event::LoopExiting => logi!("MAIN", "event loop exiting"),
            _ => {}
        })
        .context("event loop failed")?;

    Ok(())
}
