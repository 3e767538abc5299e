//! Per-frame state and the keyboard/mouse/pad invocation surface.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use winit::event::{ElementState, KeyEvent, MouseButton};
use winit::keyboard::{KeyCode, PhysicalKey};

use warpeye_engine::config::{AppConfig, PadAction};
use warpeye_engine::controller::ControllerState;
use warpeye_engine::scene::SceneManager;
use warpeye_engine::texture::TextureHandle;
use warpeye_engine::warp::{compute_mesh, pick_vertex, Mesh, WarpMode};
use warpeye_engine::{logd, loge, logi, logw};

use crate::cli::Args;
use crate::gfx::Gfx;
use crate::hotreload::SceneWatcher;
use crate::render::{DrawParams, Renderer};
use crate::video::GlSourceFactory;

/// Whether the event loop should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Texture offset driven by the pointer instead of the scene's moves.
///
/// Each change is logged as a `[x, y, secs],` line that can be pasted into a
/// manifest's `moves` list.
#[derive(Debug, Clone, Copy)]
pub struct MouseMove {
    offset: (f32, f32),
    last_change: Instant,
}

impl MouseMove {
    pub fn new(now: Instant) -> Self {
        Self {
            offset: (0.0, 0.0),
            last_change: now,
        }
    }

    /// Pointer in window pixels (y down) to a texture offset centred on the window.
    pub fn offset_for(px: (f64, f64), size: (u32, u32)) -> (f32, f32) {
        let x = 0.5 - (px.0 / size.0 as f64) as f32;
        let y = (px.1 / size.1 as f64) as f32 - 0.5;
        (x, y)
    }

    /// Returns the move-step line when the offset changed.
    pub fn update(&mut self, offset: (f32, f32), now: Instant) -> Option<String> {
        if offset == self.offset {
            return None;
        }
        let dt = now.saturating_duration_since(self.last_change).as_secs_f32();
        self.offset = offset;
        self.last_change = now;
        Some(format!("[{:.5}, {:.5}, {dt:.3}],", offset.0, offset.1))
    }

    pub fn offset(&self) -> (f32, f32) {
        self.offset
    }
}

/// Everything the frame loop owns.
///
/// Field order is teardown order: the active scene releases its texture while the
/// GL context is still alive, then GL and the window go, then the controller.
pub struct App {
    scenes: SceneManager<GlSourceFactory>,
    renderer: Renderer,
    gfx: Gfx,
    controller: ControllerState,
    watcher: Option<SceneWatcher>,

    cfg: AppConfig,
    pad_actions: BTreeMap<u8, PadAction>,
    invert_x: bool,
    showreel: bool,

    warp_mode: WarpMode,
    mesh: Option<Mesh>,
    show_points: bool,
    edit_mode: bool,
    dragging: Option<(usize, usize)>,
    mouse_move: Option<MouseMove>,
    cursor_hidden: bool,
    // normalized display coordinates, y up
    pointer: [f32; 2],
    pointer_px: (f64, f64),

    showreel_at: Instant,
    next_frame: Instant,
}

impl App {
    pub fn new(
        args: &Args,
        cfg: AppConfig,
        gfx: Gfx,
        renderer: Renderer,
        scenes: SceneManager<GlSourceFactory>,
        controller: ControllerState,
        watcher: Option<SceneWatcher>,
        now: Instant,
    ) -> Self {
        let cursor_hidden = true;
        gfx.window.set_cursor_visible(!cursor_hidden);
        Self {
            pad_actions: cfg.pad_actions(),
            scenes,
            renderer,
            gfx,
            controller,
            watcher,
            cfg,
            invert_x: args.invert,
            showreel: args.showreel,
            warp_mode: args.warp,
            mesh: None,
            show_points: false,
            edit_mode: false,
            dragging: None,
            mouse_move: None,
            cursor_hidden,
            pointer: [0.5, 0.5],
            pointer_px: (0.0, 0.0),
            showreel_at: now,
            next_frame: now,
        }
    }

    pub fn gfx(&self) -> &Gfx {
        &self.gfx
    }

    /// Deadline for the next redraw; advances it by one tick when due.
    pub fn schedule(&mut self, now: Instant) -> (bool, Instant) {
        if now < self.next_frame {
            return (false, self.next_frame);
        }
        let tick = Duration::from_secs_f32(self.cfg.tick_secs(self.scenes.fps()));
        self.next_frame += tick;
        // fell behind: don't try to catch up
        if self.next_frame < now {
            self.next_frame = now + tick;
        }
        (true, self.next_frame)
    }

    pub fn on_key(&mut self, event: &KeyEvent, now: Instant) -> Flow {
        if event.state != ElementState::Pressed || event.repeat {
            return Flow::Continue;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return Flow::Continue;
        };
        match code {
            KeyCode::KeyQ | KeyCode::Escape => return Flow::Exit,
            KeyCode::KeyP => self.toggle_points(),
            KeyCode::KeyW => self.cycle_warp(),
            KeyCode::ArrowRight => return self.switch_scene(true, now),
            KeyCode::ArrowLeft => return self.switch_scene(false, now),
            KeyCode::KeyM => {
                self.mouse_move = match self.mouse_move {
                    Some(_) => None,
                    None => Some(MouseMove::new(now)),
                };
                logi!("APP", "mouse move {}", if self.mouse_move.is_some() { "on" } else { "off" });
            }
            KeyCode::KeyH => {
                self.cursor_hidden = !self.cursor_hidden;
                self.gfx.window.set_cursor_visible(!self.cursor_hidden);
            }
            KeyCode::KeyL => self.controller.load_defaults(),
            KeyCode::KeyS => self.controller.save_defaults(),
            KeyCode::KeyE => {
                self.edit_mode = !self.edit_mode;
                self.dragging = None;
                logi!("APP", "vertex edit {}", if self.edit_mode { "on" } else { "off" });
            }
            _ => {}
        }
        Flow::Continue
    }

    pub fn on_cursor(&mut self, px: (f64, f64), now: Instant) {
        let (w, h) = self.gfx.size();
        self.pointer_px = px;
        self.pointer = [(px.0 / w as f64) as f32, 1.0 - (px.1 / h as f64) as f32];

        if let Some(mm) = self.mouse_move.as_mut() {
            if let Some(line) = mm.update(MouseMove::offset_for(px, (w, h)), now) {
                logi!("MOVE", "{line}");
            }
        }

        if let (Some((col, row)), Some(mesh)) = (self.dragging, self.mesh.as_mut()) {
            mesh.set(col, row, self.pointer);
            self.renderer.upload_mesh(mesh);
        }
    }

    pub fn on_mouse_button(&mut self, state: ElementState, button: MouseButton) {
        if button != MouseButton::Left {
            return;
        }
        match state {
            ElementState::Pressed if self.edit_mode && self.show_points => {
                self.dragging = self
                    .mesh
                    .as_ref()
                    .and_then(|m| pick_vertex(m, self.pointer, self.gfx.aspect()))
                    .map(|p| (p.col, p.row));
                if let Some((col, row)) = self.dragging {
                    logd!("APP", "dragging vertex ({col}, {row})");
                }
            }
            ElementState::Released => self.dragging = None,
            _ => {}
        }
    }

    pub fn on_resize(&mut self, w: u32, h: u32) {
        self.gfx.resize(w, h);
        // aspect correction depends on the window shape
        self.mesh = None;
    }

    pub fn on_scenes_changed(&mut self, now: Instant) -> Flow {
        logi!("APP", "scenes changed on disk, rescanning");
        if self.scenes.rescan(now) {
            Flow::Continue
        } else {
            loge!("APP", "no playable scenes left after rescan");
            Flow::Exit
        }
    }

    fn toggle_points(&mut self) {
        self.show_points = !self.show_points;
    }

    fn cycle_warp(&mut self) {
        self.warp_mode = self.warp_mode.next();
        self.mesh = None;
        self.dragging = None;
        logi!("APP", "warp mode: {}", self.warp_mode.name());
    }

    fn switch_scene(&mut self, forward: bool, now: Instant) -> Flow {
        let ok = if forward { self.scenes.next(now) } else { self.scenes.prev(now) };
        if !ok {
            loge!("APP", "no playable scenes left");
            return Flow::Exit;
        }
        if let Some(scene) = self.scenes.current() {
            logi!("APP", "scene: {}", scene.name());
        }
        Flow::Continue
    }

    fn run_pad(&mut self, pad: u8, now: Instant) -> Flow {
        let Some(action) = self.pad_actions.get(&pad).cloned() else {
            logd!("APP", "pad {pad} has no action");
            return Flow::Continue;
        };
        match action {
            PadAction::ScenePrev => return self.switch_scene(false, now),
            PadAction::SceneNext => return self.switch_scene(true, now),
            PadAction::CycleWarp => self.cycle_warp(),
            PadAction::TogglePoints => self.toggle_points(),
            PadAction::SaveDefaults => self.controller.save_defaults(),
            PadAction::LoadDefaults => self.controller.load_defaults(),
            PadAction::Variant(name) => {
                if let Err(e) = self.scenes.select_variant(&name, now) {
                    logw!("APP", "pad {pad}: {e}");
                }
            }
        }
        Flow::Continue
    }

    /// One frame: input, geometry, offset, texture, draw, present.
    pub fn frame(&mut self, now: Instant) -> Result<Flow> {
        self.controller.poll();
        for pad in self.controller.drain_triggered_pads() {
            if self.run_pad(pad, now) == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }

        if let Some(w) = self.watcher.as_mut() {
            if w.poll(now) && self.on_scenes_changed(now) == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }

        if self.showreel
            && now.saturating_duration_since(self.showreel_at) >= Duration::from_secs(self.cfg.showreel_secs)
        {
            self.showreel_at = now;
            if self.switch_scene(true, now) == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }

        if self.controller.consume_changed() {
            self.mesh = None;
            self.dragging = None;
        }
        if self.mesh.is_none() {
            let mesh = compute_mesh(self.warp_mode, self.gfx.aspect(), &self.controller);
            self.renderer.upload_mesh(&mesh);
            self.mesh = Some(mesh);
        }

        let offset = match &self.mouse_move {
            Some(mm) => mm.offset(),
            None => self.scenes.update_position(now),
        };

        let texture = match self.scenes.update_texture() {
            Ok(t) => t,
            Err(e) => {
                loge!("APP", "{e}");
                if !self.scenes.skip_broken(now) {
                    loge!("APP", "no playable scenes left");
                    return Ok(Flow::Exit);
                }
                TextureHandle::NONE
            }
        };

        let (w, h) = self.gfx.size();
        self.renderer.draw_mesh(&DrawParams {
            texture,
            offset,
            invert_x: self.invert_x,
            viewport: (w as i32, h as i32),
        });

        if self.show_points {
            if let Some(mesh) = &self.mesh {
                let aspect = self.gfx.aspect();
                let selected = self
                    .dragging
                    .or_else(|| pick_vertex(mesh, self.pointer, aspect).map(|p| (p.col, p.row)));
                self.renderer.draw_points(mesh, aspect, selected);
            }
        }

        self.gfx.swap()?;
        Ok(Flow::Continue)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.scenes.stop();
        logi!("APP", "shutting down");
    }
}
