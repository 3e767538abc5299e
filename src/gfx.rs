//! Window and GL 3.3 core context (winit + glutin).

use std::ffi::CString;
use std::num::NonZeroU32;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::{Fullscreen, Window, WindowBuilder};

use warpeye_engine::logi;

fn nz(v: u32) -> NonZeroU32 {
    NonZeroU32::new(v).unwrap_or(NonZeroU32::MIN)
}

/// Field order is drop order: GL function table, surface, context, then the window.
pub struct Gfx {
    pub gl: Rc<glow::Context>,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    pub window: Window,
}

impl Gfx {
    pub fn new(event_loop: &EventLoop<()>, size: [u32; 2], fullscreen: bool) -> Result<Self> {
        let mut window_builder = WindowBuilder::new()
            .with_title("warpeye")
            .with_inner_size(PhysicalSize::new(size[0].max(1), size[1].max(1)));
        if fullscreen {
            window_builder = window_builder.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
        let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

        let (window, gl_config) = display_builder
            .build(event_loop, template, |configs| {
                configs
                    .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                    .expect("glutin offered no GL configs")
            })
            .map_err(|e| anyhow!("failed to build display: {e}"))?;
        let window = window.context("no window created")?;

        let raw_window_handle = window.raw_window_handle();
        let gl_display = gl_config.display();

        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(raw_window_handle));

        let not_current: NotCurrentContext = unsafe {
            gl_display
                .create_context(&gl_config, &context_attributes)
                .context("create_context failed")?
        };

        let inner = window.inner_size();
        let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window_handle,
            nz(inner.width),
            nz(inner.height),
        );
        let surface = unsafe {
            gl_display
                .create_window_surface(&gl_config, &attrs)
                .context("create_window_surface failed")?
        };

        let context = not_current.make_current(&surface).context("make_current failed")?;
        if let Err(e) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
            logi!("GFX", "vsync unavailable: {e}");
        }

        let gl = unsafe {
            glow::Context::from_loader_function(|s| {
                CString::new(s)
                    .map(|c| gl_display.get_proc_address(&c))
                    .unwrap_or(std::ptr::null())
            })
        };

        logi!("GFX", "window {}x{} fullscreen={fullscreen}", inner.width, inner.height);
        Ok(Self {
            gl: Rc::new(gl),
            surface,
            context,
            window,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        let s = self.window.inner_size();
        (s.width.max(1), s.height.max(1))
    }

    /// Display aspect ratio, width / height.
    pub fn aspect(&self) -> f32 {
        let (w, h) = self.size();
        w as f32 / h as f32
    }

    pub fn resize(&self, w: u32, h: u32) {
        self.surface.resize(&self.context, nz(w), nz(h));
    }

    pub fn swap(&self) -> Result<()> {
        self.surface.swap_buffers(&self.context).context("swap_buffers failed")
    }
}
