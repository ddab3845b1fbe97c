// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{bail, Result};
use clap::Parser;
use lumen_core::init_tracing;
use lumen_render::{RenderSize, Renderer};
use lumen_render_vk::{VkError, VkRenderer};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use lumen_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

struct App {
    cfg: AppCfg,
    max_frames: Option<u64>,

    // renderer before window: surface goes before the window it was made from
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    exiting: bool,
    failed: bool,
    presented: u64,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg, max_frames: Option<u64>) -> Self {
        Self {
            cfg,
            max_frames,
            renderer: None,
            window: None,
            exiting: false,
            failed: false,
            presented: 0,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, what: &str, e: impl std::fmt::Display) {
        error!("{what}: {e}");
        self.failed = true;
        self.shutdown(event_loop);
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) {
        let want = RenderSize {
            width: self.cfg.window.width,
            height: self.cfg.window.height,
        };
        let attrs = lumen_platform::window_attributes(&self.cfg.window.title, want);
        let window = match event_loop.create_window(attrs) {
            Ok(w) => w,
            Err(e) => return self.fail(event_loop, "create_window", e),
        };
        let size = lumen_platform::framebuffer_size(&window);

        let opts = self.cfg.render.vk_options();
        debug!("vk options: {opts:?}");
        let mut renderer = match VkRenderer::with_options(&window, &window, size, opts) {
            Ok(r) => r,
            Err(e) => return self.fail(event_loop, "vk init failed", e),
        };
        renderer.set_clear_color(self.cfg.render.clear_color);

        window.set_visible(true);
        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match renderer.render() {
            Ok(()) => {
                self.presented += 1;
                self.frames = self.frames.saturating_add(1);
            }
            Err(e) => {
                let recoverable = e
                    .downcast_ref::<VkError>()
                    .is_some_and(VkError::is_recoverable);
                if !recoverable {
                    return self.fail(event_loop, "render error", e);
                }
                warn!("frame skipped: {e}");
            }
        }
        if self.max_frames.is_some_and(|n| self.presented >= n) {
            info!("presented {} frames; exiting", self.presented);
            self.shutdown(event_loop);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            self.init(event_loop);
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (cfg, problem) = load_cfg(&args.config);
    init_tracing(cfg.log.as_deref());
    if let Some(p) = problem {
        warn!("{p}");
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, args.frames);
    event_loop.run_app(&mut app)?;

    if app.failed {
        bail!("lumen exited with an error");
    }
    Ok(())
}
