// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use lumen_render::RenderSize;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

/// Fixed-size window, created hidden so nothing shows before the renderer
/// is up.
pub fn window_attributes(title: &str, size: RenderSize) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(size.width, size.height))
        .with_resizable(false)
        .with_visible(false)
}

/// Drawable size in physical pixels, never zero.
pub fn framebuffer_size(window: &Window) -> RenderSize {
    let size = window.inner_size();
    let fb = drawable(RenderSize {
        width: size.width,
        height: size.height,
    });
    tracing::debug!("framebuffer {}x{}", fb.width, fb.height);
    fb
}

fn drawable(size: RenderSize) -> RenderSize {
    if !size.is_empty() {
        return size;
    }
    tracing::warn!("window reports {}x{}; clamping to 1", size.width, size.height);
    RenderSize {
        width: size.width.max(1),
        height: size.height.max(1),
    }
}
