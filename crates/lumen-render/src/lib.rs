// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Framebuffer size in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Draws and presents one frame.
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::RenderSize;

    #[test]
    fn zero_sized_is_empty() {
        assert!(RenderSize { width: 0, height: 720 }.is_empty());
        assert!(RenderSize { width: 1280, height: 0 }.is_empty());
        assert!(!RenderSize { width: 1, height: 1 }.is_empty());
    }
}
