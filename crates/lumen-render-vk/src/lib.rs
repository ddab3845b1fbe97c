// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan presentation backend: device negotiation, the swapchain with its
//! depth attachments and framebuffers, and frames in flight.
use anyhow::Result;
use ash::vk;
use lumen_render::{RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, info};

mod commands;
mod context;
mod depth;
mod error;
mod frame;
mod framebuffer;
mod handle;
mod memory;
mod negotiate;
mod render_pass;
mod select;
mod swapchain;

pub use commands::CommandResources;
pub use context::{GpuContext, REQUIRED_DEVICE_EXTENSIONS};
pub use depth::{has_stencil, pick_depth_format, DepthAttachments, DEPTH_FORMAT_CANDIDATES};
pub use error::{VkError, VkResult, VkResultExt};
pub use frame::{
    AshFrames, FrameBackend, FrameSlot, FrameSynchronizer, SlotState, MAX_FRAMES_IN_FLIGHT,
};
pub use framebuffer::RenderTargets;
pub use handle::{DeviceObject, DeviceRef, Owned, SwapchainHandle};
pub use memory::{find_memory_type, pick_supported_format};
pub use negotiate::{
    check_extensions, evaluate, find_queue_families, negotiate, AshProbe, DeviceProbe,
    MatchPolicy, QueueFamilyIndices, Selection, SurfaceSupport,
};
pub use select::{choose_present_mode, choose_surface_format, PresentPreference};
pub use swapchain::{resolve_extent, resolve_image_count, Swapchain, CURRENT_EXTENT_UNDEFINED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VkOptions {
    pub present: PresentPreference,
    pub match_policy: MatchPolicy,
    /// Enable the Khronos validation layer when installed.
    pub validation: bool,
}

impl Default for VkOptions {
    fn default() -> Self {
        Self {
            present: PresentPreference::default(),
            match_policy: MatchPolicy::default(),
            validation: cfg!(debug_assertions),
        }
    }
}

pub struct VkRenderer {
    commands: CommandResources,
    swapchain: Swapchain,
    context: GpuContext,
    clear: [f32; 4],
}

impl VkRenderer {
    pub fn with_options(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        opts: VkOptions,
    ) -> VkResult<Self> {
        let context = GpuContext::new(window, display, opts.validation, opts.match_policy)?;
        let swapchain = Swapchain::new(&context, size, &opts)?;
        let family = context
            .queue_families()
            .graphics
            .ok_or(VkError::IncompleteQueueFamilies {
                graphics: None,
                present: context.queue_families().present,
            })?;
        let commands = CommandResources::new(context.device(), family, swapchain.image_count())?;
        let clear = [0.0, 0.0, 0.0, 1.0];
        commands.record_clear(context.device(), &swapchain, clear)?;

        let extent = swapchain.extent();
        info!(
            "Vulkan swapchain ready on {} ({}x{}, {} images)",
            context.device_name(),
            extent.width,
            extent.height,
            swapchain.image_count()
        );
        Ok(Self {
            commands,
            swapchain,
            context,
            clear,
        })
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// One acquire → submit → present cycle using the prerecorded buffer for
    /// the acquired image.
    pub fn draw_frame(&mut self) -> VkResult<()> {
        let image_index = self.swapchain.acquire_next_image()?;
        let cmd: vk::CommandBuffer =
            self.commands
                .get(image_index as usize)
                .ok_or(VkError::ImageIndexOutOfRange {
                    index: image_index,
                    count: self.swapchain.image_count(),
                })?;
        self.swapchain.submit_command_buffers(&[cmd], image_index)
    }

    fn rerecord(&mut self) -> VkResult<()> {
        self.context.wait_idle()?;
        self.commands
            .record_clear(self.context.device(), &self.swapchain, self.clear)
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            error!("{e}");
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        Ok(Self::with_options(
            window,
            display,
            size,
            VkOptions::default(),
        )?)
    }

    fn render(&mut self) -> Result<()> {
        Ok(self.draw_frame()?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
        if let Err(e) = self.rerecord() {
            error!("re-recording clear pass: {e}");
        }
    }
}
