// SPDX-License-Identifier: CEPL-1.0
//! The swapchain and everything sized by it: color views, the render pass,
//! depth attachments, framebuffers and the frames in flight.
use ash::khr::swapchain;
use ash::vk;
use lumen_render::RenderSize;
use tracing::{info, warn};

use crate::context::GpuContext;
use crate::depth::{pick_depth_format, DepthAttachments};
use crate::error::{VkError, VkResult, VkResultExt};
use crate::frame::{AshFrames, FrameSynchronizer};
use crate::framebuffer::RenderTargets;
use crate::handle::{DeviceRef, Owned, SwapchainHandle};
use crate::render_pass::create_render_pass;
use crate::select::{choose_present_mode, choose_surface_format, cs_name, fmt_name, pm_name};
use crate::VkOptions;

/// `current_extent.width` value meaning the window decides the size.
pub const CURRENT_EXTENT_UNDEFINED: u32 = u32::MAX;

pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != CURRENT_EXTENT_UNDEFINED {
        return caps.current_extent;
    }
    // max-then-min so a driver reporting min > max cannot panic
    vk::Extent2D {
        width: window
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: window
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn resolve_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

fn composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| supported.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub struct Swapchain {
    frames: FrameSynchronizer<AshFrames>,
    targets: RenderTargets,
    depth: DepthAttachments,
    render_pass: Owned<vk::RenderPass>,
    views: Vec<Owned<vk::ImageView>>,
    chain: SwapchainHandle,
    device: DeviceRef,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(ctx: &GpuContext, window_size: RenderSize, opts: &VkOptions) -> VkResult<Self> {
        let indices = ctx.queue_families();
        let family = match (indices.graphics, indices.present) {
            (Some(g), Some(p)) if g == p => g,
            (Some(graphics), Some(present)) => {
                return Err(VkError::SplitQueueFamilies { graphics, present })
            }
            (graphics, present) => {
                return Err(VkError::IncompleteQueueFamilies { graphics, present })
            }
        };

        let support = ctx.surface_support();
        let caps = &support.capabilities;
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, opts.present)?;
        let extent = resolve_extent(caps, window_size);
        let min_image_count = resolve_image_count(caps);

        let device = ctx.device();
        let ci = vk::SwapchainCreateInfoKHR {
            surface: ctx.surface(),
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: caps.current_transform,
            composite_alpha: composite_alpha(caps.supported_composite_alpha),
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        let loader = swapchain::Device::new(ctx.instance(), device);
        let chain = unsafe {
            let raw = loader
                .create_swapchain(&ci, None)
                .during("vkCreateSwapchainKHR")?;
            SwapchainHandle::from_raw(loader.clone(), raw)
        };

        // the driver may create more images than requested
        let images = unsafe { loader.get_swapchain_images(chain.raw()) }
            .during("vkGetSwapchainImagesKHR")?;
        let views = images
            .iter()
            .map(|&image| create_color_view(device, image, format.format))
            .collect::<VkResult<Vec<_>>>()?;

        let depth_format = pick_depth_format(|f| ctx.format_properties(f))?;
        let render_pass = create_render_pass(device, format.format, depth_format)?;
        let depth = DepthAttachments::new(
            device,
            ctx.memory_properties(),
            depth_format,
            extent,
            images.len(),
            opts.match_policy,
        )?;
        let color_views: Vec<vk::ImageView> = views.iter().map(Owned::raw).collect();
        let targets = RenderTargets::new(device, render_pass.raw(), &color_views, &depth, extent)?;

        let frames = FrameSynchronizer::new(
            AshFrames {
                device: DeviceRef::clone(device),
                loader,
                swapchain: chain.raw(),
                graphics_queue: ctx.graphics_queue(),
                present_queue: ctx.present_queue(),
            },
            images.len(),
        )?;

        info!(
            "swapchain: {} / {}, {}, {}x{}, images(min={} → got={}), depth {}, family {}",
            fmt_name(format.format),
            cs_name(format.color_space),
            pm_name(present_mode),
            extent.width,
            extent.height,
            min_image_count,
            images.len(),
            fmt_name(depth_format),
            family
        );

        Ok(Self {
            frames,
            targets,
            depth,
            render_pass,
            views,
            chain,
            device: DeviceRef::clone(device),
            format,
            present_mode,
            extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.views.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }

    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.targets.get(index)
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth.format()
    }

    pub fn current_frame(&self) -> usize {
        self.frames.current_frame()
    }

    pub fn acquire_next_image(&mut self) -> VkResult<u32> {
        self.frames.acquire_next_image()
    }

    pub fn submit_command_buffers(
        &mut self,
        buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> VkResult<()> {
        self.frames.submit_command_buffers(buffers, image_index)
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.chain.raw()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // fields then drop in declaration order: frames first, chain last
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            warn!("vkDeviceWaitIdle before swapchain teardown: {e}");
        }
    }
}

fn create_color_view(
    device: &DeviceRef,
    image: vk::Image,
    format: vk::Format,
) -> VkResult<Owned<vk::ImageView>> {
    let ci = vk::ImageViewCreateInfo {
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping::default(),
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe {
        let raw = device
            .create_image_view(&ci, None)
            .during("vkCreateImageView")?;
        Ok(Owned::from_raw(device, raw))
    }
}
