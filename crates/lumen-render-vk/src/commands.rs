// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkResult, VkResultExt};
use crate::handle::{DeviceRef, Owned};
use crate::swapchain::Swapchain;

/// Resettable pool on the graphics family and one primary buffer per image.
pub struct CommandResources {
    buffers: Vec<vk::CommandBuffer>,
    pool: Owned<vk::CommandPool>,
}

impl CommandResources {
    pub(crate) fn new(device: &DeviceRef, queue_family: u32, image_count: usize) -> VkResult<Self> {
        let pool_ci = vk::CommandPoolCreateInfo {
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = unsafe {
            let raw = device
                .create_command_pool(&pool_ci, None)
                .during("vkCreateCommandPool")?;
            Owned::from_raw(device, raw)
        };
        let alloc = vk::CommandBufferAllocateInfo {
            command_pool: pool.raw(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: image_count as u32,
            ..Default::default()
        };
        // freed with the pool
        let buffers = unsafe { device.allocate_command_buffers(&alloc) }
            .during("vkAllocateCommandBuffers")?;
        Ok(Self { buffers, pool })
    }

    pub fn get(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index).copied()
    }

    /// Re-records every buffer as a single clear pass over its framebuffer.
    /// The caller guarantees none of them is pending.
    pub(crate) fn record_clear(
        &self,
        device: &ash::Device,
        swapchain: &Swapchain,
        rgba: [f32; 4],
    ) -> VkResult<()> {
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: rgba },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: swapchain.extent(),
        };
        for (i, &cmd) in self.buffers.iter().enumerate() {
            let Some(framebuffer) = swapchain.framebuffer(i) else {
                continue;
            };
            let begin = vk::CommandBufferBeginInfo::default();
            let rp_begin = vk::RenderPassBeginInfo {
                render_pass: swapchain.render_pass(),
                framebuffer,
                render_area: area,
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            unsafe {
                device
                    .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                    .during("vkResetCommandBuffer")?;
                device
                    .begin_command_buffer(cmd, &begin)
                    .during("vkBeginCommandBuffer")?;
                device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
                device.cmd_end_render_pass(cmd);
                device
                    .end_command_buffer(cmd)
                    .during("vkEndCommandBuffer")?;
            }
        }
        Ok(())
    }
}
