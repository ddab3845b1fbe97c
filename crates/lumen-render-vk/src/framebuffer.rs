// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::depth::DepthAttachments;
use crate::error::{VkResult, VkResultExt};
use crate::handle::{DeviceRef, Owned};

/// Framebuffer `i` binds `[color_views[i], depth.view(i)]`.
pub struct RenderTargets {
    framebuffers: Vec<Owned<vk::Framebuffer>>,
}

impl RenderTargets {
    pub(crate) fn new(
        device: &DeviceRef,
        render_pass: vk::RenderPass,
        color_views: &[vk::ImageView],
        depth: &DepthAttachments,
        extent: vk::Extent2D,
    ) -> VkResult<Self> {
        let mut framebuffers = Vec::with_capacity(color_views.len());
        for (i, &color) in color_views.iter().enumerate() {
            let attachments = [color, depth.view(i)];
            let ci = vk::FramebufferCreateInfo {
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let raw = unsafe { device.create_framebuffer(&ci, None) }.during("vkCreateFramebuffer")?;
            framebuffers.push(unsafe { Owned::from_raw(device, raw) });
        }
        Ok(Self { framebuffers })
    }

    pub fn get(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(Owned::raw)
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}
