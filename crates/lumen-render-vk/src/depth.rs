// SPDX-License-Identifier: CEPL-1.0
//! One depth attachment per swapchain image.
use ash::vk;
use tracing::debug;

use crate::error::{VkResult, VkResultExt};
use crate::handle::{DeviceRef, Owned};
use crate::memory::{find_memory_type, pick_supported_format};
use crate::negotiate::MatchPolicy;
use crate::select::fmt_name;

/// Probed in order; the first with optimal-tiling depth support wins.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn pick_depth_format(
    props_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> VkResult<vk::Format> {
    pick_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        props_of,
    )
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

pub(crate) fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

// view, image, memory: drop order is the reverse of creation
struct DepthImage {
    view: Owned<vk::ImageView>,
    _image: Owned<vk::Image>,
    _memory: Owned<vk::DeviceMemory>,
}

pub struct DepthAttachments {
    images: Vec<DepthImage>,
    format: vk::Format,
}

impl DepthAttachments {
    pub(crate) fn new(
        device: &DeviceRef,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        format: vk::Format,
        extent: vk::Extent2D,
        count: usize,
        policy: MatchPolicy,
    ) -> VkResult<Self> {
        let images = (0..count)
            .map(|_| create_depth_image(device, mem_props, format, extent, policy))
            .collect::<VkResult<Vec<_>>>()?;
        debug!(
            "depth: {} x {} ({}x{})",
            count,
            fmt_name(format),
            extent.width,
            extent.height
        );
        Ok(Self { images, format })
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn view(&self, index: usize) -> vk::ImageView {
        self.images[index].view.raw()
    }
}

fn create_depth_image(
    device: &DeviceRef,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    format: vk::Format,
    extent: vk::Extent2D,
    policy: MatchPolicy,
) -> VkResult<DepthImage> {
    let img_ci = vk::ImageCreateInfo {
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    unsafe {
        let image = Owned::from_raw(
            device,
            device.create_image(&img_ci, None).during("vkCreateImage")?,
        );

        let req = device.get_image_memory_requirements(image.raw());
        let memory_type_index = find_memory_type(
            mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            policy,
        )?;
        let alloc = vk::MemoryAllocateInfo {
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = Owned::from_raw(
            device,
            device
                .allocate_memory(&alloc, None)
                .during("vkAllocateMemory")?,
        );
        device
            .bind_image_memory(image.raw(), memory.raw(), 0)
            .during("vkBindImageMemory")?;

        let view_ci = vk::ImageViewCreateInfo {
            image: image.raw(),
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect_for(format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        let view = Owned::from_raw(
            device,
            device
                .create_image_view(&view_ci, None)
                .during("vkCreateImageView")?,
        );
        Ok(DepthImage {
            view,
            _image: image,
            _memory: memory,
        })
    }
}
