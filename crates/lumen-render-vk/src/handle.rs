// SPDX-License-Identifier: CEPL-1.0
//! Scoped ownership of device-level Vulkan objects.
//!
//! Each `Owned<T>` destroys its handle when dropped. Structs that hold several
//! of them declare fields in reverse creation order, so dropping the owner
//! tears everything down in dependency order with no manual sequencing.
use ash::{khr::swapchain, vk};
use std::sync::Arc;

pub type DeviceRef = Arc<ash::Device>;

pub trait DeviceObject: Copy {
    /// # Safety
    /// The handle must have been created from `device` and must no longer be
    /// in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_object {
    ($ty:ty, $destroy:ident) => {
        impl DeviceObject for $ty {
            unsafe fn destroy(self, device: &ash::Device) {
                unsafe { device.$destroy(self, None) }
            }
        }
    };
}

device_object!(vk::ImageView, destroy_image_view);
device_object!(vk::Image, destroy_image);
device_object!(vk::DeviceMemory, free_memory);
device_object!(vk::Framebuffer, destroy_framebuffer);
device_object!(vk::RenderPass, destroy_render_pass);
device_object!(vk::Semaphore, destroy_semaphore);
device_object!(vk::Fence, destroy_fence);
device_object!(vk::CommandPool, destroy_command_pool);

pub struct Owned<T: DeviceObject> {
    device: DeviceRef,
    raw: T,
}

impl<T: DeviceObject> Owned<T> {
    /// # Safety
    /// `raw` must come from `device` and must not be owned elsewhere.
    pub(crate) unsafe fn from_raw(device: &DeviceRef, raw: T) -> Self {
        Self {
            device: Arc::clone(device),
            raw,
        }
    }

    pub fn raw(&self) -> T {
        self.raw
    }
}

impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        unsafe { self.raw.destroy(&self.device) }
    }
}

/// The presentation chain. Its images belong to the presentation engine and
/// are released together with the chain.
pub struct SwapchainHandle {
    loader: swapchain::Device,
    raw: vk::SwapchainKHR,
}

impl SwapchainHandle {
    /// # Safety
    /// `raw` must come from `loader` and must not be owned elsewhere.
    pub(crate) unsafe fn from_raw(loader: swapchain::Device, raw: vk::SwapchainKHR) -> Self {
        Self { loader, raw }
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.raw, None) }
    }
}
