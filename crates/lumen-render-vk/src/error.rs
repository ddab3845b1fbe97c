// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::ffi::CString;

use crate::frame::SlotState;

pub type VkResult<T> = Result<T, VkError>;

#[derive(Debug, thiserror::Error)]
pub enum VkError {
    // negotiation: fatal at startup
    #[error("no physical device satisfies the queue, extension and surface requirements")]
    NoSuitableDevice,
    #[error("device {device:?} lacks required extension {extension:?}")]
    MissingExtension { device: String, extension: CString },
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,

    // resource creation
    #[error("{op} failed: {result}")]
    Api {
        op: &'static str,
        result: vk::Result,
    },
    #[error("no memory type in mask {type_bits:#b} has {required:?}")]
    NoMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },
    #[error("none of {candidates:?} supports {required:?} with {tiling:?} tiling")]
    NoSupportedFormat {
        candidates: Vec<vk::Format>,
        tiling: vk::ImageTiling,
        required: vk::FormatFeatureFlags,
    },
    #[error("graphics family {graphics} and present family {present} differ; exclusive sharing needs one family")]
    SplitQueueFamilies { graphics: u32, present: u32 },
    #[error("queue families incomplete (graphics: {graphics:?}, present: {present:?})")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    // per-frame protocol
    #[error("surface is out of date")]
    SurfaceOutOfDate,
    #[error("frame slot {slot} is {state:?}; acquire and submit must alternate")]
    FrameOutOfOrder { slot: usize, state: SlotState },
    #[error("image index {index} out of range for {count} swapchain images")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

impl VkError {
    /// Only a stale surface is worth retrying; everything else ends the loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VkError::SurfaceOutOfDate)
    }
}

/// Names the Vulkan call behind a raw `vk::Result`, the way `anyhow::Context` names a step.
pub trait VkResultExt<T> {
    fn during(self, op: &'static str) -> VkResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn during(self, op: &'static str) -> VkResult<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => VkError::SurfaceOutOfDate,
            result => VkError::Api { op, result },
        })
    }
}
