// SPDX-License-Identifier: CEPL-1.0
//! Frames in flight.
//!
//! Each slot owns an image-available semaphore, a render-finished semaphore
//! and an in-flight fence. A frame goes acquire → submit → present on the
//! slot under the cursor, and the cursor then advances modulo
//! [`MAX_FRAMES_IN_FLIGHT`]. Swapchain images are handed out by the
//! presentation engine in any order, so each image also remembers which slot
//! last rendered to it; submitting to an image still owned by another slot
//! first waits on that slot's fence.
use ash::{khr::swapchain, vk};
use std::fmt::Debug;
use tracing::{debug, error, trace};

use crate::error::{VkError, VkResult, VkResultExt};
use crate::handle::{DeviceObject, DeviceRef};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    Acquiring,
    Presenting,
}

pub struct FrameSlot<B: FrameBackend> {
    pub image_available: B::Semaphore,
    pub render_finished: B::Semaphore,
    pub in_flight: B::Fence,
}

/// GPU operations the frame protocol is written against.
pub trait FrameBackend: Sized {
    type Fence: Copy + PartialEq + Debug;
    type Semaphore: Copy + Debug;
    type CommandBuffer: Copy;

    /// Creates a slot whose fence starts signaled.
    fn create_slot(&self) -> VkResult<FrameSlot<Self>>;
    fn destroy_slot(&self, slot: &FrameSlot<Self>);
    fn wait_fence(&self, fence: Self::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: Self::Fence) -> VkResult<()>;
    fn acquire_next_image(&self, signal: Self::Semaphore) -> VkResult<u32>;
    fn submit(
        &self,
        buffers: &[Self::CommandBuffer],
        wait: Self::Semaphore,
        signal: Self::Semaphore,
        fence: Self::Fence,
    ) -> VkResult<()>;
    fn present(&self, image_index: u32, wait: Self::Semaphore) -> VkResult<()>;
    /// Submits an empty batch that waits on `wait` and signals `fence`.
    fn drain_semaphore(&self, wait: Self::Semaphore, fence: Self::Fence) -> VkResult<()>;
}

pub struct FrameSynchronizer<B: FrameBackend> {
    backend: B,
    slots: Vec<FrameSlot<B>>,
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    images_in_flight: Vec<Option<usize>>,
    current: usize,
}

impl<B: FrameBackend> FrameSynchronizer<B> {
    pub fn new(backend: B, image_count: usize) -> VkResult<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match backend.create_slot() {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in &slots {
                        backend.destroy_slot(slot);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            backend,
            slots,
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            images_in_flight: vec![None; image_count],
            current: 0,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> &FrameSlot<B> {
        &self.slots[index]
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.states[index]
    }

    /// Slot that last submitted work rendering to `image`.
    pub fn image_owner(&self, image: usize) -> Option<usize> {
        self.images_in_flight.get(image).copied().flatten()
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Waits for the current slot to retire, then acquires an image that
    /// becomes usable once the slot's image-available semaphore signals.
    ///
    /// On failure the slot returns to idle and the cursor stays put.
    pub fn acquire_next_image(&mut self) -> VkResult<u32> {
        let cur = self.current;
        if self.states[cur] != SlotState::Idle {
            return Err(VkError::FrameOutOfOrder {
                slot: cur,
                state: self.states[cur],
            });
        }
        self.states[cur] = SlotState::Acquiring;
        match self.try_acquire(cur) {
            Ok(index) => {
                trace!(frame = cur, image = index, "acquired");
                Ok(index)
            }
            Err(e) => {
                self.states[cur] = SlotState::Idle;
                if e.is_recoverable() {
                    debug!(frame = cur, "acquire: {e}");
                } else {
                    error!(frame = cur, "acquire failed: {e}");
                }
                Err(e)
            }
        }
    }

    fn try_acquire(&self, cur: usize) -> VkResult<u32> {
        let slot = &self.slots[cur];
        self.backend.wait_fence(slot.in_flight)?;
        let index = self.backend.acquire_next_image(slot.image_available)?;
        if let Err(e) = self.check_index(index) {
            // image_available still receives the acquire's signal
            self.backend.reset_fence(slot.in_flight)?;
            self.backend.drain_semaphore(slot.image_available, slot.in_flight)?;
            return Err(e);
        }
        Ok(index)
    }

    fn check_index(&self, index: u32) -> VkResult<usize> {
        let i = index as usize;
        if i < self.images_in_flight.len() {
            Ok(i)
        } else {
            Err(VkError::ImageIndexOutOfRange {
                index,
                count: self.images_in_flight.len(),
            })
        }
    }

    /// Submits `buffers` for `image_index` and presents it.
    ///
    /// Must follow [`acquire_next_image`](Self::acquire_next_image) on the
    /// same slot. Once past validation the cursor advances whether or not
    /// submit or present succeed.
    pub fn submit_command_buffers(
        &mut self,
        buffers: &[B::CommandBuffer],
        image_index: u32,
    ) -> VkResult<()> {
        let cur = self.current;
        if self.states[cur] != SlotState::Acquiring {
            return Err(VkError::FrameOutOfOrder {
                slot: cur,
                state: self.states[cur],
            });
        }
        let image = self.check_index(image_index)?;

        let result = self.submit_and_present(cur, buffers, image, image_index);
        self.states[cur] = SlotState::Idle;
        self.current = (cur + 1) % MAX_FRAMES_IN_FLIGHT;
        if let Err(e) = &result {
            if e.is_recoverable() {
                debug!(frame = cur, image, "present: {e}");
            } else {
                error!(frame = cur, image, "frame failed: {e}");
            }
        }
        result
    }

    fn submit_and_present(
        &mut self,
        cur: usize,
        buffers: &[B::CommandBuffer],
        image: usize,
        image_index: u32,
    ) -> VkResult<()> {
        if let Some(owner) = self.images_in_flight[image] {
            if owner != cur {
                trace!(frame = cur, image, owner, "image still in flight");
                self.backend.wait_fence(self.slots[owner].in_flight)?;
            }
        }
        self.images_in_flight[image] = Some(cur);

        let slot = &self.slots[cur];
        self.backend.reset_fence(slot.in_flight)?;
        self.backend.submit(
            buffers,
            slot.image_available,
            slot.render_finished,
            slot.in_flight,
        )?;
        self.states[cur] = SlotState::Presenting;
        self.backend.present(image_index, slot.render_finished)
    }
}

impl<B: FrameBackend> Drop for FrameSynchronizer<B> {
    fn drop(&mut self) {
        for slot in &self.slots {
            self.backend.destroy_slot(slot);
        }
    }
}

/// Frame operations against a live device and swapchain.
pub struct AshFrames {
    pub(crate) device: DeviceRef,
    pub(crate) loader: swapchain::Device,
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl FrameBackend for AshFrames {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandBuffer = vk::CommandBuffer;

    fn create_slot(&self) -> VkResult<FrameSlot<Self>> {
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        unsafe {
            let image_available = self
                .device
                .create_semaphore(&sem_ci, None)
                .during("vkCreateSemaphore")?;
            let render_finished = match self.device.create_semaphore(&sem_ci, None) {
                Ok(s) => s,
                Err(e) => {
                    image_available.destroy(&self.device);
                    return Err(e).during("vkCreateSemaphore");
                }
            };
            let in_flight = match self.device.create_fence(&fence_ci, None) {
                Ok(f) => f,
                Err(e) => {
                    render_finished.destroy(&self.device);
                    image_available.destroy(&self.device);
                    return Err(e).during("vkCreateFence");
                }
            };
            Ok(FrameSlot {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }

    fn destroy_slot(&self, slot: &FrameSlot<Self>) {
        unsafe {
            slot.in_flight.destroy(&self.device);
            slot.render_finished.destroy(&self.device);
            slot.image_available.destroy(&self.device);
        }
    }

    fn wait_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }.during("vkWaitForFences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.during("vkResetFences")
    }

    fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<u32> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        }
        .during("vkAcquireNextImageKHR")?;
        if suboptimal {
            debug!(image = index, "acquire: swapchain suboptimal");
        }
        Ok(index)
    }

    fn submit(
        &self,
        buffers: &[vk::CommandBuffer],
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: buffers.len() as u32,
            p_command_buffers: buffers.as_ptr(),
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), fence)
        }
        .during("vkQueueSubmit")
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VkResult<()> {
        let present = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let suboptimal = unsafe { self.loader.queue_present(self.present_queue, &present) }
            .during("vkQueuePresentKHR")?;
        if suboptimal {
            debug!(image = image_index, "present: swapchain suboptimal");
        }
        Ok(())
    }

    fn drain_semaphore(&self, wait: vk::Semaphore, fence: vk::Fence) -> VkResult<()> {
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit = vk::SubmitInfo {
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), fence)
        }
        .during("vkQueueSubmit")
    }
}
