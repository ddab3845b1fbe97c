// SPDX-License-Identifier: CEPL-1.0
#![allow(dead_code)]
//! Scripted GPU for frame protocol tests. Work completes instantly unless a
//! submission is marked delayed; waiting on its fence then counts as a
//! blocking wait and completes it.
use lumen_render_vk::{FrameBackend, FrameSlot, VkError, VkResult};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fence(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Semaphore(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Wait { fence: Fence, blocked: bool },
    Reset { fence: Fence },
    Acquire { image: u32, signal: Semaphore },
    Submit { fence: Fence, wait: Semaphore, signal: Semaphore },
    Present { image: u32, wait: Semaphore },
    Drain { wait: Semaphore, fence: Fence },
    Destroy { fence: Fence },
}

#[derive(Clone, Copy, Debug)]
pub enum Failure {
    OutOfDate,
    DeviceLost,
}

impl Failure {
    fn into_error(self, op: &'static str) -> VkError {
        match self {
            Failure::OutOfDate => VkError::SurfaceOutOfDate,
            Failure::DeviceLost => VkError::Api {
                op,
                result: ash::vk::Result::ERROR_DEVICE_LOST,
            },
        }
    }
}

#[derive(Default)]
struct State {
    next_handle: u64,
    slots_created: usize,
    fail_create_at: Option<usize>,
    signaled: HashMap<Fence, bool>,
    events: Vec<Event>,
    image_count: u32,
    next_image: u32,
    script: VecDeque<u32>,
    submissions: usize,
    delayed: HashSet<usize>,
    acquire_failures: VecDeque<Failure>,
    submit_failures: VecDeque<Failure>,
    present_failures: VecDeque<Failure>,
    blocking_wait_failures: VecDeque<Failure>,
}

#[derive(Clone, Default)]
pub struct MockGpu(Rc<RefCell<State>>);

impl MockGpu {
    /// Hands out images round-robin over `image_count` unless scripted.
    pub fn new(image_count: u32) -> Self {
        let gpu = Self::default();
        gpu.0.borrow_mut().image_count = image_count;
        gpu
    }

    pub fn script_images(&self, images: &[u32]) {
        self.0.borrow_mut().script.extend(images);
    }

    /// The `ordinal`-th submission (0-based) stays pending until waited on.
    pub fn delay_submission(&self, ordinal: usize) {
        self.0.borrow_mut().delayed.insert(ordinal);
    }

    pub fn fail_next_acquire(&self, failure: Failure) {
        self.0.borrow_mut().acquire_failures.push_back(failure);
    }

    pub fn fail_next_submit(&self, failure: Failure) {
        self.0.borrow_mut().submit_failures.push_back(failure);
    }

    /// The next wait on an unsignaled fence fails and leaves it unsignaled.
    pub fn fail_next_blocking_wait(&self, failure: Failure) {
        self.0.borrow_mut().blocking_wait_failures.push_back(failure);
    }

    pub fn fail_next_present(&self, failure: Failure) {
        self.0.borrow_mut().present_failures.push_back(failure);
    }

    /// Slot creation number `n` (0-based) fails.
    pub fn fail_slot_creation_at(&self, n: usize) {
        self.0.borrow_mut().fail_create_at = Some(n);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn blocking_waits(&self) -> Vec<Fence> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Wait {
                    fence,
                    blocked: true,
                } => Some(fence),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<Fence> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Destroy { fence } => Some(fence),
                _ => None,
            })
            .collect()
    }

    fn handle(state: &mut State) -> u64 {
        state.next_handle += 1;
        state.next_handle
    }
}

impl FrameBackend for MockGpu {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type CommandBuffer = u32;

    fn create_slot(&self) -> VkResult<FrameSlot<Self>> {
        let mut s = self.0.borrow_mut();
        let n = s.slots_created;
        s.slots_created += 1;
        if s.fail_create_at == Some(n) {
            return Err(VkError::Api {
                op: "vkCreateFence",
                result: ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        let image_available = Semaphore(Self::handle(&mut s));
        let render_finished = Semaphore(Self::handle(&mut s));
        let in_flight = Fence(Self::handle(&mut s));
        s.signaled.insert(in_flight, true);
        Ok(FrameSlot {
            image_available,
            render_finished,
            in_flight,
        })
    }

    fn destroy_slot(&self, slot: &FrameSlot<Self>) {
        let mut s = self.0.borrow_mut();
        s.signaled.remove(&slot.in_flight);
        s.events.push(Event::Destroy {
            fence: slot.in_flight,
        });
    }

    fn wait_fence(&self, fence: Fence) -> VkResult<()> {
        let mut s = self.0.borrow_mut();
        let signaled = s.signaled.get(&fence).copied().unwrap_or(false);
        s.events.push(Event::Wait {
            fence,
            blocked: !signaled,
        });
        if !signaled {
            if let Some(f) = s.blocking_wait_failures.pop_front() {
                return Err(f.into_error("vkWaitForFences"));
            }
        }
        s.signaled.insert(fence, true);
        Ok(())
    }

    fn reset_fence(&self, fence: Fence) -> VkResult<()> {
        let mut s = self.0.borrow_mut();
        s.signaled.insert(fence, false);
        s.events.push(Event::Reset { fence });
        Ok(())
    }

    fn acquire_next_image(&self, signal: Semaphore) -> VkResult<u32> {
        let mut s = self.0.borrow_mut();
        if let Some(f) = s.acquire_failures.pop_front() {
            return Err(f.into_error("vkAcquireNextImageKHR"));
        }
        let image = match s.script.pop_front() {
            Some(i) => i,
            None => {
                let i = s.next_image;
                s.next_image = (i + 1) % s.image_count.max(1);
                i
            }
        };
        s.events.push(Event::Acquire { image, signal });
        Ok(image)
    }

    fn submit(&self, _buffers: &[u32], wait: Semaphore, signal: Semaphore, fence: Fence) -> VkResult<()> {
        let mut s = self.0.borrow_mut();
        if let Some(f) = s.submit_failures.pop_front() {
            return Err(f.into_error("vkQueueSubmit"));
        }
        let ordinal = s.submissions;
        s.submissions += 1;
        let done = !s.delayed.contains(&ordinal);
        s.signaled.insert(fence, done);
        s.events.push(Event::Submit {
            fence,
            wait,
            signal,
        });
        Ok(())
    }

    fn present(&self, image: u32, wait: Semaphore) -> VkResult<()> {
        let mut s = self.0.borrow_mut();
        s.events.push(Event::Present { image, wait });
        match s.present_failures.pop_front() {
            Some(f) => Err(f.into_error("vkQueuePresentKHR")),
            None => Ok(()),
        }
    }

    fn drain_semaphore(&self, wait: Semaphore, fence: Fence) -> VkResult<()> {
        let mut s = self.0.borrow_mut();
        s.signaled.insert(fence, true);
        s.events.push(Event::Drain { wait, fence });
        Ok(())
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
