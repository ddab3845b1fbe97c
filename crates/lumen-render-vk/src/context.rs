// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical device choice and the logical device.
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkError, VkResult, VkResultExt};
use crate::handle::DeviceRef;
use crate::negotiate::{negotiate, AshProbe, MatchPolicy, QueueFamilyIndices, SurfaceSupport};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"lumen";

/// Extensions every selected device must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(S::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(S::INFO) {
        debug!(target: "vulkan", "{msg}");
    } else {
        trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
}

// debug messenger, then instance
struct InstanceOwner {
    debug: Option<DebugMessenger>,
    instance: ash::Instance,
    entry: Entry,
}

impl Drop for InstanceOwner {
    fn drop(&mut self) {
        unsafe {
            if let Some(d) = self.debug.take() {
                d.loader.destroy_debug_utils_messenger(d.raw, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct SurfaceOwner {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
}

impl Drop for SurfaceOwner {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) }
    }
}

fn layer_available(entry: &Entry, name: &CStr) -> bool {
    match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name),
        Err(e) => {
            warn!("enumerate_instance_layer_properties: {e}");
            false
        }
    }
}

fn create_instance(entry: Entry, display: RawDisplayHandle, validation: bool) -> VkResult<InstanceOwner> {
    let app_info = vk::ApplicationInfo {
        p_application_name: APP_NAME.as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: vk::make_api_version(0, 0, 1, 0),
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .during("vkEnumerateInstanceExtensionProperties")?
        .to_vec();

    let validation = validation && {
        let ok = layer_available(&entry, VALIDATION_LAYER);
        if !ok {
            warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        ok
    };
    let layers: Vec<*const c_char> = if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let ci = vk::InstanceCreateInfo {
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    let instance = unsafe { entry.create_instance(&ci, None) }.during("vkCreateInstance")?;
    let mut owner = InstanceOwner {
        debug: None,
        instance,
        entry,
    };

    if validation {
        let loader = debug_utils::Instance::new(&owner.entry, &owner.instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let raw = unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .during("vkCreateDebugUtilsMessengerEXT")?;
        owner.debug = Some(DebugMessenger { loader, raw });
        info!("vk: validation layer enabled");
    }
    Ok(owner)
}

/// Everything below the swapchain: created once, destroyed last.
pub struct GpuContext {
    device: DeviceRef,
    physical: vk::PhysicalDevice,
    device_name: String,
    indices: QueueFamilyIndices,
    support: SurfaceSupport,
    mem_props: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    surface: SurfaceOwner,
    instance: InstanceOwner,
}

impl GpuContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
        policy: MatchPolicy,
    ) -> VkResult<Self> {
        let entry = unsafe { Entry::load()? };
        let display_raw = display.display_handle()?.as_raw();
        let window_raw = window.window_handle()?.as_raw();

        let instance = create_instance(entry, display_raw, validation)?;
        let raw_surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_raw,
                window_raw,
                None,
            )
        }
        .during("vkCreateSurfaceKHR")?;
        let surface = SurfaceOwner {
            loader: surface::Instance::new(&instance.entry, &instance.instance),
            raw: raw_surface,
        };

        // on any error below, surface then instance drop in that order
        let candidates = unsafe { instance.instance.enumerate_physical_devices() }
            .during("vkEnumeratePhysicalDevices")?;
        debug!("vk: {} physical device(s)", candidates.len());
        let probe = AshProbe {
            instance: &instance.instance,
            surface_loader: &surface.loader,
            surface: surface.raw,
        };
        let selection = negotiate(&probe, &candidates, &REQUIRED_DEVICE_EXTENSIONS, policy)?;
        let physical = selection.device;

        let props = unsafe { instance.instance.get_physical_device_properties(physical) };
        info!(
            "GPU: {} ({:?}), driver {:#x}, Vulkan {}.{}.{}",
            selection.name,
            props.device_type,
            props.driver_version,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version),
        );

        let device = create_logical_device(&instance.instance, physical, &selection.indices)?;
        let (graphics, present) = match (selection.indices.graphics, selection.indices.present) {
            (Some(g), Some(p)) => (g, p),
            // negotiate only returns complete selections
            (g, p) => {
                unsafe { device.destroy_device(None) };
                return Err(VkError::IncompleteQueueFamilies {
                    graphics: g,
                    present: p,
                });
            }
        };
        let graphics_queue = unsafe { device.get_device_queue(graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(present, 0) };
        let mem_props = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical)
        };

        Ok(Self {
            device: Arc::new(device),
            physical,
            device_name: selection.name,
            indices: selection.indices,
            support: selection.support,
            mem_props,
            graphics_queue,
            present_queue,
            surface,
            instance,
        })
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.raw
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.indices
    }

    /// Capabilities, formats and present modes as captured during selection.
    pub fn surface_support(&self) -> &SurfaceSupport {
        &self.support
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.mem_props
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical, format)
        }
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }.during("vkDeviceWaitIdle")
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("vkDeviceWaitIdle during teardown: {e}");
            }
            if Arc::strong_count(&self.device) > 1 {
                warn!("vk: device destroyed while still shared");
            }
            self.device.destroy_device(None);
        }
    }
}

fn create_logical_device(
    instance: &ash::Instance,
    physical: vk::PhysicalDevice,
    indices: &QueueFamilyIndices,
) -> VkResult<ash::Device> {
    let priorities = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = indices
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();
    let extensions: Vec<*const c_char> =
        REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures::default();

    let ci = vk::DeviceCreateInfo {
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    unsafe { instance.create_device(physical, &ci, None) }.during("vkCreateDevice")
}
