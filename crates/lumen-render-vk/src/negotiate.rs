// SPDX-License-Identifier: CEPL-1.0
//! Device suitability: queue families, extensions and surface support.
use ash::khr::surface;
use ash::vk;
use std::ffi::{CStr, CString};
use tracing::{debug, info, warn};

use crate::error::{VkError, VkResult, VkResultExt};

/// Which candidate a scan keeps when several match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    #[default]
    First,
    /// Overwrites on every match, so the last matching index wins.
    Last,
}

impl MatchPolicy {
    pub(crate) fn record(self, slot: &mut Option<u32>, index: u32) {
        match self {
            MatchPolicy::First => {
                slot.get_or_insert(index);
            }
            MatchPolicy::Last => *slot = Some(index),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(2);
        for idx in [self.graphics, self.present].into_iter().flatten() {
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }

    /// The single family serving both graphics and presentation, if there is one.
    pub fn shared_family(&self) -> Option<u32> {
        match (self.graphics, self.present) {
            (Some(g), Some(p)) if g == p => Some(g),
            _ => None,
        }
    }
}

/// Capability snapshot for one device/surface pairing. Never refreshed.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Queries the negotiator needs from a physical device.
pub trait DeviceProbe {
    type Device: Copy;

    fn name(&self, device: Self::Device) -> String;
    fn queue_families(&self, device: Self::Device) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, device: Self::Device, family: u32) -> VkResult<bool>;
    fn extensions(&self, device: Self::Device) -> VkResult<Vec<CString>>;
    fn surface_support(&self, device: Self::Device) -> VkResult<SurfaceSupport>;
}

#[derive(Clone, Debug)]
pub struct Selection<D> {
    pub device: D,
    pub name: String,
    pub indices: QueueFamilyIndices,
    pub support: SurfaceSupport,
}

/// Picks graphics and present families. A family that does both takes
/// precedence over any split pair: `First` stops at the first such family,
/// `Last` scans them all and keeps the final one.
pub fn find_queue_families<P: DeviceProbe>(
    probe: &P,
    device: P::Device,
    policy: MatchPolicy,
) -> VkResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();
    let mut shared = None;
    for (i, family) in probe.queue_families(device).iter().enumerate() {
        let i = i as u32;
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = probe.supports_present(device, i)?;
        if graphics {
            policy.record(&mut indices.graphics, i);
        }
        if present {
            policy.record(&mut indices.present, i);
        }
        if graphics && present {
            policy.record(&mut shared, i);
            if policy == MatchPolicy::First {
                break;
            }
        }
    }
    if let Some(family) = shared {
        indices.graphics = Some(family);
        indices.present = Some(family);
    }
    Ok(indices)
}

/// Fails on the first required extension the device lacks.
pub fn check_extensions<P: DeviceProbe>(
    probe: &P,
    device: P::Device,
    required: &[&CStr],
) -> VkResult<()> {
    let available = probe.extensions(device)?;
    for &name in required {
        if !available.iter().any(|ext| ext.as_c_str() == name) {
            return Err(VkError::MissingExtension {
                device: probe.name(device),
                extension: name.to_owned(),
            });
        }
    }
    Ok(())
}

/// Returns the selection if `device` meets every requirement, `None` otherwise.
pub fn evaluate<P: DeviceProbe>(
    probe: &P,
    device: P::Device,
    required: &[&CStr],
    policy: MatchPolicy,
) -> VkResult<Option<Selection<P::Device>>> {
    let name = probe.name(device);
    let indices = find_queue_families(probe, device, policy)?;
    if !indices.is_complete() {
        debug!(
            "{name}: incomplete queue families (graphics: {:?}, present: {:?})",
            indices.graphics, indices.present
        );
        return Ok(None);
    }
    if indices.shared_family().is_none() {
        debug!(
            "{name}: graphics and present split across families {:?}",
            indices.unique()
        );
        return Ok(None);
    }
    if let Err(e) = check_extensions(probe, device, required) {
        warn!("{e}");
        return Ok(None);
    }
    let support = probe.surface_support(device)?;
    if !support.is_adequate() {
        debug!(
            "{name}: surface offers {} formats / {} present modes",
            support.formats.len(),
            support.present_modes.len()
        );
        return Ok(None);
    }
    Ok(Some(Selection {
        device,
        name,
        indices,
        support,
    }))
}

/// First candidate that qualifies, in list order.
pub fn negotiate<P: DeviceProbe>(
    probe: &P,
    candidates: &[P::Device],
    required: &[&CStr],
    policy: MatchPolicy,
) -> VkResult<Selection<P::Device>> {
    for &device in candidates {
        match evaluate(probe, device, required, policy) {
            Ok(Some(sel)) => {
                info!(
                    "selected {} (graphics family {:?}, present family {:?})",
                    sel.name, sel.indices.graphics, sel.indices.present
                );
                return Ok(sel);
            }
            Ok(None) => {}
            Err(e) => warn!("skipping {}: {e}", probe.name(device)),
        }
    }
    Err(VkError::NoSuitableDevice)
}

/// Live queries against an instance and the window surface.
pub struct AshProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl DeviceProbe for AshProbe<'_> {
    type Device = vk::PhysicalDevice;

    fn name(&self, device: vk::PhysicalDevice) -> String {
        let props = unsafe { self.instance.get_physical_device_properties(device) };
        unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(device)
        }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family, self.surface)
        }
        .during("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    fn extensions(&self, device: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let props = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .during("vkEnumerateDeviceExtensionProperties")?;
        Ok(props
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn surface_support(&self, device: vk::PhysicalDevice) -> VkResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(device, self.surface)
                    .during("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(device, self.surface)
                    .during("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(device, self.surface)
                    .during("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::khr::swapchain;

    #[derive(Clone, Default)]
    struct FakeDevice {
        name: &'static str,
        families: Vec<(vk::QueueFlags, bool)>,
        extensions: Vec<&'static CStr>,
        formats: usize,
        modes: usize,
    }

    struct FakeProbe(Vec<FakeDevice>);

    impl DeviceProbe for FakeProbe {
        type Device = usize;

        fn name(&self, device: usize) -> String {
            self.0[device].name.to_string()
        }

        fn queue_families(&self, device: usize) -> Vec<vk::QueueFamilyProperties> {
            self.0[device]
                .families
                .iter()
                .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                    queue_flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(&self, device: usize, family: u32) -> VkResult<bool> {
            Ok(self.0[device].families[family as usize].1)
        }

        fn extensions(&self, device: usize) -> VkResult<Vec<CString>> {
            Ok(self.0[device]
                .extensions
                .iter()
                .map(|e| (*e).to_owned())
                .collect())
        }

        fn surface_support(&self, device: usize) -> VkResult<SurfaceSupport> {
            let d = &self.0[device];
            Ok(SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default(); d.formats],
                present_modes: vec![vk::PresentModeKHR::FIFO; d.modes],
            })
        }
    }

    fn qualifying(name: &'static str) -> FakeDevice {
        FakeDevice {
            name,
            families: vec![(vk::QueueFlags::GRAPHICS, true)],
            extensions: vec![swapchain::NAME],
            formats: 1,
            modes: 1,
        }
    }

    fn lacking_swapchain(name: &'static str) -> FakeDevice {
        FakeDevice {
            extensions: vec![],
            ..qualifying(name)
        }
    }

    #[test]
    fn picks_qualifying_device_regardless_of_order() {
        let required = [swapchain::NAME];
        let probe = FakeProbe(vec![lacking_swapchain("old"), qualifying("good")]);
        let sel = negotiate(&probe, &[0, 1], &required, MatchPolicy::First).unwrap();
        assert_eq!(sel.name, "good");

        let probe = FakeProbe(vec![qualifying("good"), lacking_swapchain("old")]);
        let sel = negotiate(&probe, &[0, 1], &required, MatchPolicy::First).unwrap();
        assert_eq!(sel.name, "good");
    }

    #[test]
    fn no_candidate_is_fatal() {
        let probe = FakeProbe(vec![lacking_swapchain("a")]);
        let err = negotiate(&probe, &[0], &[swapchain::NAME], MatchPolicy::First).unwrap_err();
        assert!(matches!(err, VkError::NoSuitableDevice));

        let empty = FakeProbe(vec![]);
        assert!(negotiate(&empty, &[], &[swapchain::NAME], MatchPolicy::First).is_err());
    }

    #[test]
    fn extension_check_reports_the_missing_one() {
        let probe = FakeProbe(vec![qualifying("gpu")]);
        let other = c"VK_KHR_not_there";
        let err = check_extensions(&probe, 0, &[swapchain::NAME, other]).unwrap_err();
        match err {
            VkError::MissingExtension { device, extension } => {
                assert_eq!(device, "gpu");
                assert_eq!(extension.as_c_str(), other);
            }
            e => panic!("unexpected {e:?}"),
        }
    }

    #[test]
    fn empty_surface_lists_disqualify() {
        let mut no_modes = qualifying("no-modes");
        no_modes.modes = 0;
        let mut no_formats = qualifying("no-formats");
        no_formats.formats = 0;
        let probe = FakeProbe(vec![no_modes, no_formats, qualifying("ok")]);
        let sel = negotiate(&probe, &[0, 1, 2], &[swapchain::NAME], MatchPolicy::First).unwrap();
        assert_eq!(sel.device, 2);
    }

    #[test]
    fn missing_present_support_disqualifies() {
        let mut headless = qualifying("headless");
        headless.families = vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false)];
        let probe = FakeProbe(vec![headless]);
        assert!(evaluate(&probe, 0, &[swapchain::NAME], MatchPolicy::First)
            .unwrap()
            .is_none());
    }

    #[test]
    fn match_policy_decides_between_shared_families() {
        let mut dev = qualifying("multi");
        dev.families = vec![
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
            (vk::QueueFlags::GRAPHICS, true),
        ];
        let probe = FakeProbe(vec![dev]);

        let first = find_queue_families(&probe, 0, MatchPolicy::First).unwrap();
        assert_eq!(first.shared_family(), Some(1));
        assert_eq!(first.unique(), vec![1]);

        let last = find_queue_families(&probe, 0, MatchPolicy::Last).unwrap();
        assert_eq!(last.shared_family(), Some(2));
        assert_eq!(last.unique(), vec![2]);
    }

    #[test]
    fn shared_family_beats_an_earlier_graphics_only_family() {
        let mut dev = qualifying("late-present");
        dev.families = vec![
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::GRAPHICS, true),
        ];
        let probe = FakeProbe(vec![dev]);
        for policy in [MatchPolicy::First, MatchPolicy::Last] {
            let indices = find_queue_families(&probe, 0, policy).unwrap();
            assert_eq!(indices.shared_family(), Some(1), "{policy:?}");
        }
    }

    #[test]
    fn split_families_are_skipped_for_a_shared_device() {
        let mut split = qualifying("split");
        split.families = vec![
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::COMPUTE, true),
        ];
        let required = [swapchain::NAME];

        let probe = FakeProbe(vec![split.clone()]);
        let indices = find_queue_families(&probe, 0, MatchPolicy::First).unwrap();
        assert_eq!((indices.graphics, indices.present), (Some(0), Some(1)));
        assert!(evaluate(&probe, 0, &required, MatchPolicy::First)
            .unwrap()
            .is_none());

        let probe = FakeProbe(vec![split.clone(), qualifying("shared")]);
        let sel = negotiate(&probe, &[0, 1], &required, MatchPolicy::First).unwrap();
        assert_eq!(sel.name, "shared");
        assert_eq!(sel.indices.shared_family(), Some(0));

        let probe = FakeProbe(vec![qualifying("shared"), split]);
        let sel = negotiate(&probe, &[1, 0], &required, MatchPolicy::Last).unwrap();
        assert_eq!(sel.name, "shared");
    }
}
