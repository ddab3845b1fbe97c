// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkError, VkResult};
use crate::negotiate::MatchPolicy;

/// First candidate whose features for `tiling` cover `required`.
pub fn pick_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    required: vk::FormatFeatureFlags,
    props_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> VkResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&fmt| {
            let props = props_of(fmt);
            let feats = match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features,
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features,
                _ => vk::FormatFeatureFlags::empty(),
            };
            feats.contains(required)
        })
        .ok_or_else(|| VkError::NoSupportedFormat {
            candidates: candidates.to_vec(),
            tiling,
            required,
        })
}

/// Memory type index allowed by `type_bits` whose flags include `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    policy: MatchPolicy,
) -> VkResult<u32> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    let mut found = None;
    for i in 0..count {
        let ok = (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize].property_flags.contains(required);
        if ok {
            policy.record(&mut found, i);
        }
    }
    found.ok_or(VkError::NoMemoryType {
        type_bits,
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    #[test]
    fn memory_type_respects_mask_and_flags() {
        use vk::MemoryPropertyFlags as F;
        let props = mem_props(&[
            F::HOST_VISIBLE,
            F::DEVICE_LOCAL,
            F::DEVICE_LOCAL | F::HOST_VISIBLE,
            F::DEVICE_LOCAL,
        ]);
        let all = 0b1111;
        assert_eq!(find_memory_type(&props, all, F::DEVICE_LOCAL, MatchPolicy::First).unwrap(), 1);
        assert_eq!(find_memory_type(&props, all, F::DEVICE_LOCAL, MatchPolicy::Last).unwrap(), 3);
        // bit 1 masked out
        assert_eq!(
            find_memory_type(&props, 0b1101, F::DEVICE_LOCAL, MatchPolicy::First).unwrap(),
            2
        );
    }

    #[test]
    fn no_memory_type_is_an_error() {
        use vk::MemoryPropertyFlags as F;
        let props = mem_props(&[F::HOST_VISIBLE, F::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b01, F::DEVICE_LOCAL, MatchPolicy::First).unwrap_err();
        assert!(matches!(err, VkError::NoMemoryType { type_bits: 0b01, .. }));
    }

    fn table(fmt: vk::Format) -> vk::FormatProperties {
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        match fmt {
            vk::Format::D32_SFLOAT => vk::FormatProperties {
                linear_tiling_features: depth,
                ..Default::default()
            },
            vk::Format::D24_UNORM_S8_UINT => vk::FormatProperties {
                optimal_tiling_features: depth,
                ..Default::default()
            },
            _ => vk::FormatProperties::default(),
        }
    }

    #[test]
    fn format_pick_follows_tiling() {
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        assert_eq!(
            pick_supported_format(&candidates, vk::ImageTiling::OPTIMAL, depth, table).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert_eq!(
            pick_supported_format(&candidates, vk::ImageTiling::LINEAR, depth, table).unwrap(),
            vk::Format::D32_SFLOAT
        );
    }

    #[test]
    fn unsupported_formats_are_an_error() {
        let err = pick_supported_format(
            &[vk::Format::D32_SFLOAT_S8_UINT],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            table,
        )
        .unwrap_err();
        assert!(matches!(err, VkError::NoSupportedFormat { .. }));
    }
}
