// SPDX-License-Identifier: CEPL-1.0
//! Surface format and present mode choice.
use ash::vk;
use tracing::warn;

use crate::error::{VkError, VkResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    /// Low latency without tearing when the driver offers it.
    #[default]
    Mailbox,
    Fifo,
}

const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VkResult<vk::SurfaceFormatKHR> {
    let Some(&fallback) = formats.first() else {
        return Err(VkError::NoSurfaceFormats);
    };
    let preferred = PREFERRED_FORMATS.iter().find_map(|&want| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    });
    Ok(preferred.unwrap_or_else(|| {
        warn!(
            "no sRGB surface format offered; using {} / {}",
            fmt_name(fallback.format),
            cs_name(fallback.color_space)
        );
        fallback
    }))
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentPreference,
) -> VkResult<vk::PresentModeKHR> {
    let Some(&first) = modes.first() else {
        return Err(VkError::NoPresentModes);
    };
    let order: &[vk::PresentModeKHR] = match pref {
        PresentPreference::Mailbox => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        PresentPreference::Fifo => &[vk::PresentModeKHR::FIFO],
    };
    Ok(order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or_else(|| {
            // FIFO is mandatory, so only a broken driver lands here
            warn!("surface lacks FIFO; using {}", pm_name(first));
            first
        }))
}

// Info only
pub(crate) fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::D32_SFLOAT => "D32_SFLOAT",
        vk::Format::D32_SFLOAT_S8_UINT => "D32_SFLOAT_S8_UINT",
        vk::Format::D24_UNORM_S8_UINT => "D24_UNORM_S8_UINT",
        _ => "OTHER",
    }
}

pub(crate) fn cs_name(cs: vk::ColorSpaceKHR) -> &'static str {
    match cs {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => "SRGB_NONLINEAR",
        vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT => "DISPLAY_P3_NONLINEAR",
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => "EXTENDED_SRGB_LINEAR",
        _ => "OTHER",
    }
}

pub(crate) fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn prefers_rgba_srgb_then_bgra_srgb() {
        let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;
        let formats = [
            sf(vk::Format::B8G8R8A8_UNORM, srgb),
            sf(vk::Format::B8G8R8A8_SRGB, srgb),
            sf(vk::Format::R8G8B8A8_SRGB, srgb),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R8G8B8A8_SRGB
        );
        assert_eq!(
            choose_surface_format(&formats[..2]).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn srgb_format_needs_srgb_color_space() {
        let formats = [
            sf(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen, formats[0]);
        assert!(formats.contains(&chosen));
    }

    #[test]
    fn empty_lists_are_errors() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(VkError::NoSurfaceFormats)
        ));
        assert!(matches!(
            choose_present_mode(&[], PresentPreference::Mailbox),
            Err(VkError::NoPresentModes)
        ));
    }

    #[test]
    fn mailbox_when_offered_else_fifo() {
        use vk::PresentModeKHR as M;
        let both = [M::FIFO, M::IMMEDIATE, M::MAILBOX];
        assert_eq!(choose_present_mode(&both, PresentPreference::Mailbox).unwrap(), M::MAILBOX);
        assert_eq!(choose_present_mode(&both, PresentPreference::Fifo).unwrap(), M::FIFO);
        assert_eq!(
            choose_present_mode(&[M::IMMEDIATE, M::FIFO], PresentPreference::Mailbox).unwrap(),
            M::FIFO
        );
    }

    #[test]
    fn chosen_mode_is_always_offered() {
        use vk::PresentModeKHR as M;
        let odd = [M::IMMEDIATE, M::FIFO_RELAXED];
        let chosen = choose_present_mode(&odd, PresentPreference::Mailbox).unwrap();
        assert!(odd.contains(&chosen));
    }
}
