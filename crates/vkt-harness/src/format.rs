//! Format facts the harness needs on the host side: texel sizes for readback,
//! aspects for views and barriers, and unorm packing so tests can predict the
//! exact bytes a clear or a draw leaves behind.

use ash::vk;

/// Bytes per texel, for the formats the harness knows how to read back.
pub fn texel_size(format: vk::Format) -> Option<u32> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_UINT | vk::Format::S8_UINT => 1,
        vk::Format::R5G6B5_UNORM_PACK16
        | vk::Format::B5G6R5_UNORM_PACK16
        | vk::Format::R5G5B5A1_UNORM_PACK16
        | vk::Format::B5G5R5A1_UNORM_PACK16
        | vk::Format::A1R5G5B5_UNORM_PACK16
        | vk::Format::R4G4B4A4_UNORM_PACK16
        | vk::Format::R8G8_UNORM
        | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R32G32_SFLOAT
        | vk::Format::D32_SFLOAT_S8_UINT => 8,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => return None,
    };
    Some(size)
}

pub fn is_depth(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect used for views, barriers and subresource queries of `format`.
/// Depth/stencil formats only expose their depth aspect here.
pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth(format) {
        vk::ImageAspectFlags::DEPTH
    } else if has_stencil(format) {
        vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

fn unorm(value: f32, bits: u32) -> u32 {
    let max = ((1u32 << bits) - 1) as f32;
    (value.clamp(0.0, 1.0) * max).round() as u32
}

fn from_unorm(value: u32, bits: u32) -> f32 {
    value as f32 / ((1u32 << bits) - 1) as f32
}

/// Encode an RGBA color the way a unorm clear or shader write stores it.
/// Returns `None` for formats this helper does not model.
pub fn pack_unorm(format: vk::Format, rgba: [f32; 4]) -> Option<Vec<u8>> {
    let [r, g, b, a] = rgba;
    let bytes = match format {
        vk::Format::R8G8B8A8_UNORM => vec![
            unorm(r, 8) as u8,
            unorm(g, 8) as u8,
            unorm(b, 8) as u8,
            unorm(a, 8) as u8,
        ],
        vk::Format::B8G8R8A8_UNORM => vec![
            unorm(b, 8) as u8,
            unorm(g, 8) as u8,
            unorm(r, 8) as u8,
            unorm(a, 8) as u8,
        ],
        vk::Format::R5G5B5A1_UNORM_PACK16 => {
            let packed = (unorm(r, 5) << 11) | (unorm(g, 5) << 6) | (unorm(b, 5) << 1) | unorm(a, 1);
            (packed as u16).to_le_bytes().to_vec()
        }
        vk::Format::R5G6B5_UNORM_PACK16 => {
            let packed = (unorm(r, 5) << 11) | (unorm(g, 6) << 5) | unorm(b, 5);
            (packed as u16).to_le_bytes().to_vec()
        }
        vk::Format::R8_UNORM => vec![unorm(r, 8) as u8],
        _ => return None,
    };
    Some(bytes)
}

/// Inverse of [`pack_unorm`]. Channels missing from the format read as 0
/// (color) or 1 (alpha).
pub fn unpack_unorm(format: vk::Format, bytes: &[u8]) -> Option<[f32; 4]> {
    let size = texel_size(format)? as usize;
    if bytes.len() < size {
        return None;
    }
    let rgba = match format {
        vk::Format::R8G8B8A8_UNORM => [
            from_unorm(bytes[0] as u32, 8),
            from_unorm(bytes[1] as u32, 8),
            from_unorm(bytes[2] as u32, 8),
            from_unorm(bytes[3] as u32, 8),
        ],
        vk::Format::B8G8R8A8_UNORM => [
            from_unorm(bytes[2] as u32, 8),
            from_unorm(bytes[1] as u32, 8),
            from_unorm(bytes[0] as u32, 8),
            from_unorm(bytes[3] as u32, 8),
        ],
        vk::Format::R5G5B5A1_UNORM_PACK16 => {
            let packed = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
            [
                from_unorm((packed >> 11) & 0x1f, 5),
                from_unorm((packed >> 6) & 0x1f, 5),
                from_unorm((packed >> 1) & 0x1f, 5),
                from_unorm(packed & 0x1, 1),
            ]
        }
        vk::Format::R5G6B5_UNORM_PACK16 => {
            let packed = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
            [
                from_unorm((packed >> 11) & 0x1f, 5),
                from_unorm((packed >> 5) & 0x3f, 6),
                from_unorm(packed & 0x1f, 5),
                1.0,
            ]
        }
        vk::Format::R8_UNORM => [from_unorm(bytes[0] as u32, 8), 0.0, 0.0, 1.0],
        _ => return None,
    };
    Some(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_sizes_of_test_formats() {
        assert_eq!(texel_size(vk::Format::B8G8R8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R5G5B5A1_UNORM_PACK16), Some(2));
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }

    #[test]
    fn aspects() {
        assert_eq!(aspect_mask(vk::Format::B8G8R8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_mask(vk::Format::D24_UNORM_S8_UINT), vk::ImageAspectFlags::DEPTH);
        assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
        assert!(!is_depth(vk::Format::R8_UNORM));
    }

    #[test]
    fn bgra_swaps_red_and_blue() {
        let bytes = pack_unorm(vk::Format::B8G8R8A8_UNORM, [0.2, 0.4, 0.6, 1.0]).unwrap();
        assert_eq!(bytes, vec![153, 102, 51, 255]);
        let rgba = pack_unorm(vk::Format::R8G8B8A8_UNORM, [0.2, 0.4, 0.6, 1.0]).unwrap();
        assert_eq!(rgba, vec![51, 102, 153, 255]);
    }

    #[test]
    fn packed_16_bit_layout() {
        // r=1 g=0 b=0 a=1 -> 0b11111_00000_00000_1
        let bytes = pack_unorm(vk::Format::R5G5B5A1_UNORM_PACK16, [1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 0xf801);

        let back = unpack_unorm(vk::Format::R5G5B5A1_UNORM_PACK16, &bytes).unwrap();
        assert_eq!(back, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn values_are_clamped() {
        let bytes = pack_unorm(vk::Format::R8G8B8A8_UNORM, [-1.0, 2.0, 0.0, 1.0]).unwrap();
        assert_eq!(bytes, vec![0, 255, 0, 255]);
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert!(unpack_unorm(vk::Format::B8G8R8A8_UNORM, &[1, 2]).is_none());
        assert!(unpack_unorm(vk::Format::D32_SFLOAT, &[0; 4]).is_none());
    }
}
