use vkt_harness::vk;
use vkt_harness::{Context, Image, ImageDesc, Result};

pub(crate) const WIDTH: u32 = 300;
pub(crate) const HEIGHT: u32 = 300;
pub(crate) const COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub(crate) const BACKGROUND: [f32; 4] = [0.2, 0.2, 0.2, 1.0];

/// (-1,-1), (0,1), (1,-1) as bare positions.
pub(crate) const TRIANGLE_POSITIONS: [f32; 6] = [-1.0, -1.0, 0.0, 1.0, 1.0, -1.0];

/// Single-sample, host-readable color attachment with a render view.
pub(crate) fn linear_target<'c>(ctx: &'c Context, format: vk::Format, width: u32, height: u32) -> Result<Image<'c>> {
    let desc = ImageDesc::new(format, width, height)
        .tiling(vk::ImageTiling::LINEAR)
        .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);
    let mut image = Image::new(ctx, &desc)?;
    image.create_render_view(vk::ImageAspectFlags::COLOR)?;
    Ok(image)
}
