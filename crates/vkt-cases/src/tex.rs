//! Textured triangle. A linear texture is cleared by a transfer, sampled
//! through a combined image sampler, and both the texture (`tex.ppm`) and the
//! render target (`rt.ppm`) are dumped.
//!
//! `tex` uses an R5G5B5A1 texture; `vktest` is the smoke-test variant with a
//! B8G8R8A8 texture and a transparent black background.

use vkt_harness::vk;
use vkt_harness::{
    AttachmentOps, Buffer, Context, DescriptorSet, Frame, Framebuffer, Image, ImageBarrier,
    ImageDesc, PipelineBuilder, Result, Transition,
};

use crate::common::{linear_target, BACKGROUND, COLOR_FORMAT, HEIGHT, TRIANGLE_POSITIONS, WIDTH};
use crate::{shaders, Case, Output};

#[derive(Debug, Clone)]
pub struct TexCase {
    pub name: &'static str,
    pub color_format: vk::Format,
    pub tex_format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub filter: vk::Filter,
    /// Transfer-clear color of the texture.
    pub tex_color: [f32; 4],
    pub background: [f32; 4],
}

impl Default for TexCase {
    fn default() -> Self {
        Self {
            name: "tex",
            color_format: COLOR_FORMAT,
            tex_format: vk::Format::R5G5B5A1_UNORM_PACK16,
            width: WIDTH,
            height: HEIGHT,
            filter: vk::Filter::NEAREST,
            tex_color: [0.25, 0.5, 0.75, 1.0],
            background: BACKGROUND,
        }
    }
}

/// Texture and render target read back from one submission.
#[derive(Debug, Clone)]
pub struct TexFrames {
    pub texture: Frame,
    pub target: Frame,
}

impl TexCase {
    pub fn vktest() -> Self {
        Self {
            name: "vktest",
            tex_format: COLOR_FORMAT,
            tex_color: [1.0, 1.0, 0.0, 1.0],
            background: [0.0, 0.0, 0.0, 0.0],
            ..Self::default()
        }
    }

    pub fn render_frames(&self, ctx: &Context) -> Result<TexFrames> {
        let vb = Buffer::with_data(ctx, vk::BufferUsageFlags::VERTEX_BUFFER, &TRIANGLE_POSITIONS)?;

        // ── Texture ─────────────────────────────────────────
        let tex_desc = ImageDesc::new(self.tex_format, self.width, self.height)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED);
        let mut tex = Image::new(ctx, &tex_desc)?;
        tex.create_sample_view(vk::ImageAspectFlags::COLOR, self.filter)?;

        // ── Render Target ───────────────────────────────────
        let rt = linear_target(ctx, self.color_format, self.width, self.height)?;
        let fb = Framebuffer::new(ctx, &rt, None, None, AttachmentOps::default())?;

        // ── Pipeline & Descriptors ──────────────────────────
        let (vs, fs) = shaders::TEX.compile()?;
        let pipeline = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, vs)
            .shader(vk::ShaderStageFlags::FRAGMENT, fs)
            .add_set_layout(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                1,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .vertex_components(&[2])
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
            .viewport(fb.extent().width, fb.extent().height)
            .rasterization(vk::PolygonMode::FILL)
            .sample_count(fb.samples())
            .setup(&fb)
            .compile(ctx)?;
        let mut set = DescriptorSet::new(ctx, &pipeline, 0)?;
        set.write_image(0, &tex)?;

        // ── Record & Submit ─────────────────────────────────
        let mut cmd = ctx.begin_command()?;
        cmd.transition(&[ImageBarrier::new(&tex, Transition::TRANSFER_DST)])?;
        cmd.clear_color_image(&tex, self.tex_color)?;
        cmd.transition(&[ImageBarrier::new(&tex, Transition::SHADER_READ)])?;

        cmd.transition(&[ImageBarrier::new(&rt, Transition::ATTACHMENT_WRITE)])?;
        cmd.begin_render_pass(&fb, self.background)?;
        cmd.bind_vertex_buffer(&vb)?;
        cmd.bind_pipeline(&pipeline)?;
        cmd.bind_descriptor_set(&pipeline, &set)?;
        cmd.draw_triangle()?;
        cmd.end_render_pass()?;

        cmd.transition(&[
            ImageBarrier::new(&rt, Transition::ATTACHMENT_HOST_READ),
            ImageBarrier::new(&tex, Transition::SAMPLED_HOST_READ),
        ])?;
        cmd.submit_and_wait()?;

        Ok(TexFrames {
            texture: tex.read_pixels()?,
            target: rt.read_pixels()?,
        })
    }
}

impl Case for TexCase {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        if self.name == "vktest" {
            "smoke test: yellow texture sampled onto a triangle over transparent black"
        } else {
            "R5G5B5A1 texture sampled with NEAREST through a combined image sampler"
        }
    }

    fn render(&self, ctx: &Context) -> Result<Vec<Output>> {
        let frames = self.render_frames(ctx)?;
        Ok(vec![
            Output {
                file: "tex.ppm",
                frame: frames.texture,
            },
            Output {
                file: "rt.ppm",
                frame: frames.target,
            },
        ])
    }
}
