//! Triangle whose color comes from a fragment-stage push constant. The
//! vertices are generated from the vertex index, so no vertex buffer is bound.

use vkt_harness::vk;
use vkt_harness::{AttachmentOps, Context, Frame, Framebuffer, ImageBarrier, PipelineBuilder, Result, Transition};

use crate::common::{linear_target, BACKGROUND, COLOR_FORMAT, HEIGHT, WIDTH};
use crate::{shaders, Case, Output};

#[derive(Debug, Clone)]
pub struct PushConstCase {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    /// Pushed as a `vec4` at offset 0.
    pub color: [f32; 4],
    pub background: [f32; 4],
}

impl Default for PushConstCase {
    fn default() -> Self {
        Self {
            format: COLOR_FORMAT,
            width: WIDTH,
            height: HEIGHT,
            color: [1.0, 1.0, 0.0, 1.0],
            background: BACKGROUND,
        }
    }
}

impl PushConstCase {
    pub fn with_color(color: [f32; 4]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn render_frame(&self, ctx: &Context) -> Result<Frame> {
        let rt = linear_target(ctx, self.format, self.width, self.height)?;
        let fb = Framebuffer::new(ctx, &rt, None, None, AttachmentOps::default())?;

        let (vs, fs) = shaders::PUSH_CONST.compile()?;
        let pipeline = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, vs)
            .shader(vk::ShaderStageFlags::FRAGMENT, fs)
            .push_constant(vk::ShaderStageFlags::FRAGMENT, std::mem::size_of::<[f32; 4]>() as u32)
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
            .rasterization(vk::PolygonMode::FILL)
            .viewport(self.width, self.height)
            .setup(&fb)
            .compile(ctx)?;

        let mut cmd = ctx.begin_command()?;
        cmd.transition(&[ImageBarrier::new(&rt, Transition::ATTACHMENT_WRITE)])?;
        cmd.begin_render_pass(&fb, self.background)?;
        cmd.bind_pipeline(&pipeline)?;
        cmd.push_constants_pod(&pipeline, &self.color)?;
        cmd.draw_triangle()?;
        cmd.end_render_pass()?;
        cmd.transition(&[ImageBarrier::new(&rt, Transition::ATTACHMENT_HOST_READ)])?;
        cmd.submit_and_wait()?;

        rt.read_pixels()
    }
}

impl Case for PushConstCase {
    fn name(&self) -> &'static str {
        "push_const"
    }

    fn description(&self) -> &'static str {
        "triangle colored by a push constant, no vertex buffer"
    }

    fn render(&self, ctx: &Context) -> Result<Vec<Output>> {
        let frame = self.render_frame(ctx)?;
        Ok(vec![Output { file: "rt.ppm", frame }])
    }
}
