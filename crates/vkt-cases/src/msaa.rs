//! RGB triangle drawn into a tiled multisampled target and resolved by the
//! render pass into a linear image, which is dumped as `rt.ppm`.

use tracing::debug;
use vkt_harness::vk;
use vkt_harness::{
    AttachmentOps, Buffer, Context, Frame, Framebuffer, Image, ImageBarrier, ImageDesc,
    PipelineBuilder, Result, Transition,
};

use crate::common::{linear_target, BACKGROUND, COLOR_FORMAT, HEIGHT, WIDTH};
use crate::{shaders, Case, Output};

#[rustfmt::skip]
const VERTICES: [f32; 15] = [
    // x     y    r    g    b
    -1.0, -1.0, 1.0, 0.0, 0.0,
     0.0,  1.0, 0.0, 1.0, 0.0,
     1.0, -1.0, 0.0, 0.0, 1.0,
];

#[derive(Debug, Clone)]
pub struct MsaaCase {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub samples: vk::SampleCountFlags,
    pub background: [f32; 4],
}

impl Default for MsaaCase {
    fn default() -> Self {
        Self {
            format: COLOR_FORMAT,
            width: WIDTH,
            height: HEIGHT,
            samples: vk::SampleCountFlags::TYPE_4,
            background: BACKGROUND,
        }
    }
}

impl MsaaCase {
    /// The same scene rendered straight into the linear image, no resolve.
    pub fn single_sample() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            ..Self::default()
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }

    /// Render and return the linear (resolved) image.
    pub fn render_resolved(&self, ctx: &Context) -> Result<Frame> {
        let vb = Buffer::with_data(ctx, vk::BufferUsageFlags::VERTEX_BUFFER, &VERTICES)?;

        // ── Render Targets ──────────────────────────────────
        let resolved = linear_target(ctx, self.format, self.width, self.height)?;
        let rt = if self.is_multisampled() {
            let desc = ImageDesc::new(self.format, self.width, self.height)
                .samples(self.samples)
                .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);
            let mut image = Image::new(ctx, &desc)?;
            image.create_render_view(vk::ImageAspectFlags::COLOR)?;
            Some(image)
        } else {
            None
        };
        let fb = match &rt {
            Some(rt) => Framebuffer::new(ctx, rt, Some(&resolved), None, AttachmentOps::default())?,
            None => Framebuffer::new(ctx, &resolved, None, None, AttachmentOps::default())?,
        };
        debug!("msaa framebuffer: {} attachments, {:?}", fb.attachment_count(), fb.samples());

        // ── Pipeline ────────────────────────────────────────
        let (vs, fs) = shaders::TRIANGLE.compile()?;
        let pipeline = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, vs)
            .shader(vk::ShaderStageFlags::FRAGMENT, fs)
            .vertex_components(&[2, 3])
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
            .viewport(fb.extent().width, fb.extent().height)
            .rasterization(vk::PolygonMode::FILL)
            .sample_count(fb.samples())
            .setup(&fb)
            .compile(ctx)?;

        // ── Record & Submit ─────────────────────────────────
        let mut targets = vec![ImageBarrier::new(&resolved, Transition::ATTACHMENT_WRITE)];
        if let Some(rt) = &rt {
            targets.push(ImageBarrier::new(rt, Transition::ATTACHMENT_WRITE));
        }

        let mut cmd = ctx.begin_command()?;
        cmd.transition(&targets)?;
        cmd.begin_render_pass(&fb, self.background)?;
        cmd.bind_vertex_buffer(&vb)?;
        cmd.bind_pipeline(&pipeline)?;
        cmd.draw_triangle()?;
        cmd.end_render_pass()?;
        cmd.transition(&[ImageBarrier::new(&resolved, Transition::ATTACHMENT_HOST_READ)])?;
        cmd.submit_and_wait()?;

        resolved.read_pixels()
    }
}

impl Case for MsaaCase {
    fn name(&self) -> &'static str {
        "msaa"
    }

    fn description(&self) -> &'static str {
        "RGB triangle into a 4x multisampled target, resolved to a linear image"
    }

    fn render(&self, ctx: &Context) -> Result<Vec<Output>> {
        let frame = self.render_resolved(ctx)?;
        Ok(vec![Output { file: "rt.ppm", frame }])
    }
}
