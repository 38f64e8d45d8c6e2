//! Recording into the context's single command buffer.

use ash::vk;
use tracing::{debug, trace};

use crate::barrier::{combined_stages, subresource_range, ImageBarrier};
use crate::buffer::Buffer;
use crate::context::Context;
use crate::descriptor::DescriptorSet;
use crate::error::{HarnessError, Result};
use crate::format;
use crate::framebuffer::Framebuffer;
use crate::image::Image;
use crate::pipeline::Pipeline;

/// Attachments of the render pass being recorded.
#[derive(Debug, Clone, Copy)]
struct ActivePass {
    color: vk::Image,
    resolve: Option<vk::Image>,
    depth: Option<vk::Image>,
}

/// Open recording on the context's command buffer.
///
/// Obtained from [`Context::begin_command`]. [`CommandRecorder::end`] submits
/// it; dropping it unsubmitted discards the recording. Misuse (draws outside a
/// render pass, oversized push constants, and the like) is reported before
/// the corresponding command is recorded.
pub struct CommandRecorder<'a> {
    ctx: &'a Context,
    command_buffer: vk::CommandBuffer,
    strict: bool,
    pass: Option<ActivePass>,
    bound_pipeline: Option<vk::Pipeline>,
    submitted: bool,
}

impl<'a> CommandRecorder<'a> {
    pub(crate) fn new(ctx: &'a Context, command_buffer: vk::CommandBuffer, strict: bool) -> Self {
        Self {
            ctx,
            command_buffer,
            strict,
            pass: None,
            bound_pipeline: None,
            submitted: false,
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn in_render_pass(&self) -> bool {
        self.pass.is_some()
    }

    fn outside_pass(&self, what: &str) -> Result<()> {
        if self.pass.is_some() {
            return Err(HarnessError::config(format!("{} inside a render pass", what)));
        }
        Ok(())
    }

    fn inside_pass(&self, what: &str) -> Result<()> {
        if self.pass.is_none() {
            return Err(HarnessError::config(format!("{} outside a render pass", what)));
        }
        Ok(())
    }

    // ── Barriers ────────────────────────────────────────────

    /// Record image barriers between `src_stage` and `dst_stage`.
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier<'_>],
    ) -> Result<()> {
        self.outside_pass("pipeline barrier")?;
        if barriers.is_empty() {
            return Err(HarnessError::config("pipeline barrier without image barriers"));
        }
        let batch: Vec<_> = barriers.iter().map(|b| (b.image.handle(), b.transition)).collect();
        self.ctx.layouts().apply_batch(&batch, self.strict)?;

        let vk_barriers: Vec<vk::ImageMemoryBarrier> = barriers.iter().map(|b| b.to_vk()).collect();
        unsafe {
            self.ctx.device().cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &vk_barriers,
            );
        }
        trace!("recorded {} image barriers {:?} -> {:?}", barriers.len(), src_stage, dst_stage);
        Ok(())
    }

    /// [`pipeline_barrier`](Self::pipeline_barrier) with the stage scopes
    /// taken from the barriers' transitions.
    pub fn transition(&mut self, barriers: &[ImageBarrier<'_>]) -> Result<()> {
        let (src, dst) = combined_stages(barriers.iter().map(|b| b.transition));
        self.pipeline_barrier(src, dst, barriers)
    }

    // ── Transfer ────────────────────────────────────────────

    /// Fill a color image with `color`. The image must be in
    /// TRANSFER_DST_OPTIMAL or GENERAL layout.
    pub fn clear_color_image(&mut self, image: &Image<'_>, color: [f32; 4]) -> Result<()> {
        self.outside_pass("clear_color_image")?;
        if !image.usage().contains(vk::ImageUsageFlags::TRANSFER_DST) {
            return Err(HarnessError::config("clear_color_image needs TRANSFER_DST usage"));
        }
        if format::aspect_mask(image.format()) != vk::ImageAspectFlags::COLOR {
            return Err(HarnessError::config(format!(
                "clear_color_image on non-color format {:?}",
                image.format()
            )));
        }
        let layout = {
            let layouts = self.ctx.layouts();
            if self.strict {
                layouts.expect(
                    image.handle(),
                    &[vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL],
                )?;
            }
            match layouts.state(image.handle()).layout {
                vk::ImageLayout::GENERAL => vk::ImageLayout::GENERAL,
                _ => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            }
        };

        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            self.ctx.device().cmd_clear_color_image(
                self.command_buffer,
                image.handle(),
                layout,
                &clear,
                &[subresource_range(vk::ImageAspectFlags::COLOR)],
            );
        }
        trace!("recorded clear of {:?} to {:?}", image.handle(), color);
        Ok(())
    }

    // ── Render Pass ─────────────────────────────────────────

    /// Begin the framebuffer's render pass, clearing color to `clear` and
    /// depth (if present) to 1.0.
    pub fn begin_render_pass(&mut self, framebuffer: &Framebuffer<'_>, clear: [f32; 4]) -> Result<()> {
        self.outside_pass("begin_render_pass")?;
        let pass = ActivePass {
            color: framebuffer.color().handle(),
            resolve: framebuffer.resolve().map(|i| i.handle()),
            depth: framebuffer.depth().map(|i| i.handle()),
        };
        if self.strict {
            let layouts = self.ctx.layouts();
            let color_layout = [vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL];
            layouts.expect(pass.color, &color_layout)?;
            if let Some(resolve) = pass.resolve {
                layouts.expect(resolve, &color_layout)?;
            }
            if let Some(depth) = pass.depth {
                layouts.expect(depth, &[vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL])?;
            }
        }

        let color_clear = vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        };
        let mut clear_values = vec![color_clear];
        if pass.resolve.is_some() {
            clear_values.push(color_clear);
        }
        if pass.depth.is_some() {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(framebuffer.render_pass())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: framebuffer.extent(),
            })
            .clear_values(&clear_values);
        unsafe {
            self.ctx.device().cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        self.pass = Some(pass);
        trace!("began render pass {:?}", framebuffer.render_pass());
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        let pass = self
            .pass
            .take()
            .ok_or_else(|| HarnessError::config("end_render_pass without begin_render_pass"))?;
        unsafe { self.ctx.device().cmd_end_render_pass(self.command_buffer) };

        let mut layouts = self.ctx.layouts();
        let color_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let color_write = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        layouts.set(pass.color, color_layout, color_write);
        if let Some(resolve) = pass.resolve {
            layouts.set(resolve, color_layout, color_write);
        }
        if let Some(depth) = pass.depth {
            layouts.set(
                depth,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );
        }
        trace!("ended render pass");
        Ok(())
    }

    // ── Binding ─────────────────────────────────────────────

    pub fn bind_pipeline(&mut self, pipeline: &Pipeline<'_>) -> Result<()> {
        unsafe {
            self.ctx.device().cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
        self.bound_pipeline = Some(pipeline.handle());
        Ok(())
    }

    /// Bind `buffer` as vertex binding 0 at offset 0.
    pub fn bind_vertex_buffer(&mut self, buffer: &Buffer<'_>) -> Result<()> {
        if !buffer.usage().contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
            return Err(HarnessError::config("buffer lacks VERTEX_BUFFER usage"));
        }
        unsafe {
            self.ctx
                .device()
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer.handle()], &[0]);
        }
        Ok(())
    }

    /// Bind `set` at its own set index of `pipeline`'s layout.
    pub fn bind_descriptor_set(&mut self, pipeline: &Pipeline<'_>, set: &DescriptorSet<'_>) -> Result<()> {
        match pipeline.set_layout(set.index()) {
            Some((layout, _)) if layout == set.layout() => {}
            _ => {
                return Err(HarnessError::config(format!(
                    "descriptor set {} was not allocated for this pipeline",
                    set.index()
                )))
            }
        }
        if self.strict {
            let layouts = self.ctx.layouts();
            for (_, image) in set.images() {
                layouts.expect(image.handle(), &[vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL])?;
            }
        }
        unsafe {
            self.ctx.device().cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                set.index() as u32,
                &[set.handle()],
                &[],
            );
        }
        Ok(())
    }

    /// Update the pipeline's push-constant range from offset 0.
    pub fn push_constants(&mut self, pipeline: &Pipeline<'_>, data: &[u8]) -> Result<()> {
        let range = pipeline
            .push_constant_range()
            .ok_or_else(|| HarnessError::config("pipeline declares no push constant range"))?;
        if data.is_empty() || data.len() % 4 != 0 || data.len() as u32 > range.size {
            return Err(HarnessError::config(format!(
                "push constant data of {} bytes does not fit the {}-byte range",
                data.len(),
                range.size
            )));
        }
        unsafe {
            self.ctx.device().cmd_push_constants(
                self.command_buffer,
                pipeline.layout(),
                range.stage_flags,
                0,
                data,
            );
        }
        Ok(())
    }

    /// [`push_constants`](Self::push_constants) for a plain-old-data value.
    pub fn push_constants_pod<T: bytemuck::Pod>(&mut self, pipeline: &Pipeline<'_>, value: &T) -> Result<()> {
        self.push_constants(pipeline, bytemuck::bytes_of(value))
    }

    // ── Draw ────────────────────────────────────────────────

    /// One instance of `vertex_count` vertices starting at vertex 0.
    pub fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.inside_pass("draw")?;
        if self.bound_pipeline.is_none() {
            return Err(HarnessError::config("draw without a bound pipeline"));
        }
        unsafe {
            self.ctx
                .device()
                .cmd_draw(self.command_buffer, vertex_count, 1, 0, 0);
        }
        trace!("recorded draw of {} vertices", vertex_count);
        Ok(())
    }

    pub fn draw_triangle(&mut self) -> Result<()> {
        self.draw(3)
    }

    // ── Submission ──────────────────────────────────────────

    /// Finish recording and submit. Follow with [`Context::wait`].
    pub fn end(mut self) -> Result<()> {
        self.outside_pass("end")?;
        self.submitted = true;
        self.ctx.submit()?;
        debug!("command buffer {:?} submitted", self.command_buffer);
        Ok(())
    }

    /// Submit and block until the device is idle.
    pub fn submit_and_wait(self) -> Result<()> {
        let ctx = self.ctx;
        self.end()?;
        ctx.wait()
    }
}

impl Drop for CommandRecorder<'_> {
    fn drop(&mut self) {
        if !self.submitted {
            self.ctx.abandon_recording();
        }
    }
}
