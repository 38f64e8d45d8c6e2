//! Render pass + framebuffer over borrowed images.
//!
//! Attachment slots are fixed: 0 is color, then the resolve target if any,
//! then depth if any. Every attachment enters and leaves the pass in its
//! attachment-optimal layout, so callers transition images into that layout
//! before `begin_render_pass` and out of it afterwards.

use ash::vk;
use tracing::debug;

use crate::context::Context;
use crate::error::{HarnessError, Result};
use crate::image::Image;

/// Load/store behaviour of the color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentOps {
    pub load: vk::AttachmentLoadOp,
    pub store: vk::AttachmentStoreOp,
}

impl Default for AttachmentOps {
    /// A fresh frame: clear on load, keep the result.
    fn default() -> Self {
        Self {
            load: vk::AttachmentLoadOp::CLEAR,
            store: vk::AttachmentStoreOp::STORE,
        }
    }
}

/// The facts about an image that decide how it can be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
}

impl AttachmentInfo {
    pub fn of(image: &Image<'_>) -> Self {
        Self {
            format: image.format(),
            extent: image.extent(),
            samples: image.samples(),
        }
    }
}

/// Attachment descriptions and subpass references for one render pass.
#[derive(Debug, Clone)]
pub struct RenderPassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color: vk::AttachmentReference,
    pub resolve: Option<vk::AttachmentReference>,
    pub depth: Option<vk::AttachmentReference>,
}

impl RenderPassLayout {
    /// Validate the attachment combination and describe it.
    pub fn derive(
        color: AttachmentInfo,
        resolve: Option<AttachmentInfo>,
        depth: Option<AttachmentInfo>,
        ops: AttachmentOps,
    ) -> Result<Self> {
        let color_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let mut attachments = vec![vk::AttachmentDescription::default()
            .format(color.format)
            .samples(color.samples)
            .load_op(ops.load)
            .store_op(ops.store)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(color_layout)
            .final_layout(color_layout)];
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: color_layout,
        };

        let resolve_ref = match resolve {
            None => None,
            Some(target) => {
                if color.samples == vk::SampleCountFlags::TYPE_1 {
                    return Err(HarnessError::config(
                        "resolve target given but the color attachment is single-sampled",
                    ));
                }
                if target.samples != vk::SampleCountFlags::TYPE_1 {
                    return Err(HarnessError::config(format!(
                        "resolve target must be single-sampled, got {:?}",
                        target.samples
                    )));
                }
                if target.format != color.format {
                    return Err(HarnessError::config(format!(
                        "resolve format {:?} differs from color format {:?}",
                        target.format, color.format
                    )));
                }
                check_extent("resolve", target.extent, color.extent)?;
                attachments.push(
                    vk::AttachmentDescription::default()
                        .format(target.format)
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .store_op(vk::AttachmentStoreOp::STORE)
                        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(color_layout)
                        .final_layout(color_layout),
                );
                Some(vk::AttachmentReference {
                    attachment: attachments.len() as u32 - 1,
                    layout: color_layout,
                })
            }
        };

        let depth_ref = match depth {
            None => None,
            Some(depth) => {
                check_extent("depth", depth.extent, color.extent)?;
                if depth.samples != color.samples {
                    return Err(HarnessError::config(format!(
                        "depth sample count {:?} differs from color sample count {:?}",
                        depth.samples, color.samples
                    )));
                }
                let depth_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
                attachments.push(
                    vk::AttachmentDescription::default()
                        .format(depth.format)
                        .samples(depth.samples)
                        .load_op(vk::AttachmentLoadOp::CLEAR)
                        .store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(depth_layout)
                        .final_layout(depth_layout),
                );
                Some(vk::AttachmentReference {
                    attachment: attachments.len() as u32 - 1,
                    layout: depth_layout,
                })
            }
        };

        Ok(Self {
            attachments,
            color: color_ref,
            resolve: resolve_ref,
            depth: depth_ref,
        })
    }
}

fn check_extent(what: &str, got: vk::Extent2D, color: vk::Extent2D) -> Result<()> {
    if got != color {
        return Err(HarnessError::config(format!(
            "{} extent {}x{} differs from color extent {}x{}",
            what, got.width, got.height, color.width, color.height
        )));
    }
    Ok(())
}

pub struct Framebuffer<'a> {
    ctx: &'a Context,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    color: &'a Image<'a>,
    resolve: Option<&'a Image<'a>>,
    depth: Option<&'a Image<'a>>,
}

impl<'a> Framebuffer<'a> {
    pub fn new(
        ctx: &'a Context,
        color: &'a Image<'a>,
        resolve: Option<&'a Image<'a>>,
        depth: Option<&'a Image<'a>>,
        ops: AttachmentOps,
    ) -> Result<Self> {
        let mut views = Vec::with_capacity(3);
        for (what, image) in [("color", Some(color)), ("resolve", resolve), ("depth", depth)] {
            if let Some(image) = image {
                let view = image.render_view().ok_or_else(|| {
                    HarnessError::config(format!("{} attachment has no render view", what))
                })?;
                views.push(view);
            }
        }

        let layout = RenderPassLayout::derive(
            AttachmentInfo::of(color),
            resolve.map(AttachmentInfo::of),
            depth.map(AttachmentInfo::of),
            ops,
        )?;

        let device = ctx.device();

        // ── Render Pass ─────────────────────────────────────
        let color_refs = [layout.color];
        let resolve_refs: Vec<vk::AttachmentReference> = layout.resolve.into_iter().collect();
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        if let Some(ref depth_ref) = layout.depth {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];
        let rp_ci = vk::RenderPassCreateInfo::default()
            .attachments(&layout.attachments)
            .subpasses(&subpasses);
        let render_pass = unsafe { device.create_render_pass(&rp_ci, None) }?;
        debug!("created render pass: {:?}", render_pass);

        // ── Framebuffer ─────────────────────────────────────
        let extent = color.extent();
        let fb_ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = match unsafe { device.create_framebuffer(&fb_ci, None) } {
            Ok(fb) => fb,
            Err(e) => {
                unsafe { device.destroy_render_pass(render_pass, None) };
                return Err(e.into());
            }
        };
        debug!("created framebuffer {:?} ({}x{})", framebuffer, extent.width, extent.height);

        Ok(Self {
            ctx,
            render_pass,
            framebuffer,
            extent,
            samples: color.samples(),
            color,
            resolve,
            depth,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn color(&self) -> &'a Image<'a> {
        self.color
    }

    pub fn resolve(&self) -> Option<&'a Image<'a>> {
        self.resolve
    }

    pub fn depth(&self) -> Option<&'a Image<'a>> {
        self.depth
    }

    /// Number of attachments, i.e. the number of clear values a render pass needs.
    pub fn attachment_count(&self) -> usize {
        1 + self.resolve.is_some() as usize + self.depth.is_some() as usize
    }
}

impl Drop for Framebuffer<'_> {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_framebuffer(self.framebuffer, None);
            self.ctx.device().destroy_render_pass(self.render_pass, None);
        }
        debug!("destroyed framebuffer {:?}", self.framebuffer);
    }
}
