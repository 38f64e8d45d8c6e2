//! Graphics pipeline construction.
//!
//! `PipelineBuilder<Unbound>` collects configuration in any order.
//! [`PipelineBuilder::setup`] binds it to a framebuffer's render pass and
//! yields a `PipelineBuilder<Bound>`, the only state with `compile`.
//! `compile` consumes the builder, so a pipeline cannot be compiled twice or
//! changed afterwards.

use std::ffi::CStr;
use std::marker::PhantomData;

use ash::vk;
use tracing::debug;

use crate::context::Context;
use crate::error::{HarnessError, Result};
use crate::framebuffer::Framebuffer;
use crate::shader::SPIRV_MAGIC;

const ENTRY_POINT: &CStr = c"main";

/// Marker: no render target yet.
#[derive(Debug, Default)]
pub struct Unbound;

/// Marker: bound to a framebuffer's render pass, ready to compile.
#[derive(Debug)]
pub struct Bound<'f> {
    render_pass: vk::RenderPass,
    target: Target,
    _framebuffer: PhantomData<&'f ()>,
}

/// What a pipeline renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub has_depth: bool,
}

#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub code: Vec<u32>,
}

/// One descriptor-set layout with a single binding at slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLayoutDesc {
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// Everything the builder has been told so far.
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub stages: Vec<ShaderStage>,
    pub vertex_components: Vec<u32>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub push_constant: Option<vk::PushConstantRange>,
    pub set_layouts: Vec<SetLayoutDesc>,
    pub viewport: Option<vk::Extent2D>,
    pub samples: Option<vk::SampleCountFlags>,
}

impl Default for PipelineDesc {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            vertex_components: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            polygon_mode: vk::PolygonMode::FILL,
            push_constant: None,
            set_layouts: Vec::new(),
            viewport: None,
            samples: None,
        }
    }
}

/// A description that passed [`PipelineDesc::check`] against a target.
#[derive(Debug, Clone)]
pub struct CheckedDesc {
    pub viewport: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub binding: Option<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl PipelineDesc {
    /// Validate against the render target and the device's push-constant limit.
    pub fn check(&self, target: &Target, max_push_constants_size: u32) -> Result<CheckedDesc> {
        self.check_stages()?;

        if let Some(range) = self.push_constant {
            if range.size == 0 || range.size % 4 != 0 {
                return Err(HarnessError::config(format!(
                    "push constant size must be a non-zero multiple of 4, got {}",
                    range.size
                )));
            }
            if range.size > max_push_constants_size {
                return Err(HarnessError::config(format!(
                    "push constant size {} exceeds device limit {}",
                    range.size, max_push_constants_size
                )));
            }
            if range.stage_flags.is_empty() {
                return Err(HarnessError::config("push constant range has no stages"));
            }
        }

        for (index, set) in self.set_layouts.iter().enumerate() {
            if set.count == 0 || set.stages.is_empty() {
                return Err(HarnessError::config(format!(
                    "descriptor set {} needs a non-zero count and at least one stage",
                    index
                )));
            }
        }

        let samples = match self.samples {
            Some(samples) if samples != target.samples => {
                return Err(HarnessError::config(format!(
                    "pipeline sample count {:?} does not match framebuffer sample count {:?}",
                    samples, target.samples
                )))
            }
            _ => target.samples,
        };

        let viewport = self.viewport.unwrap_or(target.extent);
        if viewport.width == 0 || viewport.height == 0 {
            return Err(HarnessError::config("viewport must be non-zero"));
        }

        let (binding, attributes) = vertex_layout(&self.vertex_components)?;
        Ok(CheckedDesc {
            viewport,
            samples,
            binding,
            attributes,
        })
    }

    fn check_stages(&self) -> Result<()> {
        let mut seen = vk::ShaderStageFlags::empty();
        for stage in &self.stages {
            if stage.stage.as_raw().count_ones() != 1 {
                return Err(HarnessError::config(format!(
                    "shader stage must be a single stage, got {:?}",
                    stage.stage
                )));
            }
            if seen.contains(stage.stage) {
                return Err(HarnessError::config(format!("duplicate {:?} shader", stage.stage)));
            }
            if stage.code.first() != Some(&SPIRV_MAGIC) {
                return Err(HarnessError::config(format!("{:?} shader is not SPIR-V", stage.stage)));
            }
            seen |= stage.stage;
        }
        for required in [vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT] {
            if !seen.contains(required) {
                return Err(HarnessError::config(format!("missing {:?} shader", required)));
            }
        }
        Ok(())
    }
}

/// Interleaved f32 attributes in one binding, one location per entry.
pub fn vertex_layout(
    components: &[u32],
) -> Result<(Option<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>)> {
    if components.is_empty() {
        return Ok((None, Vec::new()));
    }
    let mut attributes = Vec::with_capacity(components.len());
    let mut offset = 0u32;
    for (location, &count) in components.iter().enumerate() {
        let format = match count {
            1 => vk::Format::R32_SFLOAT,
            2 => vk::Format::R32G32_SFLOAT,
            3 => vk::Format::R32G32B32_SFLOAT,
            4 => vk::Format::R32G32B32A32_SFLOAT,
            n => {
                return Err(HarnessError::config(format!(
                    "vertex attribute {} has {} components, expected 1 to 4",
                    location, n
                )))
            }
        };
        attributes.push(vk::VertexInputAttributeDescription {
            location: location as u32,
            binding: 0,
            format,
            offset,
        });
        offset += count * std::mem::size_of::<f32>() as u32;
    }
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: offset,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    Ok((Some(binding), attributes))
}

pub struct PipelineBuilder<S> {
    desc: PipelineDesc,
    state: S,
}

impl PipelineBuilder<Unbound> {
    pub fn new() -> Self {
        Self {
            desc: PipelineDesc::default(),
            state: Unbound,
        }
    }

    /// Bind to the render pass, extent and sample count of `framebuffer`.
    pub fn setup<'f>(self, framebuffer: &'f Framebuffer<'_>) -> PipelineBuilder<Bound<'f>> {
        PipelineBuilder {
            desc: self.desc,
            state: Bound {
                render_pass: framebuffer.render_pass(),
                target: Target {
                    extent: framebuffer.extent(),
                    samples: framebuffer.samples(),
                    has_depth: framebuffer.depth().is_some(),
                },
                _framebuffer: PhantomData,
            },
        }
    }
}

impl Default for PipelineBuilder<Unbound> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PipelineBuilder<S> {
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    pub fn shader(mut self, stage: vk::ShaderStageFlags, spirv: impl Into<Vec<u32>>) -> Self {
        self.desc.stages.push(ShaderStage {
            stage,
            code: spirv.into(),
        });
        self
    }

    pub fn vertex_components(mut self, components: &[u32]) -> Self {
        self.desc.vertex_components = components.to_vec();
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.desc.topology = topology;
        self
    }

    pub fn rasterization(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.desc.polygon_mode = polygon_mode;
        self
    }

    pub fn push_constant(mut self, stages: vk::ShaderStageFlags, size: u32) -> Self {
        self.desc.push_constant = Some(vk::PushConstantRange {
            stage_flags: stages,
            offset: 0,
            size,
        });
        self
    }

    /// Append a set layout; its index is the number of layouts added before it.
    pub fn add_set_layout(mut self, descriptor_type: vk::DescriptorType, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.desc.set_layouts.push(SetLayoutDesc {
            descriptor_type,
            count,
            stages,
        });
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.desc.viewport = Some(vk::Extent2D { width, height });
        self
    }

    pub fn sample_count(mut self, samples: vk::SampleCountFlags) -> Self {
        self.desc.samples = Some(samples);
        self
    }
}

impl<'f> PipelineBuilder<Bound<'f>> {
    pub fn target(&self) -> &Target {
        &self.state.target
    }

    pub fn compile<'ctx>(self, ctx: &'ctx Context) -> Result<Pipeline<'ctx>> {
        let checked = self
            .desc
            .check(&self.state.target, ctx.limits().max_push_constants_size)?;
        let device = ctx.device();

        // ── Shader Modules ──────────────────────────────────
        let mut modules = Vec::with_capacity(self.desc.stages.len());
        for stage in &self.desc.stages {
            let module_ci = vk::ShaderModuleCreateInfo::default().code(&stage.code);
            match unsafe { device.create_shader_module(&module_ci, None) } {
                Ok(module) => modules.push(module),
                Err(e) => {
                    destroy_modules(ctx, &modules);
                    return Err(e.into());
                }
            }
        }
        debug!("created {} shader modules", modules.len());

        let pipeline = build(ctx, &self.desc, &checked, &self.state, &modules);
        destroy_modules(ctx, &modules);
        pipeline
    }
}

fn destroy_modules(ctx: &Context, modules: &[vk::ShaderModule]) {
    for &module in modules {
        unsafe { ctx.device().destroy_shader_module(module, None) };
    }
}

fn build<'ctx>(
    ctx: &'ctx Context,
    desc: &PipelineDesc,
    checked: &CheckedDesc,
    bound: &Bound<'_>,
    modules: &[vk::ShaderModule],
) -> Result<Pipeline<'ctx>> {
    let device = ctx.device();
    // Null handles are valid to destroy, so a partly built pipeline cleans up on drop.
    let mut pipeline = Pipeline {
        ctx,
        handle: vk::Pipeline::null(),
        layout: vk::PipelineLayout::null(),
        set_layouts: Vec::with_capacity(desc.set_layouts.len()),
        set_descs: desc.set_layouts.clone(),
        push_constant: desc.push_constant,
        samples: checked.samples,
    };

    // ── Descriptor Set Layouts ──────────────────────────────
    for set in &desc.set_layouts {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(set.descriptor_type)
            .descriptor_count(set.count)
            .stage_flags(set.stages)];
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_ci, None) }?;
        pipeline.set_layouts.push(layout);
    }

    // ── Pipeline Layout ─────────────────────────────────────
    let push_ranges: Vec<vk::PushConstantRange> = desc.push_constant.into_iter().collect();
    let layout_ci = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&pipeline.set_layouts)
        .push_constant_ranges(&push_ranges);
    pipeline.layout = unsafe { device.create_pipeline_layout(&layout_ci, None) }?;

    // ── Graphics Pipeline ───────────────────────────────────
    let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
        .stages
        .iter()
        .zip(modules)
        .map(|(stage, &module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.stage)
                .module(module)
                .name(ENTRY_POINT)
        })
        .collect();

    let bindings: Vec<vk::VertexInputBindingDescription> = checked.binding.into_iter().collect();
    let vi_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&checked.attributes);
    let ia_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.topology)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: checked.viewport.width as f32,
        height: checked.viewport.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: checked.viewport,
    }];
    let vp_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rs_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(desc.polygon_mode)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let ms_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(checked.samples);
    let ds_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(bound.target.has_depth)
        .depth_write_enable(bound.target.has_depth)
        .depth_compare_op(vk::CompareOp::LESS)
        .max_depth_bounds(1.0);
    let cb_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let cb_state = vk::PipelineColorBlendStateCreateInfo::default().attachments(&cb_attachments);

    let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vi_state)
        .input_assembly_state(&ia_state)
        .viewport_state(&vp_state)
        .rasterization_state(&rs_state)
        .multisample_state(&ms_state)
        .depth_stencil_state(&ds_state)
        .color_blend_state(&cb_state)
        .layout(pipeline.layout)
        .render_pass(bound.render_pass)
        .subpass(0);

    let handles = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_ci], None)
    }
    .map_err(|(_, e)| e)?;
    pipeline.handle = handles
        .first()
        .copied()
        .ok_or(HarnessError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED))?;
    debug!(
        "created graphics pipeline {:?} ({:?}, {:?}, {:?})",
        pipeline.handle, desc.topology, desc.polygon_mode, checked.samples
    );
    Ok(pipeline)
}

/// A compiled graphics pipeline and the layouts it owns.
pub struct Pipeline<'ctx> {
    ctx: &'ctx Context,
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    set_descs: Vec<SetLayoutDesc>,
    push_constant: Option<vk::PushConstantRange>,
    samples: vk::SampleCountFlags,
}

impl Pipeline<'_> {
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn push_constant_range(&self) -> Option<vk::PushConstantRange> {
        self.push_constant
    }

    pub fn set_count(&self) -> usize {
        self.set_layouts.len()
    }

    /// Handle and description of set layout `index`.
    pub fn set_layout(&self, index: usize) -> Option<(vk::DescriptorSetLayout, SetLayoutDesc)> {
        Some((*self.set_layouts.get(index)?, *self.set_descs.get(index)?))
    }
}

impl Drop for Pipeline<'_> {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            device.destroy_pipeline(self.handle, None);
            device.destroy_pipeline_layout(self.layout, None);
            for &layout in &self.set_layouts {
                device.destroy_descriptor_set_layout(layout, None);
            }
        }
        debug!("destroyed pipeline {:?}", self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv() -> Vec<u32> {
        vec![SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
    }

    fn target(samples: vk::SampleCountFlags) -> Target {
        Target {
            extent: vk::Extent2D {
                width: 300,
                height: 300,
            },
            samples,
            has_depth: false,
        }
    }

    fn complete() -> PipelineBuilder<Unbound> {
        PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, spirv())
            .shader(vk::ShaderStageFlags::FRAGMENT, spirv())
    }

    #[test]
    fn defaults_follow_target() {
        let checked = complete()
            .desc()
            .check(&target(vk::SampleCountFlags::TYPE_4), 128)
            .unwrap();
        assert_eq!(checked.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(checked.viewport, vk::Extent2D { width: 300, height: 300 });
        assert!(checked.binding.is_none());
        assert_eq!(complete().desc().topology, vk::PrimitiveTopology::TRIANGLE_STRIP);
        assert_eq!(complete().desc().polygon_mode, vk::PolygonMode::FILL);
    }

    #[test]
    fn configuration_order_does_not_matter() {
        let a = PipelineBuilder::new()
            .vertex_components(&[2, 3])
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .shader(vk::ShaderStageFlags::FRAGMENT, spirv())
            .viewport(300, 300)
            .shader(vk::ShaderStageFlags::VERTEX, spirv());
        let b = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, spirv())
            .viewport(300, 300)
            .shader(vk::ShaderStageFlags::FRAGMENT, spirv())
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .vertex_components(&[2, 3]);
        let t = target(vk::SampleCountFlags::TYPE_1);
        let (ca, cb) = (a.desc().check(&t, 128).unwrap(), b.desc().check(&t, 128).unwrap());
        let summary = |c: &CheckedDesc| {
            let attrs: Vec<_> = c.attributes.iter().map(|a| (a.location, a.format, a.offset)).collect();
            (attrs, c.binding.map(|b| b.stride), c.viewport)
        };
        assert_eq!(summary(&ca), summary(&cb));
        assert_eq!(a.desc().topology, b.desc().topology);
    }

    #[test]
    fn missing_fragment_shader() {
        let err = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, spirv())
            .desc()
            .check(&target(vk::SampleCountFlags::TYPE_1), 128)
            .unwrap_err();
        assert!(err.to_string().contains("FRAGMENT"), "{err}");
    }

    #[test]
    fn duplicate_stage() {
        let err = complete()
            .shader(vk::ShaderStageFlags::VERTEX, spirv())
            .desc()
            .check(&target(vk::SampleCountFlags::TYPE_1), 128)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn non_spirv_blob() {
        let err = PipelineBuilder::new()
            .shader(vk::ShaderStageFlags::VERTEX, vec![1, 2, 3])
            .shader(vk::ShaderStageFlags::FRAGMENT, spirv())
            .desc()
            .check(&target(vk::SampleCountFlags::TYPE_1), 128)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn sample_count_must_match_framebuffer() {
        let builder = complete().sample_count(vk::SampleCountFlags::TYPE_4);
        assert!(builder.desc().check(&target(vk::SampleCountFlags::TYPE_1), 128).is_err());
        assert!(builder.desc().check(&target(vk::SampleCountFlags::TYPE_4), 128).is_ok());
    }

    #[test]
    fn push_constant_limits() {
        let t = target(vk::SampleCountFlags::TYPE_1);
        let ok = complete().push_constant(vk::ShaderStageFlags::FRAGMENT, 16);
        assert!(ok.desc().check(&t, 128).is_ok());

        let unaligned = complete().push_constant(vk::ShaderStageFlags::FRAGMENT, 6);
        assert!(unaligned.desc().check(&t, 128).is_err());

        let too_big = complete().push_constant(vk::ShaderStageFlags::FRAGMENT, 256);
        assert!(too_big.desc().check(&t, 128).is_err());

        let no_stage = complete().push_constant(vk::ShaderStageFlags::empty(), 16);
        assert!(no_stage.desc().check(&t, 128).is_err());
    }

    #[test]
    fn empty_set_layout_rejected() {
        let builder = complete().add_set_layout(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            0,
            vk::ShaderStageFlags::FRAGMENT,
        );
        assert!(builder.desc().check(&target(vk::SampleCountFlags::TYPE_1), 128).is_err());
    }

    #[test]
    fn interleaved_vertex_layout() {
        let (binding, attributes) = vertex_layout(&[2, 3]).unwrap();
        let binding = binding.unwrap();
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].offset, 8);
    }

    #[test]
    fn vertex_components_out_of_range() {
        assert!(vertex_layout(&[2, 5]).is_err());
        assert!(vertex_layout(&[0]).is_err());
        assert_eq!(vertex_layout(&[]).unwrap().1.len(), 0);
    }
}
