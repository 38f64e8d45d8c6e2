use ash::vk;
use tracing::debug;

use crate::context::Context;
use crate::error::{HarnessError, Result};
use crate::image::Image;
use crate::pipeline::{Pipeline, SetLayoutDesc};

/// One descriptor set for one of a pipeline's set layouts, with its own pool.
///
/// Borrows the pipeline (whose layout it was allocated from) and every image
/// written into it.
pub struct DescriptorSet<'a> {
    ctx: &'a Context,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    index: usize,
    layout: vk::DescriptorSetLayout,
    desc: SetLayoutDesc,
    images: Vec<(u32, &'a Image<'a>)>,
}

impl<'a> DescriptorSet<'a> {
    pub fn new(ctx: &'a Context, pipeline: &'a Pipeline<'a>, set_index: usize) -> Result<Self> {
        let (layout, desc) = pipeline.set_layout(set_index).ok_or_else(|| {
            HarnessError::config(format!(
                "pipeline has {} set layouts, no set {}",
                pipeline.set_count(),
                set_index
            ))
        })?;
        let device = ctx.device();

        // ── Descriptor Pool ─────────────────────────────────
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: desc.descriptor_type,
            descriptor_count: desc.count,
        }];
        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_ci, None) }?;

        // ── Descriptor Set ──────────────────────────────────
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets.first().copied(),
            Err(e) => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                return Err(e.into());
            }
        };
        let Some(set) = set else {
            unsafe { device.destroy_descriptor_pool(pool, None) };
            return Err(HarnessError::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        };
        debug!("allocated descriptor set {:?} (set {}, {:?})", set, set_index, desc.descriptor_type);

        Ok(Self {
            ctx,
            pool,
            set,
            index: set_index,
            layout,
            desc,
            images: Vec::new(),
        })
    }

    /// Point `binding` at the image's sample view (and sampler, for combined
    /// image samplers). Shaders see it in SHADER_READ_ONLY_OPTIMAL layout.
    pub fn write_image(&mut self, binding: u32, image: &'a Image<'a>) -> Result<()> {
        if binding != 0 {
            return Err(HarnessError::config(format!(
                "set {} only has binding 0, got {}",
                self.index, binding
            )));
        }
        let sample_view = image
            .sample_view()
            .ok_or_else(|| HarnessError::config("image has no sample view"))?;
        let image_info = match self.desc.descriptor_type {
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => vk::DescriptorImageInfo::default()
                .sampler(sample_view.sampler)
                .image_view(sample_view.view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::DescriptorType::SAMPLED_IMAGE => vk::DescriptorImageInfo::default()
                .image_view(sample_view.view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            other => {
                return Err(HarnessError::config(format!(
                    "cannot write an image into a {:?} descriptor",
                    other
                )))
            }
        };
        self.ctx.ensure_idle("update a descriptor set")?;

        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(self.desc.descriptor_type)
            .image_info(&image_infos);
        unsafe { self.ctx.device().update_descriptor_sets(&[write], &[]) };

        self.images.retain(|(b, _)| *b != binding);
        self.images.push((binding, image));
        debug!("wrote image {:?} to set {:?} binding {}", image.handle(), self.set, binding);
        Ok(())
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Images currently written into the set, by binding.
    pub fn images(&self) -> impl Iterator<Item = (u32, &'a Image<'a>)> + '_ {
        self.images.iter().copied()
    }
}

impl Drop for DescriptorSet<'_> {
    fn drop(&mut self) {
        // Destroying the pool frees the set.
        unsafe { self.ctx.device().destroy_descriptor_pool(self.pool, None) };
        debug!("destroyed descriptor set {:?}", self.set);
    }
}
