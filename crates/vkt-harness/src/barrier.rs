//! Named image layout transitions.
//!
//! The harness does not infer barriers. Callers pick one of the transitions
//! below (or build their own) and record it explicitly, so every test states
//! exactly which layout/access hand-off it relies on.

use ash::vk;

use crate::format;
use crate::image::Image;

/// One layout change plus the access and stage scopes on either side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl Transition {
    /// Fresh image about to be rendered into; previous contents are discarded.
    pub const ATTACHMENT_WRITE: Transition = Transition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    };

    /// Rendered color attachment handed to the host for mapping.
    pub const ATTACHMENT_HOST_READ: Transition = Transition {
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::GENERAL,
        src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags::HOST_READ,
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags::HOST,
    };

    /// Fresh image about to be filled by a transfer (clear or copy).
    pub const TRANSFER_DST: Transition = Transition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    };

    /// Transfer-written image made visible to fragment shader sampling.
    pub const SHADER_READ: Transition = Transition {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::SHADER_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    };

    /// Sampled texture handed to the host after the draw that read it.
    pub const SAMPLED_HOST_READ: Transition = Transition {
        old_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        new_layout: vk::ImageLayout::GENERAL,
        src_access: vk::AccessFlags::SHADER_READ,
        dst_access: vk::AccessFlags::HOST_READ,
        src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_stage: vk::PipelineStageFlags::HOST,
    };

    /// Transfer-written image handed straight to the host.
    pub const TRANSFER_HOST_READ: Transition = Transition {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::GENERAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::HOST_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::HOST,
    };

    /// Fresh depth attachment.
    pub const DEPTH_ATTACHMENT_WRITE: Transition = Transition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
    };

    /// Same scopes, different source layout.
    pub const fn from_layout(self, old_layout: vk::ImageLayout) -> Transition {
        Transition { old_layout, ..self }
    }

    /// The `VkImageMemoryBarrier` for `image` covering its single mip level and layer.
    pub fn to_vk(&self, image: vk::Image, aspect: vk::ImageAspectFlags) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range(aspect))
    }
}

pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// A transition applied to a particular image.
#[derive(Clone, Copy)]
pub struct ImageBarrier<'i> {
    pub image: &'i Image<'i>,
    pub transition: Transition,
}

impl<'i> ImageBarrier<'i> {
    pub fn new(image: &'i Image<'i>, transition: Transition) -> Self {
        Self { image, transition }
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier<'static> {
        self.transition
            .to_vk(self.image.handle(), format::aspect_mask(self.image.format()))
    }
}

/// Union of the stage scopes of `barriers`, for recording them as one batch.
pub fn combined_stages(transitions: impl IntoIterator<Item = Transition>) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    transitions.into_iter().fold(
        (vk::PipelineStageFlags::empty(), vk::PipelineStageFlags::empty()),
        |(src, dst), t| (src | t.src_stage, dst | t.dst_stage),
    )
}
