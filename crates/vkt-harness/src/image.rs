//! 2D images with their memory, optional views and optional host mapping.

use std::path::Path;
use std::ptr::NonNull;

use ash::vk;
use tracing::debug;

use crate::context::Context;
use crate::error::{HarnessError, Result};
use crate::format;
use crate::frame::Frame;
use crate::memory::{Allocation, HOST_ACCESS};

/// What to create. Built with [`ImageDesc::new`] and the chained setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl ImageDesc {
    /// Single-sampled, optimally tiled, no usage yet.
    pub fn new(format: vk::Format, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
        }
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Checks that need no device.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HarnessError::config(format!(
                "image extent must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.usage.is_empty() {
            return Err(HarnessError::config("image usage must not be empty"));
        }
        if self.samples.as_raw().count_ones() != 1 {
            return Err(HarnessError::config(format!(
                "sample count must be a single power of two, got {:?}",
                self.samples
            )));
        }
        if self.samples != vk::SampleCountFlags::TYPE_1 && self.tiling != vk::ImageTiling::OPTIMAL {
            return Err(self.unsupported("multisampled images must use optimal tiling"));
        }
        Ok(())
    }

    fn unsupported(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::UnsupportedFormat {
            format: self.format,
            tiling: self.tiling,
            usage: self.usage,
            samples: self.samples,
            reason: reason.into(),
        }
    }
}

/// View + sampler used for shader reads. They only ever exist together.
#[derive(Debug, Clone, Copy)]
pub struct SampleView {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Host mapping of a linear image plus where its texels start.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    ptr: NonNull<u8>,
    offset: vk::DeviceSize,
    row_pitch: vk::DeviceSize,
}

pub struct Image<'ctx> {
    ctx: &'ctx Context,
    desc: ImageDesc,
    handle: vk::Image,
    allocation: Allocation,
    render_view: Option<vk::ImageView>,
    sample_view: Option<SampleView>,
    mapping: Option<Mapping>,
}

impl<'ctx> Image<'ctx> {
    pub fn new(ctx: &'ctx Context, desc: &ImageDesc) -> Result<Self> {
        desc.validate()?;
        check_support(ctx, desc)?;

        let device = ctx.device();
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let handle = unsafe { device.create_image(&image_ci, None) }?;

        let linear = desc.tiling == vk::ImageTiling::LINEAR;
        let required = if linear {
            HOST_ACCESS
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let allocation = match ctx.allocate(requirements, required) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(e);
            }
        };

        // From here on Drop releases whatever has been created.
        let mut image = Self {
            ctx,
            desc: *desc,
            handle,
            allocation,
            render_view: None,
            sample_view: None,
            mapping: None,
        };
        unsafe { device.bind_image_memory(handle, allocation.memory, 0) }?;

        if linear {
            let subresource = vk::ImageSubresource {
                aspect_mask: format::aspect_mask(desc.format),
                mip_level: 0,
                array_layer: 0,
            };
            let layout = unsafe { device.get_image_subresource_layout(handle, subresource) };
            let ptr = ctx.map(&allocation)?;
            image.mapping = Some(Mapping {
                ptr,
                offset: layout.offset,
                row_pitch: layout.row_pitch,
            });
        }

        debug!(
            "created image {:?}: {:?} {}x{} {:?} {:?} usage={:?}",
            handle, desc.format, desc.width, desc.height, desc.samples, desc.tiling, desc.usage
        );
        Ok(image)
    }

    // ── Views ───────────────────────────────────────────────

    fn create_view(&self, aspect: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(self.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.desc.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(crate::barrier::subresource_range(aspect));
        let view = unsafe { self.ctx.device().create_image_view(&view_ci, None) }?;
        debug!("created image view {:?} for image {:?}", view, self.handle);
        Ok(view)
    }

    /// View used when the image is a framebuffer attachment.
    pub fn create_render_view(&mut self, aspect: vk::ImageAspectFlags) -> Result<()> {
        if self.render_view.is_some() {
            return Err(HarnessError::config("image already has a render view"));
        }
        self.render_view = Some(self.create_view(aspect)?);
        Ok(())
    }

    /// View plus sampler used when the image is read by a shader. Addressing
    /// clamps to the edge; `filter` applies to minification and magnification.
    pub fn create_sample_view(&mut self, aspect: vk::ImageAspectFlags, filter: vk::Filter) -> Result<()> {
        if self.sample_view.is_some() {
            return Err(HarnessError::config("image already has a sample view"));
        }
        if !self.desc.usage.contains(vk::ImageUsageFlags::SAMPLED) {
            return Err(HarnessError::config("sample view requires SAMPLED usage"));
        }
        let view = self.create_view(aspect)?;

        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
        let sampler = match unsafe { self.ctx.device().create_sampler(&sampler_ci, None) } {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { self.ctx.device().destroy_image_view(view, None) };
                return Err(e.into());
            }
        };
        debug!("created sampler {:?} ({:?}) for image {:?}", sampler, filter, self.handle);
        self.sample_view = Some(SampleView { view, sampler });
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent()
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    pub fn tiling(&self) -> vk::ImageTiling {
        self.desc.tiling
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.desc.usage
    }

    pub fn render_view(&self) -> Option<vk::ImageView> {
        self.render_view
    }

    pub fn sample_view(&self) -> Option<SampleView> {
        self.sample_view
    }

    pub fn is_host_readable(&self) -> bool {
        self.mapping.is_some()
    }

    /// Distance in bytes between rows of the mapped image.
    pub fn row_pitch(&self) -> Option<vk::DeviceSize> {
        self.mapping.map(|m| m.row_pitch)
    }

    // ── Readback ────────────────────────────────────────────

    /// Copy the texels out of a linear image.
    ///
    /// Rejected without touching the device when the image is not linearly
    /// tiled, when work is still in flight, or when the format has no known
    /// texel size. The caller must have transitioned the image for host reads.
    pub fn read_pixels(&self) -> Result<Frame> {
        if self.desc.tiling != vk::ImageTiling::LINEAR {
            return Err(HarnessError::NotHostReadable {
                tiling: self.desc.tiling,
            });
        }
        self.ctx.ensure_idle("read back an image")?;
        let texel_size =
            format::texel_size(self.desc.format).ok_or(HarnessError::UnknownTexelSize(self.desc.format))?;
        let mapping = self.mapping.ok_or(HarnessError::NotHostReadable {
            tiling: self.desc.tiling,
        })?;

        let row_bytes = self.desc.width as usize * texel_size as usize;
        let mut data = Vec::with_capacity(row_bytes * self.desc.height as usize);
        for y in 0..self.desc.height as usize {
            let start = mapping.offset as usize + y * mapping.row_pitch as usize;
            // SAFETY: the mapping covers the whole allocation, which holds
            // `offset + row_pitch * height` bytes for this subresource, and
            // the device is idle so nothing writes to it concurrently.
            let row = unsafe { std::slice::from_raw_parts(mapping.ptr.as_ptr().add(start), row_bytes) };
            data.extend_from_slice(row);
        }
        Frame::new(self.desc.format, self.desc.width, self.desc.height, texel_size, data)
    }

    /// Read back and write a PPM file.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        self.read_pixels()?.write_ppm(path)
    }
}

impl Drop for Image<'_> {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if let Some(SampleView { view, sampler }) = self.sample_view.take() {
                device.destroy_sampler(sampler, None);
                device.destroy_image_view(view, None);
            }
            if let Some(view) = self.render_view.take() {
                device.destroy_image_view(view, None);
            }
            device.destroy_image(self.handle, None);
        }
        self.ctx.free(&self.allocation, self.mapping.is_some());
        self.ctx.layouts().forget(self.handle);
        debug!("destroyed image {:?}", self.handle);
    }
}

fn check_support(ctx: &Context, desc: &ImageDesc) -> Result<()> {
    let props = match ctx.image_format_properties(desc.format, desc.tiling, desc.usage) {
        Ok(props) => props,
        Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED) => {
            return Err(desc.unsupported("format/tiling/usage combination not supported"))
        }
        Err(e) => return Err(e.into()),
    };
    if !props.sample_counts.contains(desc.samples) {
        return Err(desc.unsupported(format!("supported sample counts are {:?}", props.sample_counts)));
    }
    if desc.width > props.max_extent.width || desc.height > props.max_extent.height {
        return Err(desc.unsupported(format!(
            "maximum extent is {}x{}",
            props.max_extent.width, props.max_extent.height
        )));
    }
    Ok(())
}
