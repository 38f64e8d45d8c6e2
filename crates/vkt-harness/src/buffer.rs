use std::ptr::NonNull;

use ash::vk;
use tracing::debug;

use crate::context::Context;
use crate::error::{HarnessError, Result};
use crate::memory::{Allocation, HOST_ACCESS};

/// Host-visible, persistently mapped buffer. Used for vertex data.
pub struct Buffer<'ctx> {
    ctx: &'ctx Context,
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    allocation: Allocation,
    ptr: NonNull<u8>,
}

impl<'ctx> Buffer<'ctx> {
    pub fn new(ctx: &'ctx Context, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<Self> {
        if size == 0 {
            return Err(HarnessError::config("buffer size must be non-zero"));
        }
        let device = ctx.device();
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let handle = unsafe { device.create_buffer(&buffer_ci, None) }?;

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let allocation = match ctx.allocate(requirements, HOST_ACCESS) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        let mapped = unsafe { device.bind_buffer_memory(handle, allocation.memory, 0) }
            .map_err(HarnessError::from)
            .and_then(|()| ctx.map(&allocation));
        let ptr = match mapped {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                ctx.free(&allocation, false);
                return Err(e);
            }
        };

        debug!("created buffer ({} bytes, {:?}): {:?}", size, usage, handle);
        Ok(Self {
            ctx,
            handle,
            size,
            usage,
            allocation,
            ptr,
        })
    }

    /// Create a buffer sized for `data` and fill it.
    pub fn with_data<T: bytemuck::Pod>(
        ctx: &'ctx Context,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(ctx, bytes.len() as vk::DeviceSize, usage)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Copy `data` to the start of the buffer.
    ///
    /// Only allowed while nothing is in flight, so the GPU never reads a
    /// half-written buffer.
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(HarnessError::config(format!(
                "write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }
        self.ctx.ensure_idle("write a buffer")?;
        // SAFETY: the mapping spans at least `size` bytes and `&mut self`
        // guarantees no other host access; the device is idle.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), bytes.len());
        }
        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_buffer(self.handle, None) };
        self.ctx.free(&self.allocation, true);
        debug!("destroyed buffer {:?}", self.handle);
    }
}
