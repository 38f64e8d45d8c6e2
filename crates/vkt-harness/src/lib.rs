//! Offscreen Vulkan harness for single-shot rendering tests.
//!
//! A [`Context`] owns the device, queue, the one command buffer and its fence.
//! Everything else ([`Buffer`], [`Image`], [`Framebuffer`], [`Pipeline`],
//! [`DescriptorSet`]) borrows the context and is destroyed on drop, so Rust's
//! drop order gives the reverse-creation teardown Vulkan requires.

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod frame;
pub mod framebuffer;
pub mod image;
pub mod layout;
pub mod memory;
pub mod pipeline;
pub mod ppm;
pub mod shader;

pub use ash::vk;

pub use barrier::{ImageBarrier, Transition};
pub use buffer::Buffer;
pub use command::CommandRecorder;
pub use context::Context;
pub use descriptor::DescriptorSet;
pub use error::{HarnessError, Result};
pub use frame::Frame;
pub use framebuffer::{AttachmentOps, Framebuffer};
pub use image::{Image, ImageDesc};
pub use layout::LayoutTracker;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use vkt_core::HarnessConfig;
