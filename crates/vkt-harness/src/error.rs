use ash::vk;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    // ── Configuration ──────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported image: {format:?} {tiling:?} usage={usage:?} samples={samples:?} ({reason})")]
    UnsupportedFormat {
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        samples: vk::SampleCountFlags,
        reason: String,
    },

    #[error("image {image:?} is in {actual:?}, expected {expected:?}")]
    LayoutMismatch {
        image: vk::Image,
        expected: vk::ImageLayout,
        actual: vk::ImageLayout,
    },

    // ── Readback ───────────────────────────────────────────
    #[error("image with {tiling:?} tiling is not host readable")]
    NotHostReadable { tiling: vk::ImageTiling },

    #[error("no known texel size for {0:?}")]
    UnknownTexelSize(vk::Format),

    // ── Device / driver ────────────────────────────────────
    #[error("failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no suitable Vulkan device: {0}")]
    NoDevice(String),

    #[error("no memory type with {required:?} in type bits {type_bits:#x}")]
    NoMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    // ── Other ──────────────────────────────────────────────
    #[error("shader compilation failed: {0}")]
    Shader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors caused by how the harness was driven rather than by
    /// the device, i.e. errors that are raised before any GPU call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnsupportedFormat { .. }
                | Self::LayoutMismatch { .. }
                | Self::NotHostReadable { .. }
                | Self::UnknownTexelSize(_)
        )
    }
}
