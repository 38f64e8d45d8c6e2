//! Pieces shared by every vkt binary.

mod logging;
mod platform;

pub use logging::{init_logging, init_logging_with_default};
pub use platform::platform_name;

/// Name of the environment variable that controls log verbosity.
pub const LOG_ENV: &str = "VKT_LOG";

/// When set, tests that need a Vulkan device fail instead of skipping.
pub const REQUIRE_DEVICE_ENV: &str = "VKT_REQUIRE_DEVICE";

/// True when [`REQUIRE_DEVICE_ENV`] is set to anything but `0` or an empty string.
pub fn device_required() -> bool {
    std::env::var(REQUIRE_DEVICE_ENV).is_ok_and(|v| !v.is_empty() && v != "0")
}
